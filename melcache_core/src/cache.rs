//! On-disk caches for decoded buffers and extracted features.
//!
//! Each artifact is a small header (magic, format version, artifact kind)
//! followed by the bincode-encoded collection. Saves go through a temporary
//! file and a rename, so a reader never sees a half-written artifact.
//! There is no locking: one writer per run id is assumed.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{BufferCollection, FeatureCollection, RunId};

const MAGIC: [u8; 8] = *b"MELCACHE";
const FORMAT_VERSION: u32 = 1;

/// A collection that can be stored as a cache artifact.
pub trait Artifact: Serialize + DeserializeOwned {
    const KIND: u8;
    const LABEL: &'static str;

    fn file_name(run_id: &RunId) -> String;
    fn item_count(&self) -> usize;
}

impl Artifact for BufferCollection {
    const KIND: u8 = 1;
    const LABEL: &'static str = "buffers";

    fn file_name(run_id: &RunId) -> String {
        run_id.buffers_file_name()
    }

    fn item_count(&self) -> usize {
        self.len()
    }
}

impl Artifact for FeatureCollection {
    const KIND: u8 = 2;
    const LABEL: &'static str = "features";

    fn file_name(run_id: &RunId) -> String {
        run_id.features_file_name()
    }

    fn item_count(&self) -> usize {
        self.len()
    }
}

/// Result of a cache lookup. A miss is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }
}

/// Cache of one artifact kind inside a directory.
#[derive(Debug, Clone)]
pub struct Cache<A> {
    dir: PathBuf,
    _artifact: PhantomData<fn() -> A>,
}

pub type BufferCache = Cache<BufferCollection>;
pub type FeatureCache = Cache<FeatureCollection>;

impl<A: Artifact> Cache<A> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _artifact: PhantomData,
        }
    }

    pub fn path(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(A::file_name(run_id))
    }

    pub fn exists(&self, run_id: &RunId) -> bool {
        self.path(run_id).is_file()
    }

    pub fn load(&self, run_id: &RunId) -> Result<CacheLookup<A>> {
        let path = self.path(run_id);
        if !path.is_file() {
            tracing::info!("no {} cache found at {}", A::LABEL, path.display());
            return Ok(CacheLookup::Miss);
        }

        let file = File::open(&path).map_err(|source| Error::CacheIo {
            path: path.clone(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        read_header(&mut reader, &path, A::KIND)?;

        let value: A = bincode::deserialize_from(&mut reader).map_err(|source| {
            Error::CacheEncoding {
                path: path.clone(),
                source,
            }
        })?;

        tracing::info!(
            "loaded {} {} from {}",
            value.item_count(),
            A::LABEL,
            path.display()
        );
        Ok(CacheLookup::Hit(value))
    }

    /// Write `value`, replacing any artifact already stored under `run_id`.
    pub fn save(&self, value: &A, run_id: &RunId) -> Result<PathBuf> {
        let path = self.path(run_id);
        let io_err = |source| Error::CacheIo {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;

        let tmp = path.with_extension("cache.tmp");
        if let Err(e) = write_artifact(&tmp, &path, value) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path).map_err(io_err)?;

        tracing::info!(
            "saved {} {} to {}",
            value.item_count(),
            A::LABEL,
            path.display()
        );
        Ok(path)
    }
}

fn write_artifact<A: Artifact>(tmp: &Path, path: &Path, value: &A) -> Result<()> {
    let io_err = |source| Error::CacheIo {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(tmp).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&MAGIC).map_err(io_err)?;
    writer
        .write_all(&FORMAT_VERSION.to_le_bytes())
        .map_err(io_err)?;
    writer.write_all(&[A::KIND]).map_err(io_err)?;
    bincode::serialize_into(&mut writer, value).map_err(|source| Error::CacheEncoding {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_err)
}

fn read_header(reader: &mut impl Read, path: &Path, kind: u8) -> Result<()> {
    let mut header = [0u8; 13];
    reader
        .read_exact(&mut header)
        .map_err(|source| Error::CacheIo {
            path: path.to_path_buf(),
            source,
        })?;

    let corrupt = |reason: String| Error::Cache {
        path: path.to_path_buf(),
        reason,
    };

    if header[..8] != MAGIC {
        return Err(corrupt("not a melcache artifact".into()));
    }
    let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    if header[12] != kind {
        return Err(corrupt(format!(
            "artifact kind {}, expected {kind}",
            header[12]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioBuffer, BufferEntry, FeatureEntry};
    use ndarray::Array2;

    fn buffers() -> BufferCollection {
        vec![
            BufferEntry {
                index: 0,
                source: PathBuf::from("a/one.wav"),
                buffer: AudioBuffer::new(vec![0.0, -1.0, 1.0, f32::MIN_POSITIVE, 0.123_456_79], 22_050),
            },
            BufferEntry {
                index: 2,
                source: PathBuf::from("b/three.mp3"),
                buffer: AudioBuffer::new(vec![-0.5; 7], 44_100),
            },
        ]
    }

    #[test]
    fn missing_artifact_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BufferCache::new(dir.path());
        let lookup = cache.load(&RunId::new("nothing")).unwrap();
        assert_eq!(lookup, CacheLookup::Miss);
        assert!(!cache.exists(&RunId::new("nothing")));
    }

    #[test]
    fn buffers_round_trip_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BufferCache::new(dir.path());
        let run = RunId::new("run_20240101-000000");

        let original = buffers();
        let path = cache.save(&original, &run).unwrap();
        assert_eq!(path, dir.path().join("run_20240101-000000.cache"));

        let loaded = cache.load(&run).unwrap().into_option().unwrap();
        assert_eq!(loaded, original);
        for (a, b) in loaded.iter().zip(&original) {
            let bits_a: Vec<u32> = a.buffer.samples.iter().map(|s| s.to_bits()).collect();
            let bits_b: Vec<u32> = b.buffer.samples.iter().map(|s| s.to_bits()).collect();
            assert_eq!(bits_a, bits_b);
        }
    }

    #[test]
    fn features_round_trip_under_suffixed_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path());
        let run = RunId::new("run");

        let features = vec![FeatureEntry {
            index: 3,
            source: PathBuf::from("x.wav"),
            features: Array2::from_shape_fn((4, 3), |(m, t)| -(m as f32) * 1.5 - t as f32),
        }];
        let path = cache.save(&features, &run).unwrap();
        assert!(path.ends_with("runfeatures_.cache"));
        assert!(cache.exists(&run));
        assert_eq!(cache.load(&run).unwrap(), CacheLookup::Hit(features));
    }

    #[test]
    fn save_overwrites_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BufferCache::new(dir.path());
        let run = RunId::new("run");

        cache.save(&buffers(), &run).unwrap();
        cache.save(&Vec::new(), &run).unwrap();
        let loaded = cache.load(&run).unwrap().into_option().unwrap();
        assert!(loaded.is_empty());
        assert!(!dir.path().join("run.cache.tmp").exists());
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunId::new("run");
        let buffer_cache = BufferCache::new(dir.path());
        buffer_cache.save(&buffers(), &run).unwrap();

        // Put a buffer artifact where the feature artifact belongs.
        fs::copy(buffer_cache.path(&run), dir.path().join("runfeatures_.cache")).unwrap();
        let err = FeatureCache::new(dir.path()).load(&run).unwrap_err();
        assert!(matches!(err, Error::Cache { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run.cache"), b"this is not a cache artifact").unwrap();
        let err = BufferCache::new(dir.path()).load(&RunId::new("run")).unwrap_err();
        assert!(matches!(err, Error::Cache { .. }));
    }

    /// Fails on the way out, after the temp file has been created.
    struct Unwritable;

    impl Serialize for Unwritable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    impl<'de> serde::Deserialize<'de> for Unwritable {
        fn deserialize<D: serde::Deserializer<'de>>(_: D) -> std::result::Result<Self, D::Error> {
            Ok(Unwritable)
        }
    }

    impl Artifact for Unwritable {
        const KIND: u8 = 99;
        const LABEL: &'static str = "unwritable";

        fn file_name(run_id: &RunId) -> String {
            run_id.buffers_file_name()
        }

        fn item_count(&self) -> usize {
            1
        }
    }

    #[test]
    fn failed_save_leaves_no_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunId::new("run");
        let err = Cache::<Unwritable>::new(dir.path())
            .save(&Unwritable, &run)
            .unwrap_err();
        assert!(matches!(err, Error::CacheEncoding { .. }));
        assert!(!dir.path().join("run.cache.tmp").exists());
        assert!(!dir.path().join("run.cache").exists());
    }
}
