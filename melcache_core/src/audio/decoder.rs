use anyhow::{anyhow, Context, Result};
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use rubato::{FftFixedIn, Resampler};

use crate::types::AudioBuffer;

/// Decode an audio file to a mono buffer.
///
/// With `target_rate` set the samples are resampled to that rate, otherwise
/// the file's own rate is kept.
pub fn decode_file<P: AsRef<Path>>(path: P, target_rate: Option<u32>) -> Result<AudioBuffer> {
    let path = path.as_ref();

    // -------------------------
    // 1) Decode with Symphonia
    // -------------------------
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("unsupported format or failed to probe container")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no supported audio tracks found"))?;

    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create decoder for selected track")?;

    let mut interleaved_f32: Vec<f32> = Vec::new();

    // Codec params first, decoded buffer spec as fallback.
    let mut input_sample_rate: Option<u32> = track.codec_params.sample_rate;
    let mut input_channels: Option<usize> = track.codec_params.channels.map(|c| c.count());

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow!("decoder reset required (chained streams)"));
            }
            Err(SymphoniaError::IoError(_)) => break, // end of file
            Err(e) => return Err(e).context("error reading next packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::IoError(_)) => continue,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow!("decoder reset required mid-stream"));
            }
            Err(e) => return Err(e).context("unrecoverable decode error"),
        };

        input_sample_rate.get_or_insert(decoded.spec().rate);
        input_channels.get_or_insert(decoded.spec().channels.count());

        let mut sbuf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sbuf.copy_interleaved_ref(decoded);

        interleaved_f32.extend_from_slice(sbuf.samples());
    }

    let sr_in = input_sample_rate.ok_or_else(|| anyhow!("could not determine input sample rate"))?;
    let ch_in = input_channels.ok_or_else(|| anyhow!("could not determine channel count"))?;

    if interleaved_f32.is_empty() {
        return Err(anyhow!("decoded audio was empty"));
    }
    if sr_in == 0 || ch_in == 0 {
        return Err(anyhow!("invalid stream layout: {sr_in} Hz, {ch_in} channels"));
    }

    // -------------------------
    // 2) Downmix to mono
    // -------------------------
    let mono = downmix(interleaved_f32, ch_in);

    // -------------------------
    // 3) Resample (if requested)
    // -------------------------
    match target_rate {
        Some(sr_out) if sr_out != sr_in => {
            let resampled = resample_mono(&mono, sr_in, sr_out)?;
            Ok(AudioBuffer::new(resampled, sr_out))
        }
        _ => Ok(AudioBuffer::new(mono, sr_in)),
    }
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }

    let frames = interleaved.len() / channels;
    let mut out = Vec::with_capacity(frames);

    for f in 0..frames {
        let base = f * channels;
        let sum: f32 = interleaved[base..base + channels].iter().sum();
        out.push(sum / channels as f32);
    }
    out
}

/// Resample a whole mono clip with rubato's synchronous FFT resampler.
///
/// The output is aligned to the input (resampler delay removed) and trimmed
/// to `round(len * sr_out / sr_in)` frames.
pub fn resample_mono(mono: &[f32], sr_in: u32, sr_out: u32) -> Result<Vec<f32>> {
    const CHUNK_SIZE: usize = 1024;
    const SUB_CHUNKS: usize = 2;

    if mono.is_empty() || sr_in == sr_out {
        return Ok(mono.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        sr_in as usize,
        sr_out as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1, // mono
    )
    .context("failed to construct FFT resampler")?;

    let delay = resampler.output_delay();
    let expected_len = (mono.len() as f64 * sr_out as f64 / sr_in as f64).round() as usize;
    let mut out: Vec<f32> = Vec::with_capacity(expected_len + delay);

    let mut pos = 0;
    while mono.len() - pos >= resampler.input_frames_next() {
        let end = pos + resampler.input_frames_next();
        let input: [&[f32]; 1] = [&mono[pos..end]];
        let chunk = resampler
            .process(&input[..], None)
            .context("resampling failed")?;
        out.extend_from_slice(&chunk[0]);
        pos = end;
    }

    if pos < mono.len() {
        let tail: [&[f32]; 1] = [&mono[pos..]];
        let chunk = resampler
            .process_partial(Some(&tail[..]), None)
            .context("resampling tail failed")?;
        out.extend_from_slice(&chunk[0]);
    }

    // Flush frames still held back by the resampler delay.
    while out.len() < expected_len + delay {
        let chunk = resampler
            .process_partial::<Vec<f32>>(None, None)
            .context("resampler flush failed")?;
        if chunk[0].is_empty() {
            break;
        }
        out.extend_from_slice(&chunk[0]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected_len);
    Ok(out)
}
