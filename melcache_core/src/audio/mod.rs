pub mod decoder;
pub mod mel;
