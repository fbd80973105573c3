//! Audio Module
//!
//! In-memory audio buffers, WAV loading/writing and format standardization.

pub mod buffer;
pub mod wav;
pub mod converter;

pub use buffer::{AudioBuffer, AudioData, AudioFormat};
pub use wav::{Loader, Writer, OUTPUT_PREFIX};
pub use converter::{FormatStandardizer, resample, resampled_len};
