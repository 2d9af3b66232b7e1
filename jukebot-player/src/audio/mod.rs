//! Local audio output: decode, resample, play
//!
//! Backs the [`LocalSpeakerGateway`], which plays resolved tracks on a host
//! output device instead of a remote voice channel.

pub mod decoder;
pub mod resampler;
pub mod speaker;

pub use decoder::{decode_file, DecodedAudio};
pub use resampler::Resampler;
pub use speaker::{LocalSpeakerGateway, SpeakerConnection};
