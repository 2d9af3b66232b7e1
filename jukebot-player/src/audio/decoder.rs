//! Audio decoder using symphonia
//!
//! Decodes a downloaded file completely into interleaved stereo f32 samples.

use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Fully decoded track
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo samples `[L, R, L, R, ...]`
    pub samples: Vec<f32>,
    /// Source sample rate
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Decode an entire audio file to stereo PCM.
///
/// Mono sources are duplicated to both channels; sources with more than two
/// channels keep the first two.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    debug!("Decoding file: {}", path.display());

    let file = std::fs::File::open(path)
        .map_err(|e| Error::Playback(format!("Failed to open file {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Playback(format!("Failed to probe format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Playback("No audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Playback("Sample rate not found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Playback(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Decode error, skipping packet: {}", e);
                continue;
            }
            Err(e) => return Err(Error::Playback(format!("Decode failed: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let needed = decoded.capacity() * channels;
        if buffer.as_ref().map_or(true, |b| b.capacity() < needed) {
            buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = buffer.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        push_stereo(buf.samples(), channels, &mut samples);
    }

    debug!(
        "Decoded {} frames at {}Hz from {}",
        samples.len() / 2,
        sample_rate,
        path.display()
    );
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Append interleaved `channels`-wide samples as interleaved stereo
fn push_stereo(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            for &sample in interleaved {
                output.push(sample);
                output.push(sample);
            }
        }
        _ => {
            for frame in interleaved.chunks_exact(channels) {
                output.push(frame[0]);
                output.push(frame[1]);
            }
        }
    }
}
