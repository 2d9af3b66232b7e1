//! Local speaker voice gateway
//!
//! Plays tracks on a host output device. Each connection owns a dedicated
//! audio thread holding the cpal stream; the stream callback reads the active
//! track and fires its completion signal from the audio thread when the last
//! frame has been written.

use crate::audio::decoder::decode_file;
use crate::audio::resampler::Resampler;
use crate::error::{Error, Result};
use crate::voice::{ChannelId, CompletionSignal, PlaybackOutcome, VoiceConnection, VoiceGateway};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Track currently bound to the output
struct ActiveTrack {
    samples: Vec<f32>,
    position: usize,
    paused: bool,
    done: Option<CompletionSignal>,
}

impl ActiveTrack {
    fn finish(&mut self, outcome: PlaybackOutcome) {
        if let Some(done) = self.done.take() {
            done.complete(outcome);
        }
    }
}

/// Shared between the tokio side and the audio callback
#[derive(Default)]
struct Slot {
    active: Mutex<Option<ActiveTrack>>,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveTrack>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the active track and report how it ended
    fn end(&self, outcome: PlaybackOutcome) -> bool {
        match self.lock().take() {
            Some(mut track) => {
                track.finish(outcome);
                true
            }
            None => false,
        }
    }

    /// Fill one output frame; returns `(left, right)`
    fn next_frame(active: &mut Option<ActiveTrack>) -> (f32, f32) {
        let Some(track) = active.as_mut() else {
            return (0.0, 0.0);
        };
        if track.paused {
            return (0.0, 0.0);
        }
        if track.position + 1 >= track.samples.len() {
            track.finish(PlaybackOutcome::Finished);
            *active = None;
            return (0.0, 0.0);
        }
        let frame = (track.samples[track.position], track.samples[track.position + 1]);
        track.position += 2;
        frame
    }
}

/// Gateway that "joins" a channel by opening the local output device
#[derive(Debug, Clone, Default)]
pub struct LocalSpeakerGateway {
    device: Option<String>,
}

impl LocalSpeakerGateway {
    /// `None` or `"default"` selects the host default device
    pub fn new(device: Option<String>) -> Self {
        Self {
            device: device.filter(|d| !d.is_empty() && d != "default"),
        }
    }

    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::Playback(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        Ok(devices)
    }
}

#[async_trait]
impl VoiceGateway for LocalSpeakerGateway {
    async fn connect(&self, channel: &ChannelId) -> Result<Arc<dyn VoiceConnection>> {
        let slot = Arc::new(Slot::default());
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let device_name = self.device.clone();
        let thread_slot = slot.clone();
        std::thread::Builder::new()
            .name("jukebot-speaker".to_string())
            .spawn(move || audio_thread(device_name, thread_slot, ready_tx, shutdown_rx))
            .map_err(|e| Error::Connection(format!("Failed to spawn audio thread: {}", e)))?;

        let sample_rate = ready_rx
            .await
            .map_err(|_| Error::Connection("Audio thread exited during setup".to_string()))?
            .map_err(|e| Error::Connection(e.to_string()))?;

        info!(%channel, sample_rate, "Local speaker connected");
        Ok(Arc::new(SpeakerConnection {
            channel: channel.clone(),
            sample_rate,
            slot,
            connected: AtomicBool::new(true),
            shutdown: Mutex::new(Some(shutdown_tx)),
        }))
    }
}

/// Owns the cpal stream for the lifetime of the connection
fn audio_thread(
    device_name: Option<String>,
    slot: Arc<Slot>,
    ready: oneshot::Sender<Result<u32>>,
    shutdown: mpsc::Receiver<()>,
) {
    let stream = match open_stream(device_name, slot.clone()) {
        Ok((stream, sample_rate)) => {
            let _ = ready.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Blocks until disconnect drops or signals the sender
    let _ = shutdown.recv();
    drop(stream);
    slot.end(PlaybackOutcome::Stopped);
    debug!("Audio thread exiting");
}

fn open_stream(device_name: Option<String>, slot: Arc<Slot>) -> Result<(Stream, u32)> {
    let device = select_device(device_name.as_deref())?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::Playback(format!("Failed to get device config: {}", e)))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, slot)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, slot)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, slot)?,
        other => {
            return Err(Error::Playback(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };
    stream
        .play()
        .map_err(|e| Error::Playback(format!("Failed to start stream: {}", e)))?;
    Ok((stream, sample_rate))
}

/// Requested device by name, falling back to the host default
fn select_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        let found = host
            .output_devices()
            .map_err(|e| Error::Playback(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().ok().as_deref() == Some(name));
        match found {
            Some(device) => {
                info!("Using audio device: {}", name);
                return Ok(device);
            }
            None => warn!("Requested device '{}' not found, falling back to default device", name),
        }
    }
    host.default_output_device()
        .ok_or_else(|| Error::Playback("No default output device found".to_string()))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, slot: Arc<Slot>) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let error_slot = slot.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut active = slot.lock();
                for frame in data.chunks_mut(channels) {
                    let (left, right) = Slot::next_frame(&mut active);
                    for (i, sample) in frame.iter_mut().enumerate() {
                        let value = match i {
                            0 => left,
                            1 => right,
                            _ => 0.0,
                        };
                        *sample = T::from_sample(value.clamp(-1.0, 1.0));
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_slot.end(PlaybackOutcome::Failed(err.to_string()));
            },
            None,
        )
        .map_err(|e| Error::Playback(format!("Failed to build stream: {}", e)))
}

pub struct SpeakerConnection {
    channel: ChannelId,
    sample_rate: u32,
    slot: Arc<Slot>,
    connected: AtomicBool,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl SpeakerConnection {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[async_trait]
impl VoiceConnection for SpeakerConnection {
    fn channel(&self) -> &ChannelId {
        &self.channel
    }

    async fn play(&self, path: &Path, done: CompletionSignal) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Playback("Speaker is disconnected".to_string()));
        }
        if self.slot.lock().is_some() {
            return Err(Error::Playback("Already playing audio".to_string()));
        }

        let path = path.to_path_buf();
        let output_rate = self.sample_rate;
        let samples = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
            let decoded = decode_file(&path)?;
            Resampler::resample(&decoded.samples, decoded.sample_rate, output_rate, 2)
        })
        .await
        .map_err(|e| Error::Playback(format!("Decode task failed: {}", e)))??;

        let mut active = self.slot.lock();
        if active.is_some() {
            return Err(Error::Playback("Already playing audio".to_string()));
        }
        *active = Some(ActiveTrack {
            samples,
            position: 0,
            paused: false,
            done: Some(done),
        });
        Ok(())
    }

    async fn stop(&self) {
        if self.slot.end(PlaybackOutcome::Stopped) {
            debug!(channel = %self.channel, "Playback stopped");
        }
    }

    async fn pause(&self) {
        if let Some(track) = self.slot.lock().as_mut() {
            track.paused = true;
        }
    }

    async fn resume(&self) {
        if let Some(track) = self.slot.lock().as_mut() {
            track.paused = false;
        }
    }

    fn is_playing(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|t| !t.paused)
    }

    fn is_paused(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|t| t.paused)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn disconnect(&self) {
        self.slot.end(PlaybackOutcome::Stopped);
        self.connected.store(false, Ordering::Release);
        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
            info!(channel = %self.channel, "Local speaker disconnected");
        }
    }
}
