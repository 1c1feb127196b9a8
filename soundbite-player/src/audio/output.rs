//! Audio output using cpal
//!
//! One output stream, created paused, renders whatever single voice currently
//! occupies the shared voice slot. `cpal::Stream` is not `Send`, so the stream
//! lives on a dedicated thread that only keeps it alive and applies
//! play commands; handles talk to the stream callback through the voice slot.

use crate::audio::device::{AudioDevice, CompletionCallback, PlaybackHandle};
use crate::audio::types::{DecodedBuffer, CHANNELS};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Preferred output rate; devices that cannot do it run at their default
const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Segment currently rendered by the stream callback
struct Voice {
    serial: u64,
    buffer: Arc<DecodedBuffer>,
    /// Next frame to render
    cursor: usize,
    /// One past the last frame to render
    end: usize,
    /// Fired when the cursor reaches `end`
    done: Option<oneshot::Sender<()>>,
}

impl Voice {
    fn next_frame(&mut self) -> Option<(f32, f32)> {
        if self.cursor >= self.end {
            return None;
        }
        let samples = self.buffer.samples();
        let idx = self.cursor * CHANNELS;
        self.cursor += 1;
        Some((samples[idx], samples[idx + 1]))
    }

    fn is_finished(&self) -> bool {
        self.cursor >= self.end
    }
}

type VoiceSlot = Arc<Mutex<Option<Voice>>>;

fn lock_voice(slot: &Mutex<Option<Voice>>) -> MutexGuard<'_, Option<Voice>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum OutputCommand {
    Resume(oneshot::Sender<Result<()>>),
    Shutdown,
}

/// cpal-backed [`AudioDevice`]
pub struct CpalDevice {
    commands: Mutex<mpsc::Sender<OutputCommand>>,
    voice: VoiceSlot,
    sample_rate: u32,
    /// Stream is playing; cleared by the stream error callback
    running: Arc<AtomicBool>,
    next_serial: AtomicU64,
    runtime: tokio::runtime::Handle,
}

impl CpalDevice {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the output device (default device when `device_name` is None).
    ///
    /// The stream starts suspended; the first
    /// [`resume_if_suspended`](AudioDevice::resume_if_suspended) starts it.
    /// Must be called from within a tokio runtime.
    pub async fn open(device_name: Option<String>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Device(format!("No tokio runtime: {}", e)))?;

        let voice: VoiceSlot = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_voice = Arc::clone(&voice);
        let thread_running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("soundbite-output".to_string())
            .spawn(move || {
                output_thread(device_name, thread_voice, thread_running, command_rx, ready_tx)
            })
            .map_err(|e| Error::Device(format!("Failed to spawn output thread: {}", e)))?;

        let sample_rate = ready_rx
            .await
            .map_err(|_| Error::Device("Output thread exited during startup".to_string()))??;

        Ok(Self {
            commands: Mutex::new(command_tx),
            voice,
            sample_rate,
            running,
            next_serial: AtomicU64::new(1),
            runtime,
        })
    }

    fn send(&self, command: OutputCommand) -> Result<()> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send(command)
            .map_err(|_| Error::Device("Audio output thread has stopped".to_string()))
    }
}

impl AudioDevice for CpalDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume_if_suspended(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.running.load(Ordering::SeqCst) {
                return Ok(());
            }

            let (reply_tx, reply_rx) = oneshot::channel();
            self.send(OutputCommand::Resume(reply_tx))?;
            reply_rx
                .await
                .map_err(|_| Error::Device("Audio output thread has stopped".to_string()))??;

            self.running.store(true, Ordering::SeqCst);
            info!("Audio output resumed");
            Ok(())
        })
    }

    fn create_handle(
        &self,
        buffer: Arc<DecodedBuffer>,
        start: Duration,
        duration: Duration,
        on_complete: CompletionCallback,
    ) -> Result<Box<dyn PlaybackHandle>> {
        let frames = buffer.frame_range(start, duration).ok_or_else(|| {
            Error::Decode(format!(
                "Segment at {:.3}s lies outside the buffer ({:.3}s)",
                start.as_secs_f64(),
                buffer.duration().as_secs_f64()
            ))
        })?;

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();

        Ok(Box::new(CpalHandle {
            serial,
            voice_slot: Arc::clone(&self.voice),
            pending: Some(Voice {
                serial,
                buffer,
                cursor: frames.start,
                end: frames.end,
                done: Some(done_tx),
            }),
            completion: Some((done_rx, on_complete)),
            stopped: Arc::new(AtomicBool::new(false)),
            runtime: self.runtime.clone(),
        }))
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let _ = self.send(OutputCommand::Shutdown);
    }
}

/// Open the output device, or stand in with an [`UnavailableDevice`]
///
/// A missing output is not fatal: the catalog and console keep working and
/// each play attempt fails through the controller's device error path.
pub async fn open_output(device_name: Option<String>) -> Arc<dyn AudioDevice> {
    match CpalDevice::open(device_name).await {
        Ok(device) => Arc::new(device),
        Err(e) => {
            error!("Failed to open audio output: {}; playback disabled", e);
            let reason = match e {
                Error::Device(reason) => reason,
                other => other.to_string(),
            };
            Arc::new(UnavailableDevice::new(reason))
        }
    }
}

/// Output that could not be opened; every playback attempt fails
#[derive(Debug, Clone)]
pub struct UnavailableDevice {
    reason: String,
}

impl UnavailableDevice {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioDevice for UnavailableDevice {
    fn sample_rate(&self) -> u32 {
        PREFERRED_SAMPLE_RATE
    }

    fn resume_if_suspended(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Err(Error::Device(self.reason.clone())) })
    }

    fn create_handle(
        &self,
        _buffer: Arc<DecodedBuffer>,
        _start: Duration,
        _duration: Duration,
        _on_complete: CompletionCallback,
    ) -> Result<Box<dyn PlaybackHandle>> {
        Err(Error::Device(self.reason.clone()))
    }
}

/// Handle for one voice of a [`CpalDevice`]
struct CpalHandle {
    serial: u64,
    voice_slot: VoiceSlot,
    /// Voice waiting for `begin`
    pending: Option<Voice>,
    completion: Option<(oneshot::Receiver<()>, CompletionCallback)>,
    stopped: Arc<AtomicBool>,
    runtime: tokio::runtime::Handle,
}

impl PlaybackHandle for CpalHandle {
    fn begin(&mut self) -> Result<()> {
        let voice = self
            .pending
            .take()
            .ok_or_else(|| Error::Device("Playback handle already started".to_string()))?;

        if let Some((done, on_complete)) = self.completion.take() {
            let stopped = Arc::clone(&self.stopped);
            self.runtime.spawn(async move {
                // Err: voice dropped before reaching its end
                if done.await.is_ok() && !stopped.load(Ordering::SeqCst) {
                    on_complete();
                }
            });
        }

        *lock_voice(&self.voice_slot) = Some(voice);
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut slot = lock_voice(&self.voice_slot);
        if slot.as_ref().map(|v| v.serial) == Some(self.serial) {
            slot.take();
        }
    }

    fn release(&mut self) {
        self.stop();
        self.pending = None;
        self.completion = None;
    }
}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the cpal stream for the lifetime of the device
fn output_thread(
    device_name: Option<String>,
    voice: VoiceSlot,
    running: Arc<AtomicBool>,
    commands: mpsc::Receiver<OutputCommand>,
    ready: oneshot::Sender<Result<u32>>,
) {
    let stream = match open_stream(device_name, voice, Arc::clone(&running)) {
        Ok((stream, sample_rate)) => {
            let _ = ready.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            error!("Failed to open audio output: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(command) = commands.recv() {
        match command {
            OutputCommand::Resume(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| Error::Device(format!("Failed to start stream: {}", e)));
                let _ = reply.send(result);
            }
            OutputCommand::Shutdown => break,
        }
    }

    running.store(false, Ordering::SeqCst);
    info!("Audio output thread stopped");
}

fn open_stream(
    device_name: Option<String>,
    voice: VoiceSlot,
    running: Arc<AtomicBool>,
) -> Result<(Stream, u32)> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?;
            match devices.find(|d| d.name().ok().as_ref() == Some(&name)) {
                Some(dev) => {
                    info!("Using requested audio device: {}", name);
                    dev
                }
                None => {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                    host.default_output_device().ok_or_else(|| {
                        Error::Device(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Device("No default output device found".to_string()))?,
    };
    info!(
        "Audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let (config, sample_format) = best_config(&device)?;
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, voice, running)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, voice, running)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, voice, running)?,
        other => {
            return Err(Error::Device(format!("Unsupported sample format: {:?}", other)));
        }
    };

    // Some hosts start streams on creation; keep it suspended until resumed
    if let Err(e) = stream.pause() {
        debug!("Stream pause not supported: {}", e);
    }

    Ok((stream, config.sample_rate.0))
}

/// Prefer 44.1kHz stereo f32, otherwise the device default
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::Device(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
            && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(range) = preferred {
        let config = range.with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE));
        return Ok((config.config(), config.sample_format()));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::Device(format!("Failed to get default config: {}", e)))?;
    Ok((default.config(), default.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    voice: VoiceSlot,
    running: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                render(data, channels, &voice);
            },
            move |err| {
                error!("Audio stream error: {}", err);
                running.store(false, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::Device(format!("Failed to build stream: {}", e)))
}

/// Stream callback body: copy the voice's frames out, silence otherwise
fn render<T>(data: &mut [T], channels: usize, voice: &Mutex<Option<Voice>>)
where
    T: SizedSample + FromSample<f32>,
{
    let mut slot = lock_voice(voice);

    for frame in data.chunks_mut(channels) {
        let (left, right) = slot
            .as_mut()
            .and_then(Voice::next_frame)
            .unwrap_or((0.0, 0.0));

        if channels == 1 {
            frame[0] = T::from_sample((left + right) * 0.5);
        } else {
            for (idx, out) in frame.iter_mut().enumerate() {
                let value = match idx {
                    0 => left,
                    1 => right,
                    _ => 0.0,
                };
                *out = T::from_sample(value.clamp(-1.0, 1.0));
            }
        }
    }

    if slot.as_ref().is_some_and(Voice::is_finished) {
        if let Some(mut finished) = slot.take() {
            if let Some(done) = finished.done.take() {
                let _ = done.send(());
            }
        }
    }
}
