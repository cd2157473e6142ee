use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat as DeviceSampleFormat, SampleRate, Stream, StreamConfig};
use log::{debug, error, trace, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::ByteRing;
use crate::audio::OutputSink;
use crate::error::AudioError;
use crate::models::{PlaybackState, SampleFormat, StreamFormat};

/// How long a caller waits for the audio thread to answer a command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

type Reply = SyncSender<Result<(), AudioError>>;

/// Commands for the thread that owns the cpal stream
enum StreamCommand {
    Play(Reply),
    Pause(Reply),
    Shutdown,
}

/// Output sink backed by a cpal stream.
///
/// cpal streams cannot move between threads, so the stream is built and owned by a
/// dedicated "audio-output" thread and driven through a command channel. Written
/// bytes go through a bounded [`ByteRing`] that the stream callback drains.
pub struct CpalSink {
    ring: Arc<ByteRing>,
    volume: Arc<AtomicU32>, // f32 bits
    state: Mutex<PlaybackState>,
    commands: Mutex<Option<Sender<StreamCommand>>>,
    audio_thread: Mutex<Option<JoinHandle<()>>>,
    format: StreamFormat,
    device_name: String,
}

impl CpalSink {
    /// Build a paused output stream on `device` with a `buffer_bytes` byte ring in front.
    pub fn open(device: cpal::Device, format: StreamFormat, buffer_bytes: usize) -> Result<Self, AudioError> {
        format.validate()?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let ring = Arc::new(ByteRing::new(buffer_bytes, format));
        let volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let period_frames = (ring.capacity() / format.bytes_per_frame()) as u32;
        let thread_ring = Arc::clone(&ring);
        let thread_volume = Arc::clone(&volume);

        let audio_thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match build_stream(&device, format, period_frames, thread_ring, thread_volume) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_stream(stream, command_rx);
            })
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create audio thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| AudioError::InitializationFailed("Audio thread exited during setup".to_string()));
        if let Err(e) = ready.and_then(|r| r) {
            let _ = audio_thread.join();
            return Err(e);
        }

        debug!(
            "Opened output stream on '{}' ({}, {} byte ring)",
            device_name,
            format.format_string(),
            ring.capacity()
        );

        Ok(Self {
            ring,
            volume,
            state: Mutex::new(PlaybackState::Stopped),
            commands: Mutex::new(Some(command_tx)),
            audio_thread: Mutex::new(Some(audio_thread)),
            format,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Callbacks that found less data than the device asked for
    pub fn underrun_count(&self) -> usize {
        self.ring.underrun_count()
    }

    fn send_command(&self, make: impl FnOnce(Reply) -> StreamCommand) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        {
            let commands = self.commands.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let sender = commands.as_ref().ok_or(AudioError::StreamClosed)?;
            sender.send(make(reply_tx)).map_err(|_| AudioError::StreamClosed)?;
        }
        reply_rx
            .recv_timeout(COMMAND_TIMEOUT)
            .map_err(|_| AudioError::StreamError("Audio thread did not respond".to_string()))?
    }

    fn set_state(&self, state: PlaybackState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

impl OutputSink for CpalSink {
    fn write(&self, data: &[u8]) -> Result<usize, AudioError> {
        self.ring.write_blocking(data)
    }

    fn play(&self) -> Result<(), AudioError> {
        self.send_command(StreamCommand::Play)?;
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    fn pause(&self) -> Result<(), AudioError> {
        self.send_command(StreamCommand::Pause)?;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        // Clear first so a writer blocked on a full ring returns even if the pause fails
        self.ring.clear();
        let result = self.send_command(StreamCommand::Pause);
        self.ring.clear();
        self.set_state(PlaybackState::Stopped);
        result
    }

    fn flush(&self) -> Result<(), AudioError> {
        self.ring.clear();
        Ok(())
    }

    fn set_volume(&self, gain: f32) -> Result<(), AudioError> {
        self.volume.store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    fn state(&self) -> Option<PlaybackState> {
        Some(*self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn release(&self) -> Result<(), AudioError> {
        self.ring.close();
        self.ring.clear();

        let sender = self
            .commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(StreamCommand::Shutdown);
        }

        let handle = self
            .audio_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| AudioError::StreamError("Audio thread panicked".to_string()))?;
        }

        self.set_state(PlaybackState::Stopped);
        debug!("Closed output stream on '{}'", self.device_name);
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Output stream on '{}' did not close cleanly: {}", self.device_name, e);
        }
    }
}

fn run_stream(stream: Stream, commands: Receiver<StreamCommand>) {
    for command in commands {
        match command {
            StreamCommand::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamCommand::Pause(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| AudioError::StreamError(format!("Failed to pause stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamCommand::Shutdown => break,
        }
    }

    let _ = stream.pause();
    trace!("audio-output thread exiting");
}

fn build_stream(
    device: &cpal::Device,
    format: StreamFormat,
    period_frames: u32,
    ring: Arc<ByteRing>,
    volume: Arc<AtomicU32>,
) -> Result<Stream, AudioError> {
    let default_config = device
        .default_output_config()
        .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?;

    let fixed = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(period_frames),
    };

    let stream = match build_typed_stream(device, &fixed, default_config.sample_format(), format, &ring, &volume) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Fixed buffer of {} frames rejected ({}), using device default", period_frames, e);
            let config = StreamConfig {
                buffer_size: cpal::BufferSize::Default,
                ..fixed
            };
            build_typed_stream(device, &config, default_config.sample_format(), format, &ring, &volume)?
        }
    };

    // Some hosts start streams as soon as they are built
    stream
        .pause()
        .map_err(|e| AudioError::StreamError(format!("Failed to pause new stream: {}", e)))?;
    Ok(stream)
}

fn build_typed_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    device_format: DeviceSampleFormat,
    format: StreamFormat,
    ring: &Arc<ByteRing>,
    volume: &Arc<AtomicU32>,
) -> Result<Stream, AudioError> {
    match device_format {
        DeviceSampleFormat::F32 => create_stream::<f32>(device, config, format, ring, volume),
        DeviceSampleFormat::I16 => create_stream::<i16>(device, config, format, ring, volume),
        DeviceSampleFormat::U16 => create_stream::<u16>(device, config, format, ring, volume),
        DeviceSampleFormat::I8 => create_stream::<i8>(device, config, format, ring, volume),
        DeviceSampleFormat::I32 => create_stream::<i32>(device, config, format, ring, volume),
        other => Err(AudioError::UnsupportedFormat {
            format: format!("{:?}", other),
        }),
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    format: StreamFormat,
    ring: &Arc<ByteRing>,
    volume: &Arc<AtomicU32>,
) -> Result<Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    T: cpal::FromSample<f32>,
{
    let ring = Arc::clone(ring);
    let volume = Arc::clone(volume);
    let sample_bytes = format.sample_format.bytes_per_sample();
    let mut scratch: Vec<u8> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let needed = data.len() * sample_bytes;
                if scratch.len() < needed {
                    scratch.resize(needed, 0);
                }
                let read = ring.read_into(&mut scratch[..needed]);
                if read < needed {
                    ring.note_underrun();
                }

                let gain = f32::from_bits(volume.load(Ordering::Relaxed));
                let samples_read = read / sample_bytes;
                for (i, sample) in data.iter_mut().enumerate() {
                    let value = if i < samples_read {
                        let start = i * sample_bytes;
                        decode_sample(format.sample_format, &scratch[start..start + sample_bytes]) * gain
                    } else {
                        0.0 // Silence on underrun
                    };
                    *sample = cpal::Sample::from_sample(value);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
}

/// Decode one little-endian PCM sample into the range [-1.0, 1.0]
pub fn decode_sample(format: SampleFormat, bytes: &[u8]) -> f32 {
    match format {
        SampleFormat::Int8 => bytes[0] as i8 as f32 / 128.0,
        SampleFormat::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        SampleFormat::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).clamp(-1.0, 1.0),
    }
}
