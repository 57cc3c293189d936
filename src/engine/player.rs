//! Real-time audio playback using cpal
//!
//! The engine is moved into the output callback, so the audio thread owns
//! every voice. Other threads reach it only through its handle.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::Engine;
use crate::viz::SampleBuffer;

/// Stereo frames preallocated for the callback
const SCRATCH_FRAMES: usize = 8192;

/// Real-time audio player
pub struct Player {
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl Player {
    pub fn new() -> Self {
        Self {
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start playing `engine` on `device`, optionally feeding the scope
    /// buffer with the mono mix
    pub fn start(
        &mut self,
        device: &Device,
        config: SupportedStreamConfig,
        engine: Engine,
        viz_buffer: Option<Arc<Mutex<SampleBuffer>>>,
    ) -> Result<()> {
        let sample_format = config.sample_format();
        let stream_config: StreamConfig = config.into();
        info!(
            "opening output stream: {} Hz, {} channels, {:?}",
            stream_config.sample_rate.0, stream_config.channels, sample_format
        );

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(device, &stream_config, engine, running, viz_buffer)?,
            SampleFormat::I16 => build_stream::<i16>(device, &stream_config, engine, running, viz_buffer)?,
            SampleFormat::U16 => build_stream::<u16>(device, &stream_config, engine, running, viz_buffer)?,
            other => return Err(anyhow!("Unsupported sample format {other:?}")),
        };

        stream.play()?;
        self.stream = Some(stream);

        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stream = None;
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

fn build_stream<T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    mut engine: Engine,
    running: Arc<AtomicBool>,
    viz_buffer: Option<Arc<Mutex<SampleBuffer>>>,
) -> Result<Stream> {
    let channels = config.channels as usize;
    let mut scratch = vec![0.0f32; SCRATCH_FRAMES * 2];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if !running.load(Ordering::SeqCst) {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0f32);
                }
                return;
            }

            let mut viz = viz_buffer.as_ref().and_then(|b| b.try_lock().ok());
            fill_output(&mut engine, &mut scratch, data, channels, viz.as_deref_mut());
        },
        |err| {
            error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}

/// Render into `data` one `scratch`-sized stretch at a time. `scratch`
/// never grows.
fn fill_output<T: cpal::Sample + cpal::FromSample<f32>>(
    engine: &mut Engine,
    scratch: &mut [f32],
    data: &mut [T],
    channels: usize,
    mut viz: Option<&mut SampleBuffer>,
) {
    let channels = channels.max(1);
    let chunk_frames = (scratch.len() / 2).max(1);

    for block in data.chunks_mut(chunk_frames * channels) {
        let frames = block.len() / channels;
        let stereo = &mut scratch[..frames * 2];
        engine.render(stereo);

        for (frame, pair) in block.chunks_mut(channels).zip(stereo.chunks_exact(2)) {
            write_frame(frame, pair[0], pair[1]);
            if let Some(buf) = viz.as_deref_mut() {
                buf.push((pair[0] + pair[1]) * 0.5);
            }
        }
    }
}

/// Spread one stereo frame over a device frame of any width
fn write_frame<T: cpal::Sample + cpal::FromSample<f32>>(frame: &mut [T], left: f32, right: f32) {
    match frame.len() {
        0 => {}
        1 => frame[0] = T::from_sample((left + right) * 0.5),
        _ => {
            for (i, sample) in frame.iter_mut().enumerate() {
                *sample = T::from_sample(match i {
                    0 => left,
                    1 => right,
                    _ => 0.0,
                });
            }
        }
    }
}

/// Find an output device by name substring, or the default device
pub fn output_device(name: Option<&str>) -> Result<(Device, SupportedStreamConfig)> {
    let host = cpal::default_host();
    let device = match name {
        Some(wanted) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n.contains(wanted)).unwrap_or(false))
            .ok_or_else(|| anyhow!("No output device matching '{}'", wanted))?,
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?,
    };

    let config = device
        .default_output_config()
        .context("output device has no default configuration")?;
    Ok((device, config))
}

/// Get the default output device name
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.name().ok())
}

/// List all available output devices
pub fn list_output_devices() -> Vec<(String, StreamConfig)> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let (Ok(name), Ok(config)) = (device.name(), device.default_output_config()) {
                devices.push((name, config.into()));
            }
        }
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSettings;
    use crate::synth::instruments::Instrument;

    fn struck_engine() -> Engine {
        let (mut engine, _handle) =
            Engine::new(Instrument::Marimba, EngineSettings::default()).unwrap();
        engine.trigger_on(60, 100);
        engine
    }

    #[test]
    fn test_fill_output_larger_than_scratch() {
        let frames = 2500;
        let mut expected = vec![0.0f32; frames * 2];
        struck_engine().render(&mut expected);

        let mut engine = struck_engine();
        let mut scratch = vec![0.0f32; 1024 * 2];
        let mut data = vec![0.0f32; frames * 2];
        let mut viz = SampleBuffer::new(frames);
        fill_output(&mut engine, &mut scratch, &mut data, 2, Some(&mut viz));

        assert_eq!(scratch.len(), 1024 * 2);
        assert_eq!(data, expected);
        assert!(data[frames * 2 - 200..].iter().any(|&s| s != 0.0));
        let last = (expected[frames * 2 - 2] + expected[frames * 2 - 1]) * 0.5;
        assert_eq!(viz.get_recent(1), vec![last]);
    }

    #[test]
    fn test_fill_output_spreads_over_device_channels() {
        let mut engine = struck_engine();
        let mut scratch = vec![0.0f32; 64 * 2];
        let mut data = vec![1.0f32; 300 * 4];
        fill_output(&mut engine, &mut scratch, &mut data, 4, None);

        assert!(data.chunks_exact(4).all(|f| f[2] == 0.0 && f[3] == 0.0));
        assert!(data.chunks_exact(4).any(|f| f[0] != 0.0));
    }

    #[test]
    fn test_write_frame_stereo() {
        let mut frame = [0.0f32; 2];
        write_frame(&mut frame, 0.25, -0.5);
        assert_eq!(frame, [0.25, -0.5]);
    }

    #[test]
    fn test_write_frame_mono_mixes() {
        let mut frame = [0.0f32; 1];
        write_frame(&mut frame, 0.5, 0.25);
        assert_eq!(frame, [0.375]);
    }

    #[test]
    fn test_write_frame_extra_channels_silent() {
        let mut frame = [1.0f32; 6];
        write_frame(&mut frame, 0.1, 0.2);
        assert_eq!(frame, [0.1, 0.2, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_player_starts_stopped() {
        let mut player = Player::new();
        assert!(!player.is_playing());
        player.stop();
        assert!(!player.is_playing());
    }
}
