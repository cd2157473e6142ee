use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SupportedBufferSize};
use log::debug;
use serde::Serialize;

use crate::audio::sink::CpalSink;
use crate::audio::{DeviceFactory, OutputSink};
use crate::error::AudioError;
use crate::models::StreamFormat;

/// Period used when the host does not report a buffer range
pub const FALLBACK_MIN_FRAMES: u32 = 2048;

/// Information about one output device, for listing
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub max_channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub sample_formats: Vec<String>,
}

/// Opens cpal output streams on the default host.
///
/// With no device name the host's default output device is used.
#[derive(Debug, Clone, Default)]
pub struct CpalDeviceFactory {
    device_name: Option<String>,
}

impl CpalDeviceFactory {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Enumerate the output devices of the default host
    pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        let mut infos = Vec::new();
        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    debug!("Skipping device without a name: {}", e);
                    continue;
                }
            };

            let mut info = DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                max_channels: 0,
                min_sample_rate: u32::MAX,
                max_sample_rate: 0,
                sample_formats: Vec::new(),
            };

            if let Ok(configs) = device.supported_output_configs() {
                for range in configs {
                    info.max_channels = info.max_channels.max(range.channels());
                    info.min_sample_rate = info.min_sample_rate.min(range.min_sample_rate().0);
                    info.max_sample_rate = info.max_sample_rate.max(range.max_sample_rate().0);
                    let format = format!("{:?}", range.sample_format()).to_lowercase();
                    if !info.sample_formats.contains(&format) {
                        info.sample_formats.push(format);
                    }
                }
            }
            if info.min_sample_rate == u32::MAX {
                info.min_sample_rate = 0;
            }

            infos.push(info);
        }

        Ok(infos)
    }

    /// Resolve the configured device, falling back to the host default when unnamed
    pub fn select_device(&self) -> Result<Device, AudioError> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;
                for device in devices {
                    if device.name().map(|n| &n == name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(AudioError::DeviceNotFound { device: name.clone() })
            }
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string())),
        }
    }
}

impl DeviceFactory for CpalDeviceFactory {
    fn min_buffer_size(&self, format: &StreamFormat) -> Result<usize, AudioError> {
        format.validate()?;
        let device = self.select_device()?;

        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get supported configs: {}", e)))?
            .map(|range| {
                (
                    range.channels(),
                    range.min_sample_rate().0,
                    range.max_sample_rate().0,
                    range.buffer_size().clone(),
                )
            })
            .collect();

        let frames = min_period_frames(&ranges, format).unwrap_or(FALLBACK_MIN_FRAMES);
        debug!("Device minimum buffer for {}: {} frames", format.format_string(), frames);
        Ok(frames as usize * format.bytes_per_frame())
    }

    fn open(&self, format: &StreamFormat, buffer_bytes: usize) -> Result<Box<dyn OutputSink>, AudioError> {
        let device = self.select_device()?;
        let sink = CpalSink::open(device, *format, buffer_bytes)?;
        Ok(Box::new(sink))
    }
}

/// Smallest period any config matching `format` accepts.
///
/// `None` when no matching config reports a usable range.
fn min_period_frames(ranges: &[(u16, u32, u32, SupportedBufferSize)], format: &StreamFormat) -> Option<u32> {
    ranges
        .iter()
        .filter(|(channels, min_rate, max_rate, _)| {
            *channels == format.channels && (*min_rate..=*max_rate).contains(&format.sample_rate)
        })
        .filter_map(|(_, _, _, buffer)| match buffer {
            SupportedBufferSize::Range { min, .. } if *min > 0 => Some(*min),
            _ => None,
        })
        .min()
}
