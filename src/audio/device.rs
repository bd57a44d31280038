//! Audio device enumeration and stream management
//!
//! The session worker only sees the [`AudioBackend`] trait: it hands over a
//! capture source and a playback sink and gets back stream handles that keep
//! the hardware running until closed. [`CpalBackend`] is the real
//! implementation.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, StreamConfig, SupportedBufferSize, SupportedStreamConfigRange};
use serde::Serialize;
use std::sync::Arc;

use crate::audio::capture::CaptureSource;
use crate::audio::playback::PlaybackSink;
use crate::constants::CHANNELS;
use crate::error::AudioError;

/// Requested stream parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    /// Device name, `None` for the system default
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per callback block
    pub block_size: u32,
}

impl StreamSpec {
    pub fn mono(device: Option<String>, sample_rate: u32, block_size: u32) -> Self {
        Self {
            device,
            sample_rate,
            channels: CHANNELS,
            block_size,
        }
    }
}

/// Stream configuration negotiated against what a device offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedConfig {
    pub config: StreamConfig,
    pub format: SampleFormat,
}

/// Pick a stream configuration for `spec` out of a device's supported ranges
///
/// Native `i16` is preferred; `f32` is accepted and converted in the
/// callback. The fixed block size is kept when the device reports it in
/// range (or reports nothing), otherwise the host default is used.
pub fn negotiate_config(
    spec: &StreamSpec,
    ranges: &[SupportedStreamConfigRange],
) -> Result<NegotiatedConfig, AudioError> {
    let rate = cpal::SampleRate(spec.sample_rate);
    let fits = |range: &&SupportedStreamConfigRange| {
        range.channels() == spec.channels
            && range.min_sample_rate() <= rate
            && rate <= range.max_sample_rate()
    };

    let range = [SampleFormat::I16, SampleFormat::F32]
        .into_iter()
        .find_map(|format| {
            ranges
                .iter()
                .filter(|range| fits(range))
                .find(|range| range.sample_format() == format)
        })
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!(
                "no i16/f32 config with {} ch at {} Hz",
                spec.channels, spec.sample_rate
            ))
        })?;

    let buffer_size = match range.buffer_size() {
        SupportedBufferSize::Range { min, max } if !(*min..=*max).contains(&spec.block_size) => {
            tracing::debug!(
                "Block size {} outside device range {}..={}, using host default",
                spec.block_size,
                min,
                max
            );
            cpal::BufferSize::Default
        }
        _ => cpal::BufferSize::Fixed(spec.block_size),
    };

    Ok(NegotiatedConfig {
        config: StreamConfig {
            channels: spec.channels,
            sample_rate: rate,
            buffer_size,
        },
        format: range.sample_format(),
    })
}

/// A running hardware stream
///
/// Dropping the handle also releases the device; `close` stops it first.
pub trait ActiveStream {
    fn close(self: Box<Self>);
}

/// Opens hardware streams wired to the session's callbacks
pub trait AudioBackend: Send + Sync {
    fn open_capture(
        &self,
        spec: &StreamSpec,
        source: Arc<CaptureSource>,
    ) -> Result<Box<dyn ActiveStream>, AudioError>;

    fn open_playback(
        &self,
        spec: &StreamSpec,
        sink: Arc<PlaybackSink>,
    ) -> Result<Box<dyn ActiveStream>, AudioError>;
}

/// Audio device description for the control surface
#[derive(Debug, Clone, Serialize)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
}

/// Backend using the platform's default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

struct CpalStream {
    stream: cpal::Stream,
    label: &'static str,
}

impl ActiveStream for CpalStream {
    fn close(self: Box<Self>) {
        if let Err(e) = self.stream.pause() {
            tracing::warn!("Failed to pause {} stream: {}", self.label, e);
        }
        tracing::debug!("{} stream closed", self.label);
    }
}

impl AudioBackend for CpalBackend {
    fn open_capture(
        &self,
        spec: &StreamSpec,
        source: Arc<CaptureSource>,
    ) -> Result<Box<dyn ActiveStream>, AudioError> {
        let device = find_input_device(spec.device.as_deref())?;
        let ranges: Vec<_> = device.supported_input_configs()?.collect();
        let NegotiatedConfig { config, format } = negotiate_config(spec, &ranges)?;
        let errors = source.clone();
        let on_error = move |err: cpal::StreamError| errors.on_stream_error(err.to_string());

        let stream = match format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| source.on_block(data),
                on_error,
                None,
            )?,
            _ => {
                let mut scratch: Vec<i16> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        scratch.extend(data.iter().map(|s| s.to_sample::<i16>()));
                        source.on_block(&scratch);
                    },
                    on_error,
                    None,
                )?
            }
        };
        stream.play()?;

        tracing::info!(
            "Capture stream started: {} Hz, {} ch, {:?}, {:?}",
            spec.sample_rate,
            spec.channels,
            format,
            config.buffer_size
        );
        Ok(Box::new(CpalStream {
            stream,
            label: "capture",
        }))
    }

    fn open_playback(
        &self,
        spec: &StreamSpec,
        sink: Arc<PlaybackSink>,
    ) -> Result<Box<dyn ActiveStream>, AudioError> {
        let device = find_output_device(spec.device.as_deref())?;
        let ranges: Vec<_> = device.supported_output_configs()?.collect();
        let NegotiatedConfig { config, format } = negotiate_config(spec, &ranges)?;
        let errors = sink.clone();
        let on_error = move |err: cpal::StreamError| errors.on_stream_error(err.to_string());

        let stream = match format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    sink.render(data);
                },
                on_error,
                None,
            )?,
            _ => {
                let mut scratch: Vec<i16> = Vec::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0);
                        sink.render(&mut scratch);
                        for (out, s) in data.iter_mut().zip(&scratch) {
                            *out = s.to_sample::<f32>();
                        }
                    },
                    on_error,
                    None,
                )?
            }
        };
        stream.play()?;

        tracing::info!(
            "Playback stream started: {} Hz, {} ch, {:?}, {:?}",
            spec.sample_rate,
            spec.channels,
            format,
            config.buffer_size
        );
        Ok(Box::new(CpalStream {
            stream,
            label: "playback",
        }))
    }
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices: Vec<AudioDeviceInfo> = Vec::new();

    let default_input_name = host.default_input_device().and_then(|d| d.name().ok());
    let default_output_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let sample_rates = supported_rates(&device, true);
                devices.push(AudioDeviceInfo {
                    is_default: default_input_name.as_ref() == Some(&name),
                    name,
                    is_input: true,
                    is_output: false,
                    sample_rates,
                });
            }
        }
    }

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_output_name.as_ref() == Some(&name);

                // Duplex devices show up once
                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.is_default |= is_default;
                } else {
                    let sample_rates = supported_rates(&device, false);
                    devices.push(AudioDeviceInfo {
                        name,
                        is_input: false,
                        is_output: true,
                        is_default,
                        sample_rates,
                    });
                }
            }
        }
    }

    devices
}

/// Sample rates the session cares about that a device supports
fn supported_rates(device: &cpal::Device, is_input: bool) -> Vec<u32> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = if is_input {
        device
            .supported_input_configs()
            .map(|iter| iter.collect())
            .unwrap_or_default()
    } else {
        device
            .supported_output_configs()
            .map(|iter| iter.collect())
            .unwrap_or_default()
    };

    let mut rates = Vec::new();
    for range in &ranges {
        for rate_val in [16_000u32, 24_000, 44_100, 48_000] {
            let rate = cpal::SampleRate(rate_val);
            if rate >= range.min_sample_rate()
                && rate <= range.max_sample_rate()
                && !rates.contains(&rate_val)
            {
                rates.push(rate_val);
            }
        }
    }
    rates.sort_unstable();
    rates
}

/// Find an input device by name, or the default one
pub fn find_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string())),
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
    }
}

/// Find an output device by name, or the default one
pub fn find_output_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
    }
}
