//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod playback;

pub use buffer::{AudioFrame, FrameQueue, SharedFrameQueue};
pub use capture::CaptureSource;
pub use device::{
    list_devices, negotiate_config, AudioBackend, AudioDeviceInfo, CpalBackend, NegotiatedConfig,
    StreamSpec,
};
pub use playback::{OverflowPolicy, PlaybackBuffer, PlaybackSink};
