//! Vimbax-Camera: frame acquisition core for machine-vision cameras
//!
//! This library drives a camera through a handle-based [`Transport`]: it opens
//! a device session, manages a pool of frame buffers, streams frames to a
//! consumer callback and exposes typed feature access. A V4L2 transport is
//! included for running against real or virtual (vivid) devices; tests use a
//! scripted mock transport.

pub mod config;
pub mod device;
pub mod events;
pub mod feature;
pub mod frame;
pub mod pixel;
pub mod session;
pub mod stream;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use config::AcquisitionConfig;
pub use device::V4l2Transport;
pub use feature::{CancelToken, CommandWait, FeatureAccess};
pub use frame::{AllocationMode, FrameBuffer, FrameHandler, Timestamp};
pub use pixel::{Encoding, PixelFormat};
pub use session::{DeviceSession, SessionOptions};
pub use traits::{CameraError, CameraInfo, ErrorCode, Handle, Result, Transport};
