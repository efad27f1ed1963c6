//! Driver boundary and shared types for the acquisition core.
//!
//! The vendor transport is modelled as a handle-based [`Transport`] trait.
//! Everything above it (feature access, frame buffers, streaming) talks to
//! the camera exclusively through this trait, which keeps the core testable
//! with a scripted double.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque identifier for an open camera, or for one of its sub-modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle(pub u64);

/// Raw status code reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    /// Call succeeded.
    pub const SUCCESS: Self = Self(0);
    /// Unexpected fault inside the transport.
    pub const INTERNAL_FAULT: Self = Self(-1);
    /// Entity (camera, feature, file) not found.
    pub const NOT_FOUND: Self = Self(-3);
    /// Handle is not valid.
    pub const BAD_HANDLE: Self = Self(-4);
    /// Operation not permitted with the current access mode.
    pub const INVALID_ACCESS: Self = Self(-6);
    /// Parameter rejected by the transport.
    pub const BAD_PARAMETER: Self = Self(-7);
    /// Feature accessed with the wrong type.
    pub const WRONG_TYPE: Self = Self(-10);
    /// Value outside the accepted range or set.
    pub const INVALID_VALUE: Self = Self(-11);
    /// Operation timed out.
    pub const TIMEOUT: Self = Self(-12);
    /// Resources (memory, buffers) exhausted.
    pub const RESOURCES: Self = Self(-14);
    /// Call is not valid in the current state.
    pub const INVALID_CALL: Self = Self(-15);
    /// Operation not supported by this transport.
    pub const NOT_SUPPORTED: Self = Self(-18);
    /// Low-level I/O failure.
    pub const IO: Self = Self(-20);
    /// Unknown failure.
    pub const UNKNOWN: Self = Self(-28);
    /// Entity exists but is currently unavailable.
    pub const NOT_AVAILABLE: Self = Self(-30);
    /// Missing address or namespace information.
    pub const INVALID_ADDRESS: Self = Self(-32);
    /// Operation cancelled by the caller.
    pub const CANCELLED: Self = Self(-40);

    /// Symbolic name for the known codes.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "Success",
            -1 => "InternalFault",
            -3 => "NotFound",
            -4 => "BadHandle",
            -6 => "InvalidAccess",
            -7 => "BadParameter",
            -10 => "WrongType",
            -11 => "InvalidValue",
            -12 => "Timeout",
            -14 => "Resources",
            -15 => "InvalidCall",
            -18 => "NotSupported",
            -20 => "Io",
            -28 => "Unknown",
            -30 => "NotAvailable",
            -32 => "InvalidAddress",
            -40 => "Cancelled",
            _ => "Unrecognized",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The transport returned a non-success status.
    #[error("driver call failed with {0}")]
    Driver(ErrorCode),
    /// A feature or namespace does not meet an expected precondition.
    #[error("not available: {0}")]
    NotAvailable(String),
    /// A referenced path or entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Malformed caller input.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// Discovery found no camera that could be opened.
    #[error("no camera could be opened")]
    NoCamera,
    /// A command did not complete within the configured bound.
    #[error("operation timed out")]
    Timeout,
    /// A wait was cancelled through its token.
    #[error("operation cancelled")]
    Cancelled,
    /// I/O error from a device node.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    /// Captured frames do not look as expected.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl CameraError {
    /// Status code equivalent of this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Driver(code) => *code,
            Self::NotAvailable(_) => ErrorCode::NOT_AVAILABLE,
            Self::NotFound(_) | Self::NoCamera => ErrorCode::NOT_FOUND,
            Self::InvalidValue(_) | Self::Config(_) | Self::Validation(_) => {
                ErrorCode::INVALID_VALUE
            }
            Self::Timeout => ErrorCode::TIMEOUT,
            Self::Cancelled => ErrorCode::CANCELLED,
            Self::Io(_) => ErrorCode::IO,
        }
    }
}

impl From<ErrorCode> for CameraError {
    fn from(code: ErrorCode) -> Self {
        Self::Driver(code)
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Access modes a camera permits or is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessMode(pub u32);

impl AccessMode {
    /// No access.
    pub const NONE: Self = Self(0);
    /// Read/write access shared with other clients.
    pub const FULL: Self = Self(1);
    /// Read-only access.
    pub const READ: Self = Self(2);
    /// Exclusive access; required for streaming.
    pub const EXCLUSIVE: Self = Self(8);

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for AccessMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Immutable camera description captured at open time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraInfo {
    /// Short camera identifier.
    pub camera_id: String,
    /// Identifier that is unique across transport layers.
    pub camera_id_extended: String,
    /// User-facing camera name.
    pub camera_name: String,
    /// Model name.
    pub model_name: String,
    /// Serial number.
    pub serial: String,
    /// Access modes the camera currently permits.
    pub permitted_access: AccessMode,
    /// Sub-handle of the local (host side) device module.
    pub local_device_handle: Handle,
}

/// Value type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureType {
    /// 64-bit signed integer.
    Int,
    /// Double precision float.
    Float,
    /// Enumeration with string options.
    Enum,
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
    /// Executable command.
    Command,
    /// Type not reported.
    #[default]
    Unknown,
}

/// Feature metadata returned by [`Transport::feature_info_query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureInfo {
    /// Feature name.
    pub name: String,
    /// Value type.
    pub data_type: FeatureType,
    /// Naming-convention namespace, e.g. `"Standard"` or `"Custom"`.
    pub sfnc_namespace: Option<String>,
    /// Human readable name.
    pub display_name: String,
}

/// Outcome of a single buffer delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStatus {
    /// All image data was received.
    Complete,
    /// Data is missing.
    Incomplete,
    /// Buffer was too small for the payload.
    TooSmall,
    /// Delivery was aborted or corrupt.
    #[default]
    Invalid,
}

/// Driver-visible part of a frame buffer.
///
/// `buffer` is `Some` when the caller provides the memory the driver writes
/// into. When `None` the driver delivers into its own memory and publishes the
/// image through `image_data`.
#[derive(Debug, Default)]
pub struct DriverFrame {
    /// Caller-provided buffer, if any.
    pub buffer: Option<Vec<u8>>,
    /// Payload size the driver should use for this frame.
    pub buffer_size: usize,
    /// Image bytes for driver-managed buffers.
    pub image_data: Vec<u8>,
    /// Status of the last delivery.
    pub receive_status: FrameStatus,
    /// Delivered image width.
    pub width: u32,
    /// Delivered image height.
    pub height: u32,
    /// Pixel format code of the delivered image.
    pub pixel_format: u32,
    /// Driver sequence id.
    pub frame_id: u64,
    /// Device clock ticks at capture.
    pub timestamp: u64,
}

impl DriverFrame {
    /// Image region of the last delivery.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        match &self.buffer {
            Some(buf) => buf.as_slice(),
            None => self.image_data.as_slice(),
        }
    }
}

/// Lock a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frame memory shared between the session and the driver.
pub type SharedFrame = Arc<Mutex<DriverFrame>>;

/// One-shot completion callback handed to [`Transport::capture_frame_queue`].
pub type FrameCallback = Box<dyn FnOnce() + Send>;

/// Which features a settings file includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistType {
    /// Every feature.
    All,
    /// Streamable features only.
    Streamable,
    /// Every feature except look-up tables.
    #[default]
    NoLut,
}

/// Which modules a settings file covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModulePersist {
    /// Transport layer.
    TransportLayer,
    /// Interface.
    Interface,
    /// Remote device (the camera itself).
    #[default]
    RemoteDevice,
    /// Local device.
    LocalDevice,
    /// Every module.
    All,
}

/// Log verbosity the driver uses while persisting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistLogLevel {
    /// Silent.
    Nothing,
    /// Errors only.
    Error,
    /// Debug output.
    Debug,
    /// Warnings and errors.
    #[default]
    Warn,
    /// Everything.
    Trace,
}

/// Policy passed to the driver's settings load/save calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistSettings {
    /// Feature selection.
    pub persist_type: PersistType,
    /// Module selection.
    pub module: ModulePersist,
    /// Passes the driver makes to resolve feature dependencies.
    pub max_iterations: u32,
    /// Driver log level.
    pub log_level: PersistLogLevel,
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            persist_type: PersistType::NoLut,
            module: ModulePersist::RemoteDevice,
            max_iterations: 10,
            log_level: PersistLogLevel::Warn,
        }
    }
}

/// Handle-based camera transport.
///
/// Implementations invoke queued [`FrameCallback`]s from their own
/// notification thread(s).
pub trait Transport: Send + Sync {
    /// Enumerate reachable cameras.
    fn cameras_list(&self) -> Result<Vec<CameraInfo>>;

    /// Open a camera by any of its identifiers.
    fn camera_open(&self, id: &str, mode: AccessMode) -> Result<Handle>;

    /// Close an open camera.
    fn camera_close(&self, handle: Handle) -> Result<()>;

    /// Query the description of an open camera.
    fn camera_info_query(&self, handle: Handle) -> Result<CameraInfo>;

    /// Read an integer feature.
    fn feature_int_get(&self, handle: Handle, name: &str) -> Result<i64>;

    /// Write an integer feature.
    fn feature_int_set(&self, handle: Handle, name: &str, value: i64) -> Result<()>;

    /// Read a float feature.
    fn feature_float_get(&self, handle: Handle, name: &str) -> Result<f64>;

    /// Write a float feature.
    fn feature_float_set(&self, handle: Handle, name: &str, value: f64) -> Result<()>;

    /// Read a boolean feature.
    fn feature_bool_get(&self, handle: Handle, name: &str) -> Result<bool>;

    /// Write a boolean feature.
    fn feature_bool_set(&self, handle: Handle, name: &str, value: bool) -> Result<()>;

    /// Read the current option of an enum feature.
    fn feature_enum_get(&self, handle: Handle, name: &str) -> Result<String>;

    /// Select an option of an enum feature.
    fn feature_enum_set(&self, handle: Handle, name: &str, option: &str) -> Result<()>;

    /// Integer value behind an enum option.
    fn feature_enum_as_int(&self, handle: Handle, name: &str, option: &str) -> Result<i64>;

    /// Read a string feature.
    fn feature_string_get(&self, handle: Handle, name: &str) -> Result<String>;

    /// Write a string feature.
    fn feature_string_set(&self, handle: Handle, name: &str, value: &str) -> Result<()>;

    /// Start a command feature.
    fn feature_command_run(&self, handle: Handle, name: &str) -> Result<()>;

    /// Whether a previously started command has finished.
    fn feature_command_is_done(&self, handle: Handle, name: &str) -> Result<bool>;

    /// Feature metadata.
    fn feature_info_query(&self, handle: Handle, name: &str) -> Result<FeatureInfo>;

    /// Bytes the driver needs per frame.
    fn payload_size_get(&self, handle: Handle) -> Result<usize>;

    /// Make a frame known to the driver.
    fn frame_announce(&self, handle: Handle, frame: &SharedFrame) -> Result<()>;

    /// Forget every announced frame.
    fn frame_revoke_all(&self, handle: Handle) -> Result<()>;

    /// Prepare the capture engine.
    fn capture_start(&self, handle: Handle) -> Result<()>;

    /// Stop the capture engine.
    fn capture_end(&self, handle: Handle) -> Result<()>;

    /// Drop every pending delivery without invoking callbacks.
    fn capture_queue_flush(&self, handle: Handle) -> Result<()>;

    /// Queue an announced frame; `callback` fires once it has been filled.
    fn capture_frame_queue(
        &self,
        handle: Handle,
        frame: &SharedFrame,
        callback: FrameCallback,
    ) -> Result<()>;

    /// Persist camera settings to `path`.
    fn settings_save(&self, handle: Handle, path: &Path, settings: &PersistSettings)
        -> Result<()>;

    /// Restore camera settings from `path`.
    fn settings_load(&self, handle: Handle, path: &Path, settings: &PersistSettings)
        -> Result<()>;
}
