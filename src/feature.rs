//! Typed feature access over an open handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, Span};

use crate::pixel::PixelFormat;
use crate::traits::{CameraError, ErrorCode, FeatureInfo, Handle, Result, Transport};

/// Standard feature names the acquisition core depends on.
pub mod sfnc {
    /// Current pixel format (enum).
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    /// Image width in pixels (int).
    pub const WIDTH: &str = "Width";
    /// Image height in pixels (int).
    pub const HEIGHT: &str = "Height";
    /// Starts image acquisition (command).
    pub const ACQUISITION_START: &str = "AcquisitionStart";
    /// Stops image acquisition (command).
    pub const ACQUISITION_STOP: &str = "AcquisitionStop";
    /// Tick rate of the device clock in Hz (int, local device).
    pub const DEVICE_TIMESTAMP_FREQUENCY: &str = "DeviceTimestampFrequency";
    /// Namespace of standard features.
    pub const STANDARD_NAMESPACE: &str = "Standard";
}

/// Interval between command completion polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared flag that aborts a pending [`CommandWait`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every wait observing this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Blocking wait used while a command completes.
///
/// Polls a completion predicate every `interval`. Without a timeout the wait
/// is unbounded and only a [`CancelToken`] can end it early.
#[derive(Debug, Clone)]
pub struct CommandWait {
    interval: Duration,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl Default for CommandWait {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl CommandWait {
    /// Unbounded wait polling every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Fail with [`CameraError::Timeout`] once `timeout` has elapsed.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Observe `token` between polls.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token observed by this wait.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Poll `done` until it reports completion.
    pub fn wait_until<F>(&self, mut done: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let started = Instant::now();
        loop {
            if done()? {
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(CameraError::Cancelled);
            }
            if self.timeout.is_some_and(|timeout| started.elapsed() >= timeout) {
                return Err(CameraError::Timeout);
            }
            thread::sleep(self.interval);
        }
    }
}

/// Typed get/set/run wrappers for the features of one handle.
#[derive(Clone)]
pub struct FeatureAccess {
    transport: Arc<dyn Transport>,
    handle: Handle,
    wait: CommandWait,
    span: Span,
}

impl std::fmt::Debug for FeatureAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureAccess")
            .field("handle", &self.handle)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl FeatureAccess {
    /// Feature access for `handle`, logging under `span`.
    pub fn new(transport: Arc<dyn Transport>, handle: Handle, span: Span) -> Self {
        Self {
            transport,
            handle,
            wait: CommandWait::default(),
            span,
        }
    }

    /// Replace the wait used by [`run_command`](Self::run_command).
    #[must_use]
    pub fn with_command_wait(mut self, wait: CommandWait) -> Self {
        self.wait = wait;
        self
    }

    /// Same transport and settings, different handle (e.g. the local device).
    #[must_use]
    pub fn for_handle(&self, handle: Handle) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            handle,
            wait: self.wait.clone(),
            span: self.span.clone(),
        }
    }

    /// Handle this accessor targets.
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    fn log_failure(&self, what: &str, name: &str, err: &CameraError) {
        error!(parent: &self.span, feature = name, %err, "{what} failed");
    }

    /// Read an integer feature.
    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.transport
            .feature_int_get(self.handle, name)
            .inspect_err(|err| self.log_failure("get integer feature", name, err))
    }

    /// Read an integer feature the device may not provide.
    ///
    /// Failures are only logged at debug level.
    pub fn try_get_int(&self, name: &str) -> Option<i64> {
        self.transport
            .feature_int_get(self.handle, name)
            .inspect_err(|err| {
                debug!(parent: &self.span, feature = name, %err, "optional feature unavailable");
            })
            .ok()
    }

    /// Write an integer feature.
    pub fn set_int(&self, name: &str, value: i64) -> Result<()> {
        self.transport
            .feature_int_set(self.handle, name, value)
            .inspect_err(|err| self.log_failure("set integer feature", name, err))
    }

    /// Read a float feature.
    pub fn get_float(&self, name: &str) -> Result<f64> {
        self.transport
            .feature_float_get(self.handle, name)
            .inspect_err(|err| self.log_failure("get float feature", name, err))
    }

    /// Write a float feature.
    pub fn set_float(&self, name: &str, value: f64) -> Result<()> {
        self.transport
            .feature_float_set(self.handle, name, value)
            .inspect_err(|err| self.log_failure("set float feature", name, err))
    }

    /// Read a boolean feature.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.transport
            .feature_bool_get(self.handle, name)
            .inspect_err(|err| self.log_failure("get bool feature", name, err))
    }

    /// Write a boolean feature.
    pub fn set_bool(&self, name: &str, value: bool) -> Result<()> {
        self.transport
            .feature_bool_set(self.handle, name, value)
            .inspect_err(|err| self.log_failure("set bool feature", name, err))
    }

    /// Read the current option of an enum feature.
    pub fn get_enum(&self, name: &str) -> Result<String> {
        self.transport
            .feature_enum_get(self.handle, name)
            .inspect_err(|err| self.log_failure("get enum feature", name, err))
    }

    /// Select an enum option.
    pub fn set_enum(&self, name: &str, option: &str) -> Result<()> {
        self.transport
            .feature_enum_set(self.handle, name, option)
            .inspect_err(|err| self.log_failure("set enum feature", name, err))
    }

    /// Integer representation of an enum option.
    pub fn enum_to_int(&self, name: &str, option: &str) -> Result<i64> {
        self.transport
            .feature_enum_as_int(self.handle, name, option)
            .inspect_err(|err| {
                error!(parent: &self.span, feature = name, option, %err, "enum to int conversion failed");
            })
    }

    /// Read a string feature.
    pub fn get_string(&self, name: &str) -> Result<String> {
        self.transport
            .feature_string_get(self.handle, name)
            .inspect_err(|err| self.log_failure("get string feature", name, err))
    }

    /// Write a string feature.
    pub fn set_string(&self, name: &str, value: &str) -> Result<()> {
        self.transport
            .feature_string_set(self.handle, name, value)
            .inspect_err(|err| self.log_failure("set string feature", name, err))
    }

    /// Run a command and block until the driver reports it done.
    ///
    /// Never call this from a frame callback: it stalls the delivery thread
    /// for the duration of the command.
    pub fn run_command(&self, name: &str) -> Result<()> {
        self.transport
            .feature_command_run(self.handle, name)
            .inspect_err(|err| self.log_failure("run command", name, err))?;

        self.wait
            .wait_until(|| self.transport.feature_command_is_done(self.handle, name))
            .inspect_err(|err| self.log_failure("wait for command", name, err))?;

        debug!(parent: &self.span, command = name, "command completed");
        Ok(())
    }

    /// Feature metadata including its namespace.
    pub fn query_feature_info(&self, name: &str) -> Result<FeatureInfo> {
        self.transport
            .feature_info_query(self.handle, name)
            .inspect_err(|err| self.log_failure("read feature info", name, err))
    }

    /// Current pixel format, only trusted when it is a standard feature.
    pub fn pixel_format(&self) -> Result<PixelFormat> {
        let info = self.query_feature_info(sfnc::PIXEL_FORMAT)?;

        match info.sfnc_namespace.as_deref() {
            None => return Err(CameraError::Driver(ErrorCode::INVALID_ADDRESS)),
            Some(sfnc::STANDARD_NAMESPACE) => {}
            Some(other) => {
                return Err(CameraError::NotAvailable(format!(
                    "{} is in namespace {other}",
                    sfnc::PIXEL_FORMAT
                )))
            }
        }

        let option = self.get_enum(sfnc::PIXEL_FORMAT)?;
        let value = self.enum_to_int(sfnc::PIXEL_FORMAT, &option)?;

        u32::try_from(value).map(PixelFormat).map_err(|_| {
            CameraError::InvalidValue(format!("pixel format code {value} out of range"))
        })
    }
}
