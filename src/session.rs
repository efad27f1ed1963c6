//! An open camera: discovery, streaming facade and settings persistence.
//!
//! A [`DeviceSession`] is always held in an [`Arc`]. Frame buffers keep a weak
//! reference back to it, so a buffer outliving its session fails to re-queue
//! instead of keeping the camera open.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, info_span, warn, Span};

use crate::feature::{sfnc, CommandWait, FeatureAccess};
use crate::frame::FrameBuffer;
use crate::stream::StreamController;
use crate::traits::{
    AccessMode, CameraError, CameraInfo, Handle, PersistSettings, Result, Transport,
};

/// Construction parameters for [`DeviceSession::open`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Wait used for `AcquisitionStart`/`AcquisitionStop` and other commands.
    pub command_wait: CommandWait,
    /// Parent span for everything the session logs.
    pub span: Span,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            command_wait: CommandWait::default(),
            span: Span::current(),
        }
    }
}

/// One exclusively opened camera.
pub struct DeviceSession {
    transport: Arc<dyn Transport>,
    handle: Handle,
    info: CameraInfo,
    features: FeatureAccess,
    local_features: FeatureAccess,
    stream: StreamController,
    span: Span,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("handle", &self.handle)
            .field("info", &self.info)
            .field("streaming", &self.stream.is_streaming())
            .finish_non_exhaustive()
    }
}

fn open_exclusive(transport: &dyn Transport, id: &str, span: &Span) -> Option<Handle> {
    match transport.camera_open(id, AccessMode::EXCLUSIVE) {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!(parent: span, camera = id, %err, "failed to open camera");
            None
        }
    }
}

fn discover(transport: &dyn Transport, name: &str, span: &Span) -> Option<Handle> {
    let cameras = transport.cameras_list().unwrap_or_else(|err| {
        error!(parent: span, %err, "listing cameras failed");
        Vec::new()
    });
    let exclusive = |info: &CameraInfo| info.permitted_access.contains(AccessMode::EXCLUSIVE);

    if name.is_empty() {
        info!(parent: span, "no camera requested, opening first available");
        if cameras.is_empty() {
            error!(parent: span, "camera list is empty");
            return None;
        }
        return cameras.iter().filter(|info| exclusive(info)).find_map(|info| {
            info!(parent: span, camera = %info.camera_id_extended, "trying camera");
            open_exclusive(transport, &info.camera_id_extended, span)
        });
    }

    let matches = |info: &CameraInfo| {
        info.camera_id == name || info.camera_id_extended == name || info.serial == name
    };
    let by_listing = cameras
        .iter()
        .filter(|info| matches(info) && exclusive(info))
        .find_map(|info| open_exclusive(transport, &info.camera_id_extended, span));
    if by_listing.is_some() {
        return by_listing;
    }

    warn!(parent: span, camera = name, "no matching camera listed, opening by id");
    open_exclusive(transport, name, span)
}

impl DeviceSession {
    /// Open a camera by id, extended id or serial number.
    ///
    /// An empty `name` opens the first camera that permits exclusive access.
    pub fn open(
        transport: Arc<dyn Transport>,
        name: &str,
        options: SessionOptions,
    ) -> Result<Arc<Self>> {
        let Some(handle) = discover(transport.as_ref(), name, &options.span) else {
            error!(parent: &options.span, camera = name, "no camera available");
            return Err(CameraError::NoCamera);
        };

        let info = transport.camera_info_query(handle).unwrap_or_else(|err| {
            error!(parent: &options.span, %err, "failed to query camera info");
            CameraInfo::default()
        });

        let span = info_span!(parent: &options.span, "camera", serial = %info.serial);
        info!(
            parent: &span,
            model = %info.model_name,
            name = %info.camera_name,
            serial = %info.serial,
            "opened camera"
        );

        let features = FeatureAccess::new(Arc::clone(&transport), handle, span.clone())
            .with_command_wait(options.command_wait);
        let local_features = features.for_handle(info.local_device_handle);

        Ok(Arc::new(Self {
            transport,
            handle,
            info,
            features,
            local_features,
            stream: StreamController::new(span.clone()),
            span,
        }))
    }

    /// Driver handle of the camera.
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Camera identity reported at open time.
    pub const fn info(&self) -> &CameraInfo {
        &self.info
    }

    /// Transport the camera was opened on.
    pub const fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Features of the remote device.
    pub const fn features(&self) -> &FeatureAccess {
        &self.features
    }

    /// Features of the local device (transport-side clock and counters).
    pub const fn local_features(&self) -> &FeatureAccess {
        &self.local_features
    }

    /// Span all session logging is parented to.
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Device clock rate in Hz, when the local device reports one.
    pub fn timestamp_frequency(&self) -> Option<i64> {
        self.local_features
            .try_get_int(sfnc::DEVICE_TIMESTAMP_FREQUENCY)
    }

    /// Announce `buffer_count` buffers and start delivering frames to
    /// `on_frame`. Does nothing while already streaming.
    ///
    /// Completed frames are not re-queued automatically: `on_frame` (or
    /// whoever it hands the frame to) calls [`FrameBuffer::queue`] when done.
    pub fn start_streaming<F>(
        self: &Arc<Self>,
        buffer_count: usize,
        on_frame: F,
        start_acquisition: bool,
    ) -> Result<()>
    where
        F: Fn(Arc<FrameBuffer>) + Send + Sync + 'static,
    {
        self.stream
            .start(self, buffer_count, Arc::new(on_frame), start_acquisition)
    }

    /// Stop acquisition and revoke all buffers. Must not be called from a
    /// frame callback.
    pub fn stop_streaming(&self) -> Result<()> {
        self.stream.stop(self)
    }

    /// Whether frames are being delivered.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_streaming()
    }

    /// Persist the camera configuration to an `.xml` file.
    ///
    /// The directory part of `path` must exist; a bare file name has none and
    /// is rejected with [`CameraError::NotFound`].
    pub fn settings_save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if path.extension().and_then(|ext| ext.to_str()) != Some("xml") {
            return Err(CameraError::InvalidValue(format!(
                "settings file {} must have extension .xml",
                path.display()
            )));
        }
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        if parent.as_os_str().is_empty() || !parent.exists() {
            return Err(CameraError::NotFound(format!(
                "directory of {} does not exist",
                path.display()
            )));
        }

        self.transport
            .settings_save(self.handle, path, &PersistSettings::default())
            .inspect_err(|err| {
                error!(parent: &self.span, path = %path.display(), %err, "settings save failed");
            })?;
        info!(parent: &self.span, path = %path.display(), "settings saved");
        Ok(())
    }

    /// Restore the camera configuration from a previously saved file.
    pub fn settings_load<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CameraError::NotFound(path.display().to_string()));
        }

        self.transport
            .settings_load(self.handle, path, &PersistSettings::default())
            .inspect_err(|err| {
                error!(parent: &self.span, path = %path.display(), %err, "settings load failed");
            })?;
        info!(parent: &self.span, path = %path.display(), "settings loaded");
        Ok(())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Err(err) = self.stream.stop(self) {
            error!(parent: &self.span, %err, "stopping stream on close failed");
        }
        match self.transport.camera_close(self.handle) {
            Ok(()) => info!(parent: &self.span, "camera closed"),
            Err(err) => error!(parent: &self.span, %err, "camera close failed"),
        }
    }
}
