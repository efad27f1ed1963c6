//! Start/stop state machine for a pool of announced frame buffers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn, Span};

use crate::feature::sfnc;
use crate::frame::{FrameBuffer, FrameHandler};
use crate::session::DeviceSession;
use crate::traits::{lock, CameraError, Handle, Result, Transport};

/// Alignment requested for buffers handed to the driver.
pub const FRAME_ALIGNMENT: usize = 128;

/// Owns the frame pool of a session and drives the capture sequence.
///
/// `start` and `stop` are serialised by the pool mutex and hold it for their
/// full duration, including blocking acquisition commands and the driver
/// joining its delivery thread. Status queries never take that mutex, so
/// frame callbacks may call them while `stop` is waiting on them.
pub struct StreamController {
    frames: Mutex<Vec<Arc<FrameBuffer>>>,
    streaming: AtomicBool,
    buffer_count: AtomicUsize,
    span: Span,
}

impl StreamController {
    /// Idle controller logging under `span`.
    pub fn new(span: Span) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            streaming: AtomicBool::new(false),
            buffer_count: AtomicUsize::new(0),
            span,
        }
    }

    /// Whether acquisition is running.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Number of buffers in the active pool.
    pub fn buffer_count(&self) -> usize {
        self.buffer_count.load(Ordering::Acquire)
    }

    /// Announce `buffer_count` buffers, start capture, queue every buffer and
    /// optionally run `AcquisitionStart`. No-op while already streaming.
    ///
    /// On failure every buffer announced so far is revoked again and the
    /// controller stays idle.
    pub fn start(
        &self,
        session: &Arc<DeviceSession>,
        buffer_count: usize,
        on_frame: FrameHandler,
        start_acquisition: bool,
    ) -> Result<()> {
        let mut pool = lock(&self.frames);
        if self.is_streaming() {
            return Ok(());
        }
        if buffer_count == 0 {
            return Err(CameraError::InvalidValue(
                "stream needs at least one buffer".to_owned(),
            ));
        }

        let transport = session.transport();
        let handle = session.handle();

        let payload_size = transport
            .payload_size_get(handle)
            .inspect_err(|err| error!(parent: &self.span, %err, "reading payload size failed"))?;

        let mut frames = Vec::with_capacity(buffer_count);
        for _ in 0..buffer_count {
            match FrameBuffer::create(session, payload_size, FRAME_ALIGNMENT) {
                Ok(frame) => {
                    frame.set_callback(Arc::clone(&on_frame));
                    frames.push(frame);
                }
                Err(err) => {
                    error!(parent: &self.span, %err, "failed to create frame");
                    self.abort_start(transport.as_ref(), handle, &frames, false);
                    return Err(err);
                }
            }
        }

        if let Err(err) = transport.capture_start(handle) {
            error!(parent: &self.span, %err, "capture start failed");
            self.abort_start(transport.as_ref(), handle, &frames, false);
            return Err(err);
        }

        for frame in &frames {
            if let Err(err) = frame.queue() {
                error!(parent: &self.span, %err, "queue frame failed");
                self.abort_start(transport.as_ref(), handle, &frames, true);
                return Err(err);
            }
        }

        if start_acquisition {
            if let Err(err) = session.features().run_command(sfnc::ACQUISITION_START) {
                error!(parent: &self.span, %err, "acquisition start failed");
                self.abort_start(transport.as_ref(), handle, &frames, true);
                return Err(err);
            }
        }

        info!(parent: &self.span, buffers = buffer_count, payload_size, "streaming started");
        *pool = frames;
        self.buffer_count.store(buffer_count, Ordering::Release);
        self.streaming.store(true, Ordering::Release);

        Ok(())
    }

    /// Best-effort teardown of a half-started stream.
    fn abort_start(
        &self,
        transport: &dyn Transport,
        handle: Handle,
        frames: &[Arc<FrameBuffer>],
        capture_started: bool,
    ) {
        for frame in frames {
            frame.mark_revoked();
        }
        if capture_started {
            if let Err(err) = transport.capture_end(handle) {
                warn!(parent: &self.span, %err, "capture end during cleanup failed");
            }
            if let Err(err) = transport.capture_queue_flush(handle) {
                warn!(parent: &self.span, %err, "flush during cleanup failed");
            }
        }
        if !frames.is_empty() {
            if let Err(err) = transport.frame_revoke_all(handle) {
                warn!(parent: &self.span, %err, "revoke during cleanup failed");
            }
        }
    }

    /// Run `AcquisitionStop`, end capture, flush pending deliveries and revoke
    /// every buffer. No-op while idle.
    ///
    /// The first failing step is returned; earlier steps are not rolled back.
    pub fn stop(&self, session: &DeviceSession) -> Result<()> {
        let mut pool = lock(&self.frames);
        if !self.is_streaming() {
            return Ok(());
        }

        let transport = session.transport();
        let handle = session.handle();

        session
            .features()
            .run_command(sfnc::ACQUISITION_STOP)
            .inspect_err(|err| error!(parent: &self.span, %err, "acquisition stop failed"))?;

        transport
            .capture_end(handle)
            .inspect_err(|err| error!(parent: &self.span, %err, "capture end failed"))?;

        transport
            .capture_queue_flush(handle)
            .inspect_err(|err| error!(parent: &self.span, %err, "flush capture queue failed"))?;

        for frame in pool.iter() {
            frame.mark_revoked();
        }

        transport
            .frame_revoke_all(handle)
            .inspect_err(|err| error!(parent: &self.span, %err, "revoking frames failed"))?;

        pool.clear();
        self.buffer_count.store(0, Ordering::Release);
        self.streaming.store(false, Ordering::Release);
        info!(parent: &self.span, "streaming stopped");

        Ok(())
    }
}
