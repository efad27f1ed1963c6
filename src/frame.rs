//! Frame buffers announced to the driver.
//!
//! A [`FrameBuffer`] owns the memory for one image. At construction it picks
//! an [`AllocationMode`] by comparing the payload size the driver asks for
//! with the image geometry, then announces itself. Each completed delivery
//! is converted in place (bit-depth unpacking, encoding tag, wall-clock
//! timestamp) before the consumer callback sees it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, warn, Span};

use crate::feature::{sfnc, FeatureAccess};
use crate::pixel::{left_shift16, left_shift16_in_place, Encoding, PixelFormat};
use crate::session::DeviceSession;
use crate::traits::{
    lock, CameraError, DriverFrame, ErrorCode, FrameStatus, Handle, Result, SharedFrame,
    Transport,
};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Consumer callback receiving each completed frame.
pub type FrameHandler = Arc<dyn Fn(Arc<FrameBuffer>) + Send + Sync>;

/// Where the final image bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    /// The driver writes straight into our buffer; no copy on delivery.
    ZeroCopy,
    /// The driver uses its own buffer; the image is copied out on delivery.
    TransportOwned,
}

impl AllocationMode {
    /// Zero-copy only when the payload is exactly the image.
    #[must_use]
    pub const fn select(expected_size: usize, requested_size: usize) -> Self {
        if expected_size == requested_size {
            Self::ZeroCopy
        } else {
            Self::TransportOwned
        }
    }
}

/// Wall-clock capture time split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    /// Whole seconds.
    pub sec: u64,
    /// Sub-second remainder in nanoseconds.
    pub nanosec: u32,
}

impl Timestamp {
    /// Split a nanosecond count.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        // Remainder is always below 1e9
        #[allow(clippy::cast_possible_truncation)]
        let nanosec = (nanos % NANOS_PER_SEC) as u32;
        Self {
            sec: nanos / NANOS_PER_SEC,
            nanosec,
        }
    }

    /// As a [`Duration`] since the device epoch.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::new(self.sec, self.nanosec)
    }
}

/// Convert device clock ticks to nanoseconds.
///
/// Without a usable frequency the ticks are assumed to be nanoseconds already.
#[must_use]
pub fn timestamp_to_ns(ticks: u64, frequency: Option<i64>) -> u64 {
    match frequency
        .and_then(|hz| u64::try_from(hz).ok())
        .filter(|hz| *hz > 0)
    {
        Some(hz) if hz > NANOS_PER_SEC => ticks / (hz / NANOS_PER_SEC),
        Some(hz) => ticks.saturating_mul(NANOS_PER_SEC / hz),
        None => ticks,
    }
}

/// Row stride and total image size for the given geometry.
pub fn image_geometry(width: i64, height: i64, bits_per_pixel: u32) -> Result<(usize, usize)> {
    let width = usize::try_from(width)
        .map_err(|_| CameraError::InvalidValue(format!("width {width}")))?;
    let height = usize::try_from(height)
        .map_err(|_| CameraError::InvalidValue(format!("height {height}")))?;

    let overflow = || CameraError::InvalidValue(format!("{width}x{height} image overflows"));
    let step = width
        .checked_mul(bits_per_pixel as usize)
        .ok_or_else(overflow)?
        / 8;
    let size = height.checked_mul(step).ok_or_else(overflow)?;

    Ok((step, size))
}

#[derive(Debug, Default)]
struct Header {
    encoding: Encoding,
    width: u32,
    height: u32,
    frame_id: u64,
    stamp: Timestamp,
}

/// One image buffer shared between the session, the driver and consumers.
///
/// The buffer never upgrades its session reference: re-queuing and clock
/// lookups go through its own transport and handle copies, so the last
/// owner of the session is always the one that drops it.
pub struct FrameBuffer {
    session: Weak<DeviceSession>,
    transport: Arc<dyn Transport>,
    handle: Handle,
    local_features: FeatureAccess,
    this: Weak<FrameBuffer>,
    allocation_mode: AllocationMode,
    step: usize,
    driver_frame: SharedFrame,
    // Decoded image; only used for transport-owned buffers.
    data: Mutex<Vec<u8>>,
    header: Mutex<Header>,
    on_frame: Mutex<Option<FrameHandler>>,
    revoked: AtomicBool,
    span: Span,
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("allocation_mode", &self.allocation_mode)
            .field("step", &self.step)
            .field("header", &*lock(&self.header))
            .finish_non_exhaustive()
    }
}

impl FrameBuffer {
    /// Allocate a buffer for the session's current image format and announce
    /// it to the driver.
    ///
    /// `requested_size` is the payload size reported by the driver. Buffers
    /// handed to the driver reserve capacity rounded up to `alignment`.
    pub fn create(
        session: &Arc<DeviceSession>,
        requested_size: usize,
        alignment: usize,
    ) -> Result<Arc<Self>> {
        let features = session.features();
        let pixel_format = features.pixel_format()?;
        let width = features.get_int(sfnc::WIDTH)?;
        let height = features.get_int(sfnc::HEIGHT)?;

        let (step, expected_size) =
            image_geometry(width, height, pixel_format.bits_per_pixel())?;
        let allocation_mode = AllocationMode::select(expected_size, requested_size);

        let (driver_frame, data) = match allocation_mode {
            AllocationMode::ZeroCopy => {
                let capacity = requested_size.next_multiple_of(alignment.max(1));
                let mut buffer = Vec::with_capacity(capacity);
                buffer.resize(requested_size, 0);
                let frame = DriverFrame {
                    buffer: Some(buffer),
                    buffer_size: requested_size,
                    ..DriverFrame::default()
                };
                (frame, Vec::new())
            }
            AllocationMode::TransportOwned => {
                let frame = DriverFrame {
                    buffer: None,
                    buffer_size: requested_size,
                    ..DriverFrame::default()
                };
                (frame, vec![0; expected_size])
            }
        };

        let frame = Arc::new_cyclic(|this| Self {
            session: Arc::downgrade(session),
            transport: Arc::clone(session.transport()),
            handle: session.handle(),
            local_features: session.local_features().clone(),
            this: this.clone(),
            allocation_mode,
            step,
            driver_frame: Arc::new(Mutex::new(driver_frame)),
            data: Mutex::new(data),
            header: Mutex::new(Header::default()),
            on_frame: Mutex::new(None),
            revoked: AtomicBool::new(false),
            span: session.span().clone(),
        });

        frame
            .transport
            .frame_announce(frame.handle, &frame.driver_frame)?;

        debug!(
            parent: &frame.span,
            %pixel_format,
            ?allocation_mode,
            requested_size,
            expected_size,
            "frame announced"
        );

        Ok(frame)
    }

    /// Callback invoked with every completed frame.
    pub fn set_callback(&self, handler: FrameHandler) {
        *lock(&self.on_frame) = Some(handler);
    }

    /// Hand the buffer to the driver for the next delivery.
    ///
    /// Fails once the owning stream has been stopped or the session is gone.
    pub fn queue(&self) -> Result<()> {
        if self.revoked.load(Ordering::Acquire) {
            return Err(CameraError::Driver(ErrorCode::INVALID_CALL));
        }
        if self.session.strong_count() == 0 {
            return Err(CameraError::Driver(ErrorCode::UNKNOWN));
        }

        let this = self.this.clone();
        self.transport.capture_frame_queue(
            self.handle,
            &self.driver_frame,
            Box::new(move || {
                // A late delivery for a dropped buffer is discarded
                if let Some(frame) = this.upgrade() {
                    frame.on_delivery();
                }
            }),
        )
    }

    pub(crate) fn mark_revoked(&self) {
        self.revoked.store(true, Ordering::Release);
    }

    fn on_delivery(self: &Arc<Self>) {
        let status = lock(&self.driver_frame).receive_status;

        if status == FrameStatus::Complete {
            self.on_frame_ready();
        } else {
            warn!(parent: &self.span, ?status, "frame received incomplete, re-queueing");
            if let Err(err) = self.queue() {
                debug!(parent: &self.span, %err, "dropping frame, re-queue refused");
            }
        }
    }

    fn on_frame_ready(self: &Arc<Self>) {
        let frequency = self
            .local_features
            .try_get_int(sfnc::DEVICE_TIMESTAMP_FREQUENCY);

        {
            let mut driver_frame = lock(&self.driver_frame);
            let pixel_format = PixelFormat(driver_frame.pixel_format);
            let stamp =
                Timestamp::from_nanos(timestamp_to_ns(driver_frame.timestamp, frequency));

            *lock(&self.header) = Header {
                encoding: pixel_format.encoding(),
                width: driver_frame.width,
                height: driver_frame.height,
                frame_id: driver_frame.frame_id,
                stamp,
            };

            self.transform(&mut driver_frame, pixel_format);
        }

        let handler = lock(&self.on_frame).clone();
        if let Some(handler) = handler {
            handler(Arc::clone(self));
        }
    }

    fn transform(&self, driver_frame: &mut DriverFrame, pixel_format: PixelFormat) {
        let mut data = lock(&self.data);

        match (pixel_format.msb_shift(), self.allocation_mode) {
            (Some(shift), AllocationMode::ZeroCopy) => {
                if let Some(buffer) = driver_frame.buffer.as_mut() {
                    left_shift16_in_place(buffer, shift);
                }
            }
            (Some(shift), AllocationMode::TransportOwned) => {
                left_shift16(&mut data, &driver_frame.image_data, shift);
            }
            (None, AllocationMode::TransportOwned) => {
                let len = data.len().min(driver_frame.image_data.len());
                if let (Some(dst), Some(src)) =
                    (data.get_mut(..len), driver_frame.image_data.get(..len))
                {
                    dst.copy_from_slice(src);
                }
            }
            (None, AllocationMode::ZeroCopy) => {}
        }
    }

    /// Borrow the final image bytes.
    pub fn with_data<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        match self.allocation_mode {
            AllocationMode::ZeroCopy => {
                let driver_frame = lock(&self.driver_frame);
                f(driver_frame.buffer.as_deref().unwrap_or_default())
            }
            AllocationMode::TransportOwned => f(lock(&self.data).as_slice()),
        }
    }

    /// Copy of the final image bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.with_data(<[u8]>::to_vec)
    }

    /// How the buffer memory is owned.
    pub const fn allocation_mode(&self) -> AllocationMode {
        self.allocation_mode
    }

    /// Bytes per image row.
    pub const fn step(&self) -> usize {
        self.step
    }

    /// Encoding of the last completed frame.
    pub fn encoding(&self) -> Encoding {
        lock(&self.header).encoding
    }

    /// Width of the last completed frame.
    pub fn width(&self) -> u32 {
        lock(&self.header).width
    }

    /// Height of the last completed frame.
    pub fn height(&self) -> u32 {
        lock(&self.header).height
    }

    /// Driver sequence id of the last completed frame.
    pub fn frame_id(&self) -> u64 {
        lock(&self.header).frame_id
    }

    /// Capture time of the last completed frame.
    pub fn stamp(&self) -> Timestamp {
        lock(&self.header).stamp
    }

    /// Samples are always little-endian.
    pub const fn is_bigendian(&self) -> bool {
        false
    }
}
