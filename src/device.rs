//! V4L2 transport implementation using the v4l crate.
//!
//! Each `/dev/video*` capture node is exposed as a camera. Image geometry and
//! pixel format are standard features backed by the negotiated V4L2 format;
//! every other V4L2 control is reachable by its name with spaces and
//! punctuation removed (e.g. `"White Balance Automatic"` becomes
//! `WhiteBalanceAutomatic`). Frames are captured through an mmap stream on a
//! dedicated thread which fills queued frames and runs their callbacks.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn, Span};
use v4l::buffer::{Metadata, Type};
use v4l::capability::Flags;
use v4l::context;
use v4l::control::{Control, Description, Type as ControlType, Value};
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture as _;
use v4l::{Device, Format, FourCC};

use crate::feature::sfnc;
use crate::pixel::PixelFormat;
use crate::traits::{
    lock, AccessMode, CameraError, CameraInfo, DriverFrame, ErrorCode, FeatureInfo, FeatureType,
    FrameCallback, FrameStatus, Handle, PersistSettings, Result, SharedFrame, Transport,
};

/// V4L2 buffer timestamps count microseconds.
pub const TIMESTAMP_FREQUENCY: i64 = 1_000_000;

/// Model name of the camera (string, read-only).
pub const DEVICE_MODEL_NAME: &str = "DeviceModelName";
/// Bus location used as serial number (string, read-only).
pub const DEVICE_SERIAL_NUMBER: &str = "DeviceSerialNumber";

const CUSTOM_NAMESPACE: &str = "Custom";
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);
const IDLE_POLL: Duration = Duration::from_millis(5);

const FORMATS: &[(&[u8; 4], PixelFormat)] = &[
    (b"GREY", PixelFormat::MONO8),
    (b"Y10 ", PixelFormat::MONO10),
    (b"Y12 ", PixelFormat::MONO12),
    (b"Y14 ", PixelFormat::MONO14),
    (b"Y16 ", PixelFormat::MONO16),
    (b"YUYV", PixelFormat::YUV422_8),
    (b"UYVY", PixelFormat::YUV422_PACKED),
    (b"RGB3", PixelFormat::RGB8),
    (b"BGR3", PixelFormat::BGR8),
    (b"AB24", PixelFormat::RGBA8),
    (b"AR24", PixelFormat::BGRA8),
    (b"BA81", PixelFormat::BAYER_BG8),
    (b"GBRG", PixelFormat::BAYER_GB8),
    (b"GRBG", PixelFormat::BAYER_GR8),
    (b"RGGB", PixelFormat::BAYER_RG8),
    (b"BG10", PixelFormat::BAYER_BG10),
    (b"GB10", PixelFormat::BAYER_GB10),
    (b"BA10", PixelFormat::BAYER_GR10),
    (b"RG10", PixelFormat::BAYER_RG10),
    (b"BG12", PixelFormat::BAYER_BG12),
    (b"GB12", PixelFormat::BAYER_GB12),
    (b"BA12", PixelFormat::BAYER_GR12),
    (b"RG12", PixelFormat::BAYER_RG12),
];

/// Pixel format of a V4L2 FourCC, if it has a standard equivalent.
pub fn pixel_format_of(fourcc: FourCC) -> Option<PixelFormat> {
    FORMATS
        .iter()
        .find(|(code, _)| fourcc.repr == **code)
        .map(|(_, format)| *format)
}

/// V4L2 FourCC carrying `format`.
pub fn fourcc_of(format: PixelFormat) -> Option<FourCC> {
    FORMATS
        .iter()
        .find(|(_, known)| *known == format)
        .map(|(code, _)| FourCC::new(code))
}

/// Feature name of a V4L2 control label.
pub fn control_feature_name(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect()
}

fn driver(code: ErrorCode) -> CameraError {
    CameraError::Driver(code)
}

struct Pending {
    frame: SharedFrame,
    callback: FrameCallback,
}

#[derive(Default)]
struct CaptureShared {
    stop: AtomicBool,
    acquiring: AtomicBool,
    pending: Mutex<VecDeque<Pending>>,
}

struct CaptureThread {
    shared: Arc<CaptureShared>,
    thread: JoinHandle<()>,
}

struct OpenCamera {
    path: PathBuf,
    device: Device,
    info: CameraInfo,
    local: Handle,
    announced: Vec<SharedFrame>,
    capture: Option<CaptureThread>,
}

impl OpenCamera {
    fn format(&self) -> Result<Format> {
        Ok(self.device.format()?)
    }

    fn update_format<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Format),
    {
        if self.capture.is_some() {
            return Err(driver(ErrorCode::INVALID_ACCESS));
        }
        let mut format = self.format()?;
        change(&mut format);
        self.device.set_format(&format)?;
        Ok(())
    }

    fn control(&self, name: &str) -> Result<Description> {
        let wanted = control_feature_name(name);
        self.device
            .query_controls()?
            .into_iter()
            .find(|desc| {
                !matches!(desc.typ, ControlType::CtrlClass)
                    && control_feature_name(&desc.name) == wanted
            })
            .ok_or_else(|| driver(ErrorCode::NOT_FOUND))
    }

    fn control_value(&self, name: &str) -> Result<(Description, Value)> {
        let desc = self.control(name)?;
        let control = self.device.control(desc.id)?;
        Ok((desc, control.value))
    }

    fn set_control(&self, desc: &Description, value: Value) -> Result<()> {
        self.device.set_control(Control { id: desc.id, value })?;
        Ok(())
    }

    fn acquiring(&self, on: bool) -> Result<()> {
        match &self.capture {
            Some(capture) => {
                capture.shared.acquiring.store(on, Ordering::Release);
                Ok(())
            }
            None if on => Err(driver(ErrorCode::INVALID_CALL)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct State {
    next_handle: u64,
    cameras: HashMap<Handle, OpenCamera>,
}

impl State {
    fn camera(&mut self, handle: Handle) -> Result<&mut OpenCamera> {
        self.cameras
            .get_mut(&handle)
            .ok_or_else(|| driver(ErrorCode::BAD_HANDLE))
    }

    fn local(&self, handle: Handle) -> Option<&OpenCamera> {
        self.cameras.values().find(|camera| camera.local == handle)
    }

    fn is_open(&self, path: &Path) -> bool {
        self.cameras.values().any(|camera| camera.path == path)
    }
}

/// [`Transport`] over Linux V4L2 capture devices.
pub struct V4l2Transport {
    state: Mutex<State>,
    span: Span,
}

impl Default for V4l2Transport {
    fn default() -> Self {
        Self::new(Span::current())
    }
}

impl V4l2Transport {
    /// Transport logging under `span`.
    pub fn new(span: Span) -> Self {
        Self {
            state: Mutex::new(State::default()),
            span,
        }
    }

    fn describe(path: &Path, camera_id: String, node_name: Option<String>) -> Option<CameraInfo> {
        let device = Device::with_path(path).ok()?;
        let caps = device.query_caps().ok()?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return None;
        }
        Some(CameraInfo {
            camera_id,
            camera_id_extended: path.display().to_string(),
            camera_name: node_name.unwrap_or_else(|| caps.card.clone()),
            model_name: caps.card,
            serial: caps.bus,
            permitted_access: AccessMode::FULL | AccessMode::EXCLUSIVE,
            local_device_handle: Handle::default(),
        })
    }

    fn enumerate() -> Vec<CameraInfo> {
        context::enum_devices()
            .iter()
            .filter_map(|node| {
                Self::describe(node.path(), format!("video{}", node.index()), node.name())
            })
            .collect()
    }

    fn with_camera<R, F>(&self, handle: Handle, f: F) -> Result<R>
    where
        F: FnOnce(&mut OpenCamera) -> Result<R>,
    {
        let mut state = lock(&self.state);
        f(state.camera(handle)?)
    }

    fn local_int(&self, handle: Handle, name: &str) -> Result<i64> {
        let state = lock(&self.state);
        if state.local(handle).is_none() {
            return Err(driver(ErrorCode::BAD_HANDLE));
        }
        if name == sfnc::DEVICE_TIMESTAMP_FREQUENCY {
            Ok(TIMESTAMP_FREQUENCY)
        } else {
            Err(driver(ErrorCode::NOT_FOUND))
        }
    }

    fn is_local(&self, handle: Handle) -> bool {
        lock(&self.state).local(handle).is_some()
    }
}

impl Transport for V4l2Transport {
    fn cameras_list(&self) -> Result<Vec<CameraInfo>> {
        let mut cameras = Self::enumerate();
        let state = lock(&self.state);
        for info in &mut cameras {
            if state.is_open(Path::new(&info.camera_id_extended)) {
                info.permitted_access = AccessMode::READ;
            }
        }
        Ok(cameras)
    }

    fn camera_open(&self, id: &str, _mode: AccessMode) -> Result<Handle> {
        let info = Self::enumerate()
            .into_iter()
            .find(|info| info.camera_id == id || info.camera_id_extended == id || info.serial == id)
            .or_else(|| {
                let path = Path::new(id);
                path.exists()
                    .then(|| Self::describe(path, id.to_owned(), None))
                    .flatten()
            })
            .ok_or_else(|| driver(ErrorCode::NOT_FOUND))?;

        let path = PathBuf::from(&info.camera_id_extended);
        let mut state = lock(&self.state);
        if state.is_open(&path) {
            return Err(driver(ErrorCode::INVALID_ACCESS));
        }
        let device = Device::with_path(&path)?;

        let handle = Handle(state.next_handle + 1);
        let local = Handle(state.next_handle + 2);
        state.next_handle += 2;

        info!(parent: &self.span, path = %path.display(), ?handle, "v4l2 device opened");
        state.cameras.insert(
            handle,
            OpenCamera {
                path,
                device,
                info: CameraInfo {
                    local_device_handle: local,
                    ..info
                },
                local,
                announced: Vec::new(),
                capture: None,
            },
        );
        Ok(handle)
    }

    fn camera_close(&self, handle: Handle) -> Result<()> {
        let camera = lock(&self.state)
            .cameras
            .remove(&handle)
            .ok_or_else(|| driver(ErrorCode::BAD_HANDLE))?;
        if let Some(capture) = camera.capture {
            stop_capture(capture, &self.span);
        }
        Ok(())
    }

    fn camera_info_query(&self, handle: Handle) -> Result<CameraInfo> {
        self.with_camera(handle, |camera| Ok(camera.info.clone()))
    }

    fn feature_int_get(&self, handle: Handle, name: &str) -> Result<i64> {
        if self.is_local(handle) {
            return self.local_int(handle, name);
        }
        self.with_camera(handle, |camera| match name {
            sfnc::WIDTH => Ok(i64::from(camera.format()?.width)),
            sfnc::HEIGHT => Ok(i64::from(camera.format()?.height)),
            _ => match camera.control_value(name)?.1 {
                Value::Integer(value) => Ok(value),
                _ => Err(driver(ErrorCode::WRONG_TYPE)),
            },
        })
    }

    fn feature_int_set(&self, handle: Handle, name: &str, value: i64) -> Result<()> {
        if self.is_local(handle) {
            return Err(driver(ErrorCode::INVALID_ACCESS));
        }
        let dimension = || {
            u32::try_from(value).map_err(|_| driver(ErrorCode::INVALID_VALUE))
        };
        self.with_camera(handle, |camera| match name {
            sfnc::WIDTH => {
                let width = dimension()?;
                camera.update_format(|format| format.width = width)
            }
            sfnc::HEIGHT => {
                let height = dimension()?;
                camera.update_format(|format| format.height = height)
            }
            _ => {
                let desc = camera.control(name)?;
                match desc.typ {
                    ControlType::Integer | ControlType::Integer64 | ControlType::Menu => {
                        camera.set_control(&desc, Value::Integer(value))
                    }
                    _ => Err(driver(ErrorCode::WRONG_TYPE)),
                }
            }
        })
    }

    fn feature_float_get(&self, handle: Handle, name: &str) -> Result<f64> {
        // V4L2 has no float controls
        self.with_camera(handle, |camera| {
            camera.control(name)?;
            Err(driver(ErrorCode::WRONG_TYPE))
        })
    }

    fn feature_float_set(&self, handle: Handle, name: &str, _value: f64) -> Result<()> {
        self.with_camera(handle, |camera| {
            camera.control(name)?;
            Err(driver(ErrorCode::WRONG_TYPE))
        })
    }

    fn feature_bool_get(&self, handle: Handle, name: &str) -> Result<bool> {
        self.with_camera(handle, |camera| match camera.control_value(name)?.1 {
            Value::Boolean(value) => Ok(value),
            _ => Err(driver(ErrorCode::WRONG_TYPE)),
        })
    }

    fn feature_bool_set(&self, handle: Handle, name: &str, value: bool) -> Result<()> {
        self.with_camera(handle, |camera| {
            let desc = camera.control(name)?;
            if !matches!(desc.typ, ControlType::Boolean) {
                return Err(driver(ErrorCode::WRONG_TYPE));
            }
            camera.set_control(&desc, Value::Boolean(value))
        })
    }

    fn feature_enum_get(&self, handle: Handle, name: &str) -> Result<String> {
        self.with_camera(handle, |camera| {
            if name != sfnc::PIXEL_FORMAT {
                camera.control(name)?;
                return Err(driver(ErrorCode::WRONG_TYPE));
            }
            let fourcc = camera.format()?.fourcc;
            Ok(pixel_format_of(fourcc)
                .and_then(PixelFormat::name)
                .map_or_else(|| fourcc.to_string(), str::to_owned))
        })
    }

    fn feature_enum_set(&self, handle: Handle, name: &str, option: &str) -> Result<()> {
        self.with_camera(handle, |camera| {
            if name != sfnc::PIXEL_FORMAT {
                camera.control(name)?;
                return Err(driver(ErrorCode::WRONG_TYPE));
            }
            let fourcc = PixelFormat::from_name(option)
                .and_then(fourcc_of)
                .ok_or_else(|| driver(ErrorCode::INVALID_VALUE))?;
            camera.update_format(|format| format.fourcc = fourcc)
        })
    }

    fn feature_enum_as_int(&self, handle: Handle, name: &str, option: &str) -> Result<i64> {
        self.with_camera(handle, |_camera| {
            if name != sfnc::PIXEL_FORMAT {
                return Err(driver(ErrorCode::NOT_FOUND));
            }
            PixelFormat::from_name(option)
                .map(|format| i64::from(format.0))
                .ok_or_else(|| driver(ErrorCode::INVALID_VALUE))
        })
    }

    fn feature_string_get(&self, handle: Handle, name: &str) -> Result<String> {
        self.with_camera(handle, |camera| match name {
            DEVICE_MODEL_NAME => Ok(camera.info.model_name.clone()),
            DEVICE_SERIAL_NUMBER => Ok(camera.info.serial.clone()),
            _ => Err(driver(ErrorCode::NOT_FOUND)),
        })
    }

    fn feature_string_set(&self, handle: Handle, name: &str, _value: &str) -> Result<()> {
        self.with_camera(handle, |_camera| match name {
            DEVICE_MODEL_NAME | DEVICE_SERIAL_NUMBER => Err(driver(ErrorCode::INVALID_ACCESS)),
            _ => Err(driver(ErrorCode::NOT_FOUND)),
        })
    }

    fn feature_command_run(&self, handle: Handle, name: &str) -> Result<()> {
        self.with_camera(handle, |camera| match name {
            sfnc::ACQUISITION_START => camera.acquiring(true),
            sfnc::ACQUISITION_STOP => camera.acquiring(false),
            _ => {
                let desc = camera.control(name)?;
                if !matches!(desc.typ, ControlType::Button) {
                    return Err(driver(ErrorCode::WRONG_TYPE));
                }
                camera.set_control(&desc, Value::Integer(0))
            }
        })
    }

    fn feature_command_is_done(&self, handle: Handle, name: &str) -> Result<bool> {
        self.with_camera(handle, |camera| match name {
            sfnc::ACQUISITION_START | sfnc::ACQUISITION_STOP => Ok(true),
            _ => camera.control(name).map(|_| true),
        })
    }

    fn feature_info_query(&self, handle: Handle, name: &str) -> Result<FeatureInfo> {
        let standard = |data_type| {
            Ok(FeatureInfo {
                name: name.to_owned(),
                data_type,
                sfnc_namespace: Some(sfnc::STANDARD_NAMESPACE.to_owned()),
                display_name: name.to_owned(),
            })
        };

        if self.is_local(handle) {
            return match name {
                sfnc::DEVICE_TIMESTAMP_FREQUENCY => standard(FeatureType::Int),
                _ => Err(driver(ErrorCode::NOT_FOUND)),
            };
        }

        self.with_camera(handle, |camera| match name {
            sfnc::WIDTH | sfnc::HEIGHT => standard(FeatureType::Int),
            sfnc::PIXEL_FORMAT => standard(FeatureType::Enum),
            sfnc::ACQUISITION_START | sfnc::ACQUISITION_STOP => standard(FeatureType::Command),
            DEVICE_MODEL_NAME | DEVICE_SERIAL_NUMBER => standard(FeatureType::String),
            _ => {
                let desc = camera.control(name)?;
                let data_type = match desc.typ {
                    ControlType::Integer | ControlType::Integer64 | ControlType::Menu => {
                        FeatureType::Int
                    }
                    ControlType::Boolean => FeatureType::Bool,
                    ControlType::Button => FeatureType::Command,
                    ControlType::String => FeatureType::String,
                    _ => FeatureType::Unknown,
                };
                Ok(FeatureInfo {
                    name: control_feature_name(&desc.name),
                    data_type,
                    sfnc_namespace: Some(CUSTOM_NAMESPACE.to_owned()),
                    display_name: desc.name,
                })
            }
        })
    }

    fn payload_size_get(&self, handle: Handle) -> Result<usize> {
        self.with_camera(handle, |camera| {
            usize::try_from(camera.format()?.size).map_err(|_| driver(ErrorCode::INTERNAL_FAULT))
        })
    }

    fn frame_announce(&self, handle: Handle, frame: &SharedFrame) -> Result<()> {
        self.with_camera(handle, |camera| {
            camera.announced.push(Arc::clone(frame));
            Ok(())
        })
    }

    fn frame_revoke_all(&self, handle: Handle) -> Result<()> {
        self.with_camera(handle, |camera| {
            if camera.capture.is_some() {
                return Err(driver(ErrorCode::INVALID_CALL));
            }
            camera.announced.clear();
            Ok(())
        })
    }

    fn capture_start(&self, handle: Handle) -> Result<()> {
        self.with_camera(handle, |camera| {
            if camera.capture.is_some() {
                return Err(driver(ErrorCode::INVALID_CALL));
            }
            let buffers = u32::try_from(camera.announced.len().max(1)).unwrap_or(u32::MAX);
            let capture = spawn_capture(camera.path.clone(), buffers, self.span.clone())?;
            camera.capture = Some(capture);
            Ok(())
        })
    }

    fn capture_end(&self, handle: Handle) -> Result<()> {
        // The capture thread re-enters the transport from frame callbacks, so
        // it is joined without holding the state lock.
        let capture = self.with_camera(handle, |camera| Ok(camera.capture.take()))?;
        if let Some(capture) = capture {
            stop_capture(capture, &self.span);
        }
        Ok(())
    }

    fn capture_queue_flush(&self, handle: Handle) -> Result<()> {
        let flushed: Vec<Pending> = self.with_camera(handle, |camera| {
            Ok(camera
                .capture
                .as_ref()
                .map(|capture| lock(&capture.shared.pending).drain(..).collect())
                .unwrap_or_default())
        })?;
        debug!(parent: &self.span, frames = flushed.len(), "capture queue flushed");
        Ok(())
    }

    fn capture_frame_queue(
        &self,
        handle: Handle,
        frame: &SharedFrame,
        callback: FrameCallback,
    ) -> Result<()> {
        self.with_camera(handle, |camera| {
            if !camera.announced.iter().any(|known| Arc::ptr_eq(known, frame)) {
                return Err(driver(ErrorCode::BAD_PARAMETER));
            }
            let capture = camera
                .capture
                .as_ref()
                .ok_or_else(|| driver(ErrorCode::INVALID_CALL))?;
            lock(&capture.shared.pending).push_back(Pending {
                frame: Arc::clone(frame),
                callback,
            });
            Ok(())
        })
    }

    fn settings_save(&self, handle: Handle, _path: &Path, _settings: &PersistSettings) -> Result<()> {
        self.with_camera(handle, |_camera| Err(driver(ErrorCode::NOT_SUPPORTED)))
    }

    fn settings_load(&self, handle: Handle, _path: &Path, _settings: &PersistSettings) -> Result<()> {
        self.with_camera(handle, |_camera| Err(driver(ErrorCode::NOT_SUPPORTED)))
    }
}

impl Drop for V4l2Transport {
    fn drop(&mut self) {
        let cameras: Vec<OpenCamera> = lock(&self.state).cameras.drain().map(|(_, c)| c).collect();
        for capture in cameras.into_iter().filter_map(|camera| camera.capture) {
            stop_capture(capture, &self.span);
        }
    }
}

fn spawn_capture(path: PathBuf, buffers: u32, span: Span) -> Result<CaptureThread> {
    let shared = Arc::new(CaptureShared::default());
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);

    let thread_shared = Arc::clone(&shared);
    let thread = thread::Builder::new()
        .name("v4l2-capture".to_owned())
        .spawn(move || capture_loop(&path, buffers, &thread_shared, &ready_tx, &span))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(CaptureThread { shared, thread }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err.into())
        }
        Err(_) => {
            let _ = thread.join();
            Err(driver(ErrorCode::INTERNAL_FAULT))
        }
    }
}

fn stop_capture(capture: CaptureThread, span: &Span) {
    capture.shared.stop.store(true, Ordering::Release);
    if capture.thread.join().is_err() {
        error!(parent: span, "capture thread panicked");
    }
    // Pending callbacks are dropped with the shared state
    drop(capture.shared);
}

fn capture_loop(
    path: &Path,
    buffers: u32,
    shared: &CaptureShared,
    ready: &mpsc::SyncSender<io::Result<()>>,
    span: &Span,
) {
    let setup = Device::with_path(path).and_then(|device| {
        let format = device.format()?;
        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, buffers)?;
        stream.set_timeout(DEQUEUE_TIMEOUT);
        Ok((device, format, stream))
    });

    let (_device, format, mut stream) = match setup {
        Ok(parts) => {
            let _ = ready.send(Ok(()));
            parts
        }
        Err(err) => {
            error!(parent: span, path = %path.display(), %err, "capture setup failed");
            let _ = ready.send(Err(err));
            return;
        }
    };
    info!(parent: span, path = %path.display(), buffers, "capture thread running");

    while !shared.stop.load(Ordering::Acquire) {
        if !shared.acquiring.load(Ordering::Acquire) {
            thread::sleep(IDLE_POLL);
            continue;
        }

        let (data, meta) = match CaptureStream::next(&mut stream) {
            Ok(next) => next,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => continue,
            Err(err) => {
                error!(parent: span, %err, "dequeue failed, capture thread exiting");
                break;
            }
        };

        let next = lock(&shared.pending).pop_front();
        let Some(pending) = next else {
            debug!(parent: span, sequence = meta.sequence, "no frame queued, image dropped");
            continue;
        };

        let status = {
            let mut frame = lock(&pending.frame);
            fill_frame(&mut frame, data, meta, &format);
            frame.receive_status
        };
        if status != FrameStatus::Complete {
            warn!(parent: span, ?status, sequence = meta.sequence, "short v4l2 buffer");
        }
        (pending.callback)();
    }

    info!(parent: span, "capture thread stopped");
}

fn fill_frame(frame: &mut DriverFrame, data: &[u8], meta: &Metadata, format: &Format) {
    let used = usize::try_from(meta.bytesused).unwrap_or(data.len()).min(data.len());
    let image = data.get(..used).unwrap_or(data);
    let expected = usize::try_from(format.size).unwrap_or(usize::MAX);

    let fits = match frame.buffer.as_mut() {
        Some(buffer) => {
            let len = buffer.len().min(image.len());
            if let (Some(dst), Some(src)) = (buffer.get_mut(..len), image.get(..len)) {
                dst.copy_from_slice(src);
            }
            buffer.len() >= image.len()
        }
        None => {
            frame.image_data = image.to_vec();
            true
        }
    };

    frame.receive_status = if !fits {
        FrameStatus::TooSmall
    } else if used < expected {
        FrameStatus::Incomplete
    } else {
        FrameStatus::Complete
    };
    frame.width = format.width;
    frame.height = format.height;
    frame.pixel_format = pixel_format_of(format.fourcc).map_or(0, |format| format.0);
    frame.frame_id = u64::from(meta.sequence);

    let sec = u64::try_from(meta.timestamp.sec).unwrap_or_default();
    let usec = u64::try_from(meta.timestamp.usec).unwrap_or_default();
    frame.timestamp = sec.saturating_mul(1_000_000).saturating_add(usec);
}
