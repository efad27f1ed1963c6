//! Scripted transport for testing without hardware.
//!
//! Every driver call is recorded so tests can assert on call ordering.
//! Deliveries are driven explicitly through [`MockTransport::deliver`], which
//! runs the completion callback on the calling thread. A transport built with
//! [`MockTransport::with_delivery_on_capture_end`] instead delivers one frame
//! from a separate thread inside `capture_end` and joins it, as a capture
//! thread being shut down does.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::feature::sfnc;
use crate::pixel::PixelFormat;
use crate::traits::{
    lock, AccessMode, CameraError, CameraInfo, ErrorCode, FeatureInfo, FeatureType, FrameCallback,
    FrameStatus, Handle, PersistSettings, Result, SharedFrame, Transport,
};

/// Handle returned for the mock camera.
pub const CAMERA: Handle = Handle(1);
/// Local device sub-handle of the mock camera.
pub const LOCAL_DEVICE: Handle = Handle(2);

/// A recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CamerasList,
    CameraOpen(String),
    CameraClose,
    CameraInfoQuery,
    FeatureGet(String),
    FeatureSet(String),
    EnumAsInt(String, String),
    CommandRun(String),
    CommandIsDone(String),
    FeatureInfoQuery(String),
    PayloadSizeGet,
    FrameAnnounce,
    FrameRevokeAll,
    CaptureStart,
    CaptureEnd,
    CaptureQueueFlush,
    FrameQueue,
    SettingsSave(PathBuf, PersistSettings),
    SettingsLoad(PathBuf, PersistSettings),
}

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Enum(String),
    Str(String),
}

struct Pending {
    frame: SharedFrame,
    callback: FrameCallback,
}

struct State {
    calls: Vec<Call>,
    cameras: Vec<CameraInfo>,
    features: HashMap<(Handle, String), Value>,
    namespaces: HashMap<String, Option<String>>,
    failures: HashMap<&'static str, ErrorCode>,
    command_polls: u32,
    pending_polls: HashMap<String, u32>,
    announced: Vec<SharedFrame>,
    queue: VecDeque<Pending>,
    next_frame_id: u64,
}

/// One-shot action run by the mock outside its own lock.
pub type Hook = Box<dyn FnOnce() + Send>;

/// Mock transport exposing a single camera.
pub struct MockTransport {
    state: Mutex<State>,
    queue_hook: Mutex<Option<Hook>>,
    deliver_on_capture_end: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Mono8 640x480 camera whose payload matches the image exactly and whose
    /// clock ticks in nanoseconds.
    #[must_use]
    pub fn new() -> Self {
        let info = CameraInfo {
            camera_id: "DEV_1AB22C00041B".to_owned(),
            camera_id_extended: "VimbaUSBTL:DEV_1AB22C00041B".to_owned(),
            camera_name: "Mock Camera".to_owned(),
            model_name: "Mock 1800 U-240m".to_owned(),
            serial: "04YZ2".to_owned(),
            permitted_access: AccessMode::FULL | AccessMode::EXCLUSIVE,
            local_device_handle: LOCAL_DEVICE,
        };

        let mut features = HashMap::new();
        features.insert((CAMERA, sfnc::WIDTH.to_owned()), Value::Int(640));
        features.insert((CAMERA, sfnc::HEIGHT.to_owned()), Value::Int(480));
        features.insert(
            (CAMERA, sfnc::PIXEL_FORMAT.to_owned()),
            Value::Enum("Mono8".to_owned()),
        );
        features.insert(
            (LOCAL_DEVICE, sfnc::DEVICE_TIMESTAMP_FREQUENCY.to_owned()),
            Value::Int(1_000_000_000),
        );

        Self {
            state: Mutex::new(State {
                calls: Vec::new(),
                cameras: vec![info],
                features,
                namespaces: HashMap::new(),
                failures: HashMap::new(),
                command_polls: 0,
                pending_polls: HashMap::new(),
                announced: Vec::new(),
                queue: VecDeque::new(),
                next_frame_id: 0,
            }),
            queue_hook: Mutex::new(None),
            deliver_on_capture_end: AtomicBool::new(false),
        }
    }

    fn set_feature(self, handle: Handle, name: &str, value: Value) -> Self {
        lock(&self.state)
            .features
            .insert((handle, name.to_owned()), value);
        self
    }

    /// Set the image geometry.
    #[must_use]
    pub fn with_geometry(self, width: i64, height: i64) -> Self {
        self.set_feature(CAMERA, sfnc::WIDTH, Value::Int(width))
            .set_feature(CAMERA, sfnc::HEIGHT, Value::Int(height))
    }

    /// Set the current pixel format.
    #[must_use]
    pub fn with_pixel_format(self, format: PixelFormat) -> Self {
        let name = format.name().unwrap_or("Unknown").to_owned();
        self.set_feature(CAMERA, sfnc::PIXEL_FORMAT, Value::Enum(name))
    }

    /// Deliver the oldest queued frame from another thread during
    /// `capture_end`, joining that thread before returning.
    #[must_use]
    pub fn with_delivery_on_capture_end(self) -> Self {
        self.deliver_on_capture_end.store(true, Ordering::Release);
        self
    }

    /// Run `hook` during the next `capture_frame_queue`, after the frame is
    /// queued and with no mock lock held.
    pub fn on_next_queue(&self, hook: Hook) {
        *lock(&self.queue_hook) = Some(hook);
    }

    /// Override the namespace reported for `name`.
    #[must_use]
    pub fn with_namespace(self, name: &str, namespace: Option<&str>) -> Self {
        lock(&self.state)
            .namespaces
            .insert(name.to_owned(), namespace.map(str::to_owned));
        self
    }

    /// Set the local device clock frequency; `None` removes the feature.
    #[must_use]
    pub fn with_timestamp_frequency(self, frequency: Option<i64>) -> Self {
        let key = (LOCAL_DEVICE, sfnc::DEVICE_TIMESTAMP_FREQUENCY.to_owned());
        match frequency {
            Some(hz) => {
                lock(&self.state).features.insert(key, Value::Int(hz));
            }
            None => {
                lock(&self.state).features.remove(&key);
            }
        }
        self
    }

    /// Number of `false` answers a command reports before completing.
    #[must_use]
    pub fn with_command_polls(self, polls: u32) -> Self {
        lock(&self.state).command_polls = polls;
        self
    }

    /// Replace the enumerated cameras.
    #[must_use]
    pub fn with_cameras(self, cameras: Vec<CameraInfo>) -> Self {
        lock(&self.state).cameras = cameras;
        self
    }

    /// Make the named transport method fail with `code`.
    #[must_use]
    pub fn fail(self, method: &'static str, code: ErrorCode) -> Self {
        self.set_failure(method, code);
        self
    }

    /// Make the named transport method fail from now on.
    pub fn set_failure(&self, method: &'static str, code: ErrorCode) {
        lock(&self.state).failures.insert(method, code);
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &Call) -> usize {
        lock(&self.state).calls.iter().filter(|c| *c == call).count()
    }

    /// Frames currently waiting for delivery.
    pub fn queued(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Frames currently announced.
    pub fn announced(&self) -> usize {
        lock(&self.state).announced.len()
    }

    /// Fill the oldest queued frame and run its callback.
    ///
    /// Returns `false` when nothing was queued.
    pub fn deliver(&self, status: FrameStatus, image: &[u8], ticks: u64) -> bool {
        match self.fill_next(status, image, ticks) {
            Some(pending) => {
                (pending.callback)();
                true
            }
            None => false,
        }
    }

    fn fill_next(&self, status: FrameStatus, image: &[u8], ticks: u64) -> Option<Pending> {
        let (pending, width, height, pixel_format, frame_id) = {
            let mut state = lock(&self.state);
            let pending = state.queue.pop_front()?;
            let frame_id = state.next_frame_id;
            state.next_frame_id += 1;
            let width = state.int(CAMERA, sfnc::WIDTH);
            let height = state.int(CAMERA, sfnc::HEIGHT);
            let pixel_format = state.pixel_format();
            (pending, width, height, pixel_format, frame_id)
        };

        {
            let mut guard = lock(&pending.frame);
            let frame = &mut *guard;
            match frame.buffer.as_mut() {
                Some(buffer) => {
                    let len = buffer.len().min(image.len());
                    if let (Some(dst), Some(src)) = (buffer.get_mut(..len), image.get(..len)) {
                        dst.copy_from_slice(src);
                    }
                }
                None => frame.image_data = image.to_vec(),
            }
            frame.receive_status = status;
            frame.width = u32::try_from(width).unwrap_or_default();
            frame.height = u32::try_from(height).unwrap_or_default();
            frame.pixel_format = pixel_format.0;
            frame.frame_id = frame_id;
            frame.timestamp = ticks;
        }

        Some(pending)
    }

    fn record(&self, call: Call, method: &'static str) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        match state.failures.get(method) {
            Some(code) => Err(CameraError::Driver(*code)),
            None => Ok(()),
        }
    }

    fn get(&self, handle: Handle, name: &str, method: &'static str) -> Result<Value> {
        self.record(Call::FeatureGet(name.to_owned()), method)?;
        lock(&self.state)
            .features
            .get(&(handle, name.to_owned()))
            .cloned()
            .ok_or(CameraError::Driver(ErrorCode::NOT_FOUND))
    }

    fn put(&self, handle: Handle, name: &str, value: Value, method: &'static str) -> Result<()> {
        self.record(Call::FeatureSet(name.to_owned()), method)?;
        lock(&self.state)
            .features
            .insert((handle, name.to_owned()), value);
        Ok(())
    }
}

impl State {
    fn int(&self, handle: Handle, name: &str) -> i64 {
        match self.features.get(&(handle, name.to_owned())) {
            Some(Value::Int(value)) => *value,
            _ => 0,
        }
    }

    fn pixel_format(&self) -> PixelFormat {
        match self.features.get(&(CAMERA, sfnc::PIXEL_FORMAT.to_owned())) {
            Some(Value::Enum(name)) => PixelFormat::from_name(name).unwrap_or(PixelFormat(0)),
            _ => PixelFormat(0),
        }
    }

    fn image_size(&self) -> usize {
        let bpp = i64::from(self.pixel_format().bits_per_pixel());
        let size = self.int(CAMERA, sfnc::HEIGHT) * (self.int(CAMERA, sfnc::WIDTH) * bpp / 8);
        usize::try_from(size).unwrap_or_default()
    }
}

fn wrong_type() -> CameraError {
    CameraError::Driver(ErrorCode::WRONG_TYPE)
}

impl Transport for MockTransport {
    fn cameras_list(&self) -> Result<Vec<CameraInfo>> {
        self.record(Call::CamerasList, "cameras_list")?;
        Ok(lock(&self.state).cameras.clone())
    }

    fn camera_open(&self, id: &str, _mode: AccessMode) -> Result<Handle> {
        self.record(Call::CameraOpen(id.to_owned()), "camera_open")?;
        let known = lock(&self.state).cameras.iter().any(|info| {
            info.camera_id == id || info.camera_id_extended == id || info.serial == id
        });
        if known {
            Ok(CAMERA)
        } else {
            Err(CameraError::Driver(ErrorCode::NOT_FOUND))
        }
    }

    fn camera_close(&self, _handle: Handle) -> Result<()> {
        self.record(Call::CameraClose, "camera_close")
    }

    fn camera_info_query(&self, _handle: Handle) -> Result<CameraInfo> {
        self.record(Call::CameraInfoQuery, "camera_info_query")?;
        lock(&self.state)
            .cameras
            .first()
            .cloned()
            .ok_or(CameraError::Driver(ErrorCode::NOT_FOUND))
    }

    fn feature_int_get(&self, handle: Handle, name: &str) -> Result<i64> {
        match self.get(handle, name, "feature_int_get")? {
            Value::Int(value) => Ok(value),
            _ => Err(wrong_type()),
        }
    }

    fn feature_int_set(&self, handle: Handle, name: &str, value: i64) -> Result<()> {
        self.put(handle, name, Value::Int(value), "feature_int_set")
    }

    fn feature_float_get(&self, handle: Handle, name: &str) -> Result<f64> {
        match self.get(handle, name, "feature_float_get")? {
            Value::Float(value) => Ok(value),
            _ => Err(wrong_type()),
        }
    }

    fn feature_float_set(&self, handle: Handle, name: &str, value: f64) -> Result<()> {
        self.put(handle, name, Value::Float(value), "feature_float_set")
    }

    fn feature_bool_get(&self, handle: Handle, name: &str) -> Result<bool> {
        match self.get(handle, name, "feature_bool_get")? {
            Value::Bool(value) => Ok(value),
            _ => Err(wrong_type()),
        }
    }

    fn feature_bool_set(&self, handle: Handle, name: &str, value: bool) -> Result<()> {
        self.put(handle, name, Value::Bool(value), "feature_bool_set")
    }

    fn feature_enum_get(&self, handle: Handle, name: &str) -> Result<String> {
        match self.get(handle, name, "feature_enum_get")? {
            Value::Enum(option) => Ok(option),
            _ => Err(wrong_type()),
        }
    }

    fn feature_enum_set(&self, handle: Handle, name: &str, option: &str) -> Result<()> {
        self.put(handle, name, Value::Enum(option.to_owned()), "feature_enum_set")
    }

    fn feature_enum_as_int(&self, _handle: Handle, name: &str, option: &str) -> Result<i64> {
        self.record(
            Call::EnumAsInt(name.to_owned(), option.to_owned()),
            "feature_enum_as_int",
        )?;
        if name != sfnc::PIXEL_FORMAT {
            return Err(CameraError::Driver(ErrorCode::NOT_FOUND));
        }
        PixelFormat::from_name(option)
            .map(|format| i64::from(format.0))
            .ok_or(CameraError::Driver(ErrorCode::INVALID_VALUE))
    }

    fn feature_string_get(&self, handle: Handle, name: &str) -> Result<String> {
        match self.get(handle, name, "feature_string_get")? {
            Value::Str(value) => Ok(value),
            _ => Err(wrong_type()),
        }
    }

    fn feature_string_set(&self, handle: Handle, name: &str, value: &str) -> Result<()> {
        self.put(handle, name, Value::Str(value.to_owned()), "feature_string_set")
    }

    fn feature_command_run(&self, _handle: Handle, name: &str) -> Result<()> {
        self.record(Call::CommandRun(name.to_owned()), "feature_command_run")?;
        let mut state = lock(&self.state);
        let polls = state.command_polls;
        state.pending_polls.insert(name.to_owned(), polls);
        Ok(())
    }

    fn feature_command_is_done(&self, _handle: Handle, name: &str) -> Result<bool> {
        self.record(Call::CommandIsDone(name.to_owned()), "feature_command_is_done")?;
        let mut state = lock(&self.state);
        match state.pending_polls.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(false)
            }
            _ => Ok(true),
        }
    }

    fn feature_info_query(&self, handle: Handle, name: &str) -> Result<FeatureInfo> {
        self.record(Call::FeatureInfoQuery(name.to_owned()), "feature_info_query")?;
        let state = lock(&self.state);
        let data_type = match state.features.get(&(handle, name.to_owned())) {
            Some(Value::Int(_)) => FeatureType::Int,
            Some(Value::Float(_)) => FeatureType::Float,
            Some(Value::Bool(_)) => FeatureType::Bool,
            Some(Value::Enum(_)) => FeatureType::Enum,
            Some(Value::Str(_)) => FeatureType::String,
            None => return Err(CameraError::Driver(ErrorCode::NOT_FOUND)),
        };
        let sfnc_namespace = state
            .namespaces
            .get(name)
            .cloned()
            .unwrap_or_else(|| Some(sfnc::STANDARD_NAMESPACE.to_owned()));

        Ok(FeatureInfo {
            name: name.to_owned(),
            data_type,
            sfnc_namespace,
            display_name: name.to_owned(),
        })
    }

    fn payload_size_get(&self, _handle: Handle) -> Result<usize> {
        self.record(Call::PayloadSizeGet, "payload_size_get")?;
        Ok(lock(&self.state).image_size())
    }

    fn frame_announce(&self, _handle: Handle, frame: &SharedFrame) -> Result<()> {
        self.record(Call::FrameAnnounce, "frame_announce")?;
        lock(&self.state).announced.push(Arc::clone(frame));
        Ok(())
    }

    fn frame_revoke_all(&self, _handle: Handle) -> Result<()> {
        self.record(Call::FrameRevokeAll, "frame_revoke_all")?;
        lock(&self.state).announced.clear();
        Ok(())
    }

    fn capture_start(&self, _handle: Handle) -> Result<()> {
        self.record(Call::CaptureStart, "capture_start")
    }

    fn capture_end(&self, _handle: Handle) -> Result<()> {
        self.record(Call::CaptureEnd, "capture_end")?;
        if self.deliver_on_capture_end.load(Ordering::Acquire) {
            if let Some(pending) = self.fill_next(FrameStatus::Complete, &[], 0) {
                thread::scope(|scope| {
                    scope.spawn(move || (pending.callback)());
                });
            }
        }
        Ok(())
    }

    fn capture_queue_flush(&self, _handle: Handle) -> Result<()> {
        self.record(Call::CaptureQueueFlush, "capture_queue_flush")?;
        let flushed: Vec<Pending> = lock(&self.state).queue.drain(..).collect();
        drop(flushed);
        Ok(())
    }

    fn capture_frame_queue(
        &self,
        _handle: Handle,
        frame: &SharedFrame,
        callback: FrameCallback,
    ) -> Result<()> {
        self.record(Call::FrameQueue, "capture_frame_queue")?;
        let mut state = lock(&self.state);
        if !state.announced.iter().any(|known| Arc::ptr_eq(known, frame)) {
            return Err(CameraError::Driver(ErrorCode::BAD_PARAMETER));
        }
        state.queue.push_back(Pending {
            frame: Arc::clone(frame),
            callback,
        });
        drop(state);

        let hook = lock(&self.queue_hook).take();
        if let Some(hook) = hook {
            hook();
        }
        Ok(())
    }

    fn settings_save(&self, _handle: Handle, path: &Path, settings: &PersistSettings) -> Result<()> {
        self.record(
            Call::SettingsSave(path.to_path_buf(), *settings),
            "settings_save",
        )
    }

    fn settings_load(&self, _handle: Handle, path: &Path, settings: &PersistSettings) -> Result<()> {
        self.record(
            Call::SettingsLoad(path.to_path_buf(), *settings),
            "settings_load",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DriverFrame;

    #[test]
    fn test_mock_default_camera() {
        let mock = MockTransport::new();
        let cameras = mock.cameras_list().expect("cameras");
        assert_eq!(cameras.len(), 1);
        assert!(cameras
            .first()
            .is_some_and(|info| info.permitted_access.contains(AccessMode::EXCLUSIVE)));
        assert_eq!(mock.payload_size_get(CAMERA).expect("payload"), 640 * 480);
    }

    #[test]
    fn test_mock_queue_requires_announce() {
        let mock = MockTransport::new();
        let frame: SharedFrame = Arc::new(Mutex::new(DriverFrame::default()));

        let err = mock
            .capture_frame_queue(CAMERA, &frame, Box::new(|| {}))
            .expect_err("unannounced frame");
        assert!(matches!(err, CameraError::Driver(ErrorCode::BAD_PARAMETER)));

        mock.frame_announce(CAMERA, &frame).expect("announce");
        mock.capture_frame_queue(CAMERA, &frame, Box::new(|| {}))
            .expect("queue");
        assert_eq!(mock.queued(), 1);
    }

    #[test]
    fn test_mock_deliver_fills_frame() {
        let mock = MockTransport::new().with_geometry(2, 2);
        let frame: SharedFrame = Arc::new(Mutex::new(DriverFrame::default()));
        let fired = Arc::new(Mutex::new(false));

        mock.frame_announce(CAMERA, &frame).expect("announce");
        let flag = Arc::clone(&fired);
        mock.capture_frame_queue(CAMERA, &frame, Box::new(move || *lock(&flag) = true))
            .expect("queue");

        assert!(mock.deliver(FrameStatus::Complete, &[1, 2, 3, 4], 42));
        assert!(*lock(&fired));

        let frame = lock(&frame);
        assert_eq!(frame.image(), &[1, 2, 3, 4]);
        assert_eq!(frame.timestamp, 42);
        assert_eq!(frame.width, 2);
        assert_eq!(frame.pixel_format, PixelFormat::MONO8.0);
        assert!(!mock.deliver(FrameStatus::Complete, &[], 0));
    }
}
