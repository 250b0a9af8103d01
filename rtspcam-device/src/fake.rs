//! Simulated camera for tests and demos
//!
//! `FakeCamera` behaves like a USB3 Vision device: it reports bounds, stores
//! feature writes, and once acquisition starts produces test-pattern frames
//! into its stream on a worker thread. Clones share state, so a test can keep
//! one handle while the session owns another.

use crate::camera::{AcquisitionMode, AutoMode, Camera, DeviceInfo, DeviceProvider, StreamInitHook, StreamParams};
use crate::error::CameraError;
use crate::options::UsbMode;
use parking_lot::Mutex;
use rand::Rng;
use rtspcam_bridge::{BufferStatus, DeviceBounds, FrameStream, PixelFormat, PooledStream};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Feature values as last written by the host
#[derive(Debug, Clone, PartialEq)]
pub struct FakeSettings {
    pub region: (u32, u32),
    pub usb_mode: Option<UsbMode>,
    pub chunk_mode: bool,
    pub exposure_auto: AutoMode,
    pub exposure: f64,
    pub frame_rate: f64,
    pub gain: f64,
    pub acquisition_mode: AcquisitionMode,
}

struct FakeState {
    settings: FakeSettings,
    bounds: DeviceBounds,
    stream: Option<Weak<PooledStream>>,
    on_init: Option<StreamInitHook>,
    worker: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    streams_created: u32,
    fail_stream_create: bool,
    fail_start: bool,
    read_only: Vec<&'static str>,
    failure_rate: f64,
    epoch: Instant,
}

#[derive(Clone)]
pub struct FakeCamera {
    id: String,
    format: PixelFormat,
    usb3: bool,
    unavailable: bool,
    frame_counter: Arc<AtomicU64>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeCamera {
    pub fn new(id: &str, format: PixelFormat) -> Self {
        let bounds = DeviceBounds {
            exposure_min: 20.0,
            exposure_max: 1_000_000.0,
            frame_rate_min: 1.0,
            frame_rate_max: 60.0,
            gain_min: 0.0,
            gain_max: 24.0,
        };

        FakeCamera {
            id: id.to_string(),
            format,
            usb3: true,
            unavailable: false,
            frame_counter: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(FakeState {
                settings: FakeSettings {
                    region: (640, 480),
                    usb_mode: None,
                    chunk_mode: true,
                    exposure_auto: AutoMode::Off,
                    exposure: 10_000.0,
                    frame_rate: DEFAULT_FRAME_RATE,
                    gain: 0.0,
                    acquisition_mode: AcquisitionMode::SingleFrame,
                },
                bounds,
                stream: None,
                on_init: None,
                worker: None,
                running: Arc::new(AtomicBool::new(false)),
                streams_created: 0,
                fail_stream_create: false,
                fail_start: false,
                read_only: Vec::new(),
                failure_rate: 0.0,
                epoch: Instant::now(),
            })),
        }
    }

    pub fn with_bounds(self, bounds: DeviceBounds) -> Self {
        self.state.lock().bounds = bounds;
        self
    }

    /// Report as a GigE device (no USB transfer mode)
    pub fn gige(mut self) -> Self {
        self.usb3 = false;
        self
    }

    /// Make `open` fail
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn set_fail_stream_create(&self, fail: bool) {
        self.state.lock().fail_stream_create = fail;
    }

    /// Make `start_acquisition` fail
    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// Reject writes to `feature` ("ExposureTime", "AcquisitionFrameRate", "Gain")
    pub fn set_read_only(&self, feature: &'static str) {
        self.state.lock().read_only.push(feature);
    }

    /// Fraction of frames completed with `MissingPackets`
    pub fn set_failure_rate(&self, rate: f64) {
        self.state.lock().failure_rate = rate.clamp(0.0, 1.0);
    }

    pub fn settings(&self) -> FakeSettings {
        self.state.lock().settings.clone()
    }

    pub fn streams_created(&self) -> u32 {
        self.state.lock().streams_created
    }

    pub fn is_acquiring(&self) -> bool {
        self.state.lock().running.load(Ordering::Acquire)
    }

    /// True while the most recent stream is still alive
    pub fn stream_alive(&self) -> bool {
        self.state
            .lock()
            .stream
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Produce one frame on the calling thread (software trigger)
    ///
    /// Returns false if there is no live stream or no free buffer.
    pub fn trigger(&self) -> bool {
        let (stream, failure_rate, epoch) = {
            let state = self.state.lock();
            (
                state.stream.as_ref().and_then(Weak::upgrade),
                state.failure_rate,
                state.epoch,
            )
        };
        match stream {
            Some(stream) => produce_frame(&stream, &self.frame_counter, failure_rate, epoch),
            None => false,
        }
    }

    fn write_feature(
        &self,
        feature: &'static str,
        apply: impl FnOnce(&mut FakeSettings),
    ) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.read_only.contains(&feature) {
            return Err(CameraError::Feature {
                feature,
                reason: "not writable".to_string(),
            });
        }
        apply(&mut state.settings);
        Ok(())
    }
}

fn produce_frame(
    stream: &Arc<PooledStream>,
    counter: &AtomicU64,
    failure_rate: f64,
    epoch: Instant,
) -> bool {
    let Some(mut frame) = stream.acquire_input() else {
        return false;
    };

    let frame_id = counter.fetch_add(1, Ordering::Relaxed);
    let stride = frame.row_stride().max(1);

    // Diagonal gradient shifted by one step per frame
    for (row, line) in frame.data_mut().chunks_mut(stride).enumerate() {
        for (col, px) in line.iter_mut().enumerate() {
            *px = (row + col + frame_id as usize) as u8;
        }
    }

    frame.frame_id = frame_id;
    frame.timestamp_ns = epoch.elapsed().as_nanos() as u64;
    frame.status = if failure_rate > 0.0 && rand::thread_rng().gen_bool(failure_rate) {
        BufferStatus::MissingPackets
    } else {
        BufferStatus::Success
    };

    stream.complete(frame);
    true
}

impl Camera for FakeCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_usb3_vision(&self) -> bool {
        self.usb3
    }

    fn set_usb_mode(&self, mode: UsbMode) -> Result<(), CameraError> {
        self.state.lock().settings.usb_mode = Some(mode);
        Ok(())
    }

    fn set_chunk_mode(&self, enabled: bool) -> Result<(), CameraError> {
        self.state.lock().settings.chunk_mode = enabled;
        Ok(())
    }

    fn set_region(&self, width: u32, height: u32) -> Result<(), CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::Feature {
                feature: "Region",
                reason: format!("invalid size {}x{}", width, height),
            });
        }
        self.state.lock().settings.region = (width, height);
        Ok(())
    }

    fn exposure_bounds(&self) -> Result<(f64, f64), CameraError> {
        let bounds = self.state.lock().bounds;
        Ok((bounds.exposure_min, bounds.exposure_max))
    }

    fn frame_rate_bounds(&self) -> Result<(f64, f64), CameraError> {
        let bounds = self.state.lock().bounds;
        Ok((bounds.frame_rate_min, bounds.frame_rate_max))
    }

    fn gain_bounds(&self) -> Result<(f64, f64), CameraError> {
        let bounds = self.state.lock().bounds;
        Ok((bounds.gain_min, bounds.gain_max))
    }

    fn set_exposure_auto(&self, mode: AutoMode) -> Result<(), CameraError> {
        self.state.lock().settings.exposure_auto = mode;
        Ok(())
    }

    fn set_exposure(&self, value: f64) -> Result<(), CameraError> {
        self.write_feature("ExposureTime", |settings| settings.exposure = value)
    }

    fn set_frame_rate(&self, value: f64) -> Result<(), CameraError> {
        self.write_feature("AcquisitionFrameRate", |settings| settings.frame_rate = value)
    }

    fn set_gain(&self, value: f64) -> Result<(), CameraError> {
        self.write_feature("Gain", |settings| settings.gain = value)
    }

    fn set_acquisition_mode(&self, mode: AcquisitionMode) -> Result<(), CameraError> {
        self.state.lock().settings.acquisition_mode = mode;
        Ok(())
    }

    fn pixel_format(&self) -> Result<PixelFormat, CameraError> {
        Ok(self.format)
    }

    fn create_stream(&self, params: StreamParams) -> Result<Arc<dyn FrameStream>, CameraError> {
        let mut state = self.state.lock();
        if state.fail_stream_create {
            return Err(CameraError::Stream("stream creation refused".to_string()));
        }

        let (width, height) = state.settings.region;
        let stream = PooledStream::new(
            params.buffer_count,
            width,
            height,
            self.format,
            Some(params.on_frame),
        );

        state.stream = Some(Arc::downgrade(&stream));
        state.on_init = params.on_init;
        state.streams_created += 1;

        Ok(stream)
    }

    fn start_acquisition(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.worker.is_some() {
            return Ok(());
        }
        if state.fail_start {
            return Err(CameraError::Stream("acquisition start refused".to_string()));
        }
        let Some(stream) = state.stream.clone() else {
            return Err(CameraError::Stream("no stream created".to_string()));
        };

        let running = Arc::new(AtomicBool::new(true));
        let interval = Duration::from_secs_f64(1.0 / state.settings.frame_rate.max(1.0));
        let on_init = state.on_init.clone();
        let failure_rate = state.failure_rate;
        let epoch = state.epoch;
        let counter = self.frame_counter.clone();
        let thread_running = running.clone();

        let worker = thread::Builder::new()
            .name(format!("{}-stream", self.id))
            .spawn(move || {
                if let Some(on_init) = on_init {
                    on_init();
                }

                while thread_running.load(Ordering::Acquire) {
                    let Some(stream) = stream.upgrade() else {
                        break;
                    };
                    produce_frame(&stream, &counter, failure_rate, epoch);
                    drop(stream);
                    thread::sleep(interval);
                }

                log::info!("fake camera stream thread exiting");
            })?;

        state.running = running;
        state.worker = Some(worker);
        Ok(())
    }

    fn stop_acquisition(&self) -> Result<(), CameraError> {
        let worker = {
            let mut state = self.state.lock();
            state.running.store(false, Ordering::Release);
            state.worker.take()
        };

        if let Some(worker) = worker {
            worker
                .join()
                .map_err(|_| CameraError::Stream("stream thread panicked".to_string()))?;
        }
        Ok(())
    }
}

/// Provider over a fixed set of fake cameras
#[derive(Clone, Default)]
pub struct FakeProvider {
    cameras: Vec<FakeCamera>,
    opens: Arc<AtomicU32>,
}

impl FakeProvider {
    pub fn new(cameras: Vec<FakeCamera>) -> Self {
        FakeProvider {
            cameras,
            opens: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Successful `open` calls so far
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DeviceProvider for FakeProvider {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.cameras
            .iter()
            .map(|camera| DeviceInfo {
                id: camera.id.clone(),
                vendor: "Fake".to_string(),
                model: format!("{} camera", camera.format),
            })
            .collect()
    }

    fn open(&self, id: &str) -> Result<Box<dyn Camera>, CameraError> {
        match self.cameras.iter().find(|camera| camera.id == id) {
            Some(camera) if !camera.unavailable => {
                self.opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(camera.clone()))
            }
            _ => Err(CameraError::Unavailable(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtspcam_bridge::FrameCallback;

    fn noop_params(buffer_count: usize) -> StreamParams {
        let on_frame: FrameCallback = Arc::new(|_stream| {});
        StreamParams {
            buffer_count,
            on_frame,
            on_init: None,
        }
    }

    #[test]
    fn test_provider_lists_and_opens() {
        let provider = FakeProvider::new(vec![
            FakeCamera::new("Fake-1", PixelFormat::BayerRG8),
            FakeCamera::new("Fake-2", PixelFormat::Mono8).unavailable(),
        ]);

        let devices = provider.list_devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "Fake-1");

        assert!(provider.open("Fake-1").is_ok());
        assert!(matches!(provider.open("Fake-2"), Err(CameraError::Unavailable(_))));
        assert!(provider.open("Fake-3").is_err());
    }

    #[test]
    fn test_trigger_fills_stream() {
        let camera = FakeCamera::new("Fake-1", PixelFormat::Mono8);
        camera.set_region(64, 8).unwrap();

        let stream = camera.create_stream(noop_params(2)).unwrap();
        assert!(camera.trigger());
        assert!(camera.trigger());
        assert!(!camera.trigger(), "Pool exhausted after two frames");

        let frame = stream.pop_buffer().unwrap();
        assert_eq!(frame.status, BufferStatus::Success);
        assert_eq!((frame.width, frame.height), (64, 8));
        assert_eq!(frame.data()[1], 1);
    }

    #[test]
    fn test_failure_rate_marks_frames() {
        let camera = FakeCamera::new("Fake-1", PixelFormat::Mono8);
        camera.set_region(16, 4).unwrap();
        camera.set_failure_rate(1.0);

        let stream = camera.create_stream(noop_params(1)).unwrap();
        assert!(camera.trigger());
        assert_eq!(stream.pop_buffer().unwrap().status, BufferStatus::MissingPackets);
    }

    #[test]
    fn test_worker_produces_until_stopped() {
        let camera = FakeCamera::new("Fake-1", PixelFormat::Mono8);
        camera.set_region(16, 4).unwrap();
        camera.set_frame_rate(60.0).unwrap();

        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let on_frame: FrameCallback = Arc::new(move |stream| {
            if let Some(frame) = stream.pop_buffer() {
                counter.fetch_add(1, Ordering::SeqCst);
                stream.push_buffer(frame);
            }
        });
        let stream = camera
            .create_stream(StreamParams {
                buffer_count: 4,
                on_frame,
                on_init: None,
            })
            .unwrap();
        stream.set_emit_signals(true);

        camera.start_acquisition().unwrap();
        assert!(camera.is_acquiring());
        thread::sleep(Duration::from_millis(200));
        camera.stop_acquisition().unwrap();

        assert!(!camera.is_acquiring());
        assert!(seen.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_read_only_feature_and_refused_start() {
        let camera = FakeCamera::new("Fake-1", PixelFormat::Mono8);
        camera.set_read_only("Gain");
        camera.set_fail_start(true);

        assert!(matches!(
            camera.set_gain(6.0),
            Err(CameraError::Feature { feature: "Gain", .. })
        ));
        assert_eq!(camera.settings().gain, 0.0);
        assert!(camera.set_exposure(500.0).is_ok());

        let _stream = camera.create_stream(noop_params(2)).unwrap();
        assert!(camera.start_acquisition().is_err());
        assert!(!camera.is_acquiring());
    }

    #[test]
    fn test_refused_stream() {
        let camera = FakeCamera::new("Fake-1", PixelFormat::Mono8);
        camera.set_fail_stream_create(true);
        assert!(matches!(
            camera.create_stream(noop_params(2)),
            Err(CameraError::Stream(_))
        ));
        assert_eq!(camera.streams_created(), 0);
    }
}
