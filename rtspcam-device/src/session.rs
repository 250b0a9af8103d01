//! Device session: camera ownership and acquisition lifecycle
//!
//! A session owns one opened camera and, while streaming, the device stream
//! feeding the bound pipeline sink. Start/stop are serialized by a mutex that
//! the frame path never takes; frames flow through the stream's own worker
//! thread into a [`BufferBridge`].

use crate::camera::{query_bounds, AcquisitionMode, AutoMode, Camera, DeviceProvider, StreamParams};
use crate::error::{CameraError, DeviceError};
use crate::options::StreamOptions;
use crate::priority::stream_init_hook;
use parking_lot::Mutex;
use rtspcam_bridge::{
    BridgeStats, BridgeStatsHandle, BufferBridge, DeviceBounds, FrameSink, FrameStream, SinkCaps,
    StreamTiming,
};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Acquisition state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Streaming => f.write_str("streaming"),
        }
    }
}

// The stream handle exists only while streaming
enum Acquisition {
    Idle,
    Streaming { stream: Arc<dyn FrameStream> },
}

struct Inner {
    camera: Option<Box<dyn Camera>>,
    bounds: DeviceBounds,
    sink: Option<Arc<dyn FrameSink>>,
    acquisition: Acquisition,
    bridge_stats: Option<BridgeStatsHandle>,
}

pub struct DeviceSession {
    options: Arc<StreamOptions>,
    inner: Mutex<Inner>,
    clients: AtomicU32,
}

impl DeviceSession {
    /// Create an uninitialized, idle session
    pub fn new(options: Arc<StreamOptions>) -> Self {
        DeviceSession {
            options,
            inner: Mutex::new(Inner {
                camera: None,
                bounds: DeviceBounds::default(),
                sink: None,
                acquisition: Acquisition::Idle,
                bridge_stats: None,
            }),
            clients: AtomicU32::new(0),
        }
    }

    /// Create a session and open its device
    pub fn open(
        provider: &dyn DeviceProvider,
        options: Arc<StreamOptions>,
    ) -> Result<Self, DeviceError> {
        let session = Self::new(options);
        session.initialize(provider)?;
        Ok(session)
    }

    /// Select, open and configure the device
    ///
    /// The session lock is held throughout, so concurrent calls open the
    /// device once.
    pub fn initialize(&self, provider: &dyn DeviceProvider) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();
        if inner.camera.is_some() {
            log::info!("device session already initialized");
            return Ok(());
        }

        let devices = provider.list_devices();
        if devices.is_empty() {
            log::error!("no device found!");
            return Err(DeviceError::NotFound { id: None });
        }

        let id = match &self.options.device_id {
            Some(wanted) => match devices.iter().find(|d| &d.id == wanted) {
                Some(device) => device.id.clone(),
                None => {
                    log::error!("device {} not found", wanted);
                    return Err(DeviceError::NotFound {
                        id: Some(wanted.clone()),
                    });
                }
            },
            None => devices[0].id.clone(),
        };

        let camera = provider.open(&id).map_err(|source| DeviceError::Init {
            id: id.clone(),
            source,
        })?;
        let bounds = configure_camera(camera.as_ref(), &self.options)
            .map_err(|source| DeviceError::Init {
                id: id.clone(),
                source,
            })?;

        inner.camera = Some(camera);
        inner.bounds = bounds;

        log::info!("found camera(s): {} ({})", devices.len(), id);
        Ok(())
    }

    /// Configure `sink` for the camera's native format and keep it for streaming
    pub fn bind_sink(&self, sink: Arc<dyn FrameSink>) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();

        if inner.sink.is_some() {
            Self::stop_locked(&mut inner);
        }

        let format = inner
            .camera
            .as_ref()
            .ok_or(DeviceError::NotInitialized)?
            .pixel_format()?;

        let Some(caps) = format.caps_string() else {
            log::error!("pipeline cannot understand this camera pixel format: {}", format);
            Self::stop_locked(&mut inner);
            inner.sink = None;
            return Err(DeviceError::IncompatibleFormat { format });
        };

        sink.set_caps(SinkCaps::new(caps, self.options.width, self.options.height))?;
        sink.set_timing(StreamTiming::live());
        inner.sink = Some(sink);

        Ok(())
    }

    /// Open a device stream and start hardware acquisition
    ///
    /// Calling this while streaming is a no-op.
    pub fn start_acquisition(&self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock();

        if let Acquisition::Streaming { .. } = inner.acquisition {
            log::info!(
                "{}",
                DeviceError::AcquisitionState {
                    requested: "start",
                    current: SessionState::Streaming,
                }
            );
            return Ok(());
        }

        let bounds = inner.bounds;
        let Some(camera) = inner.camera.as_ref() else {
            log::error!("device session not initialized properly");
            return Err(DeviceError::NotInitialized);
        };
        let Some(sink) = inner.sink.clone() else {
            return Err(DeviceError::SinkNotBound);
        };

        let bridge = BufferBridge::new(sink);
        let stats = bridge.stats_handle();
        let params = StreamParams {
            buffer_count: self.options.buffer_count,
            on_frame: bridge.into_callback(),
            on_init: Some(stream_init_hook(
                self.options.realtime_worker,
                self.options.worker_core,
            )),
        };

        let stream = camera.create_stream(params).map_err(|e| {
            log::error!("can not start stream: {}", e);
            DeviceError::StreamCreate(e)
        })?;
        stream.set_emit_signals(true);

        log::info!("starting acquisition");
        if let Err(e) = camera.set_acquisition_mode(AcquisitionMode::Continuous) {
            log::warn!("failed to set continuous acquisition mode: {}", e);
        }
        apply_overrides(camera.as_ref(), &bounds, &self.options);

        if let Err(e) = camera.start_acquisition() {
            log::error!("failed to start acquisition: {}", e);
            stream.set_emit_signals(false);
            return Err(DeviceError::Acquisition(e));
        }

        inner.acquisition = Acquisition::Streaming { stream };
        inner.bridge_stats = Some(stats);
        Ok(())
    }

    /// Stop acquisition and release the stream; a no-op while idle
    pub fn stop_acquisition(&self) {
        let mut inner = self.inner.lock();
        Self::stop_locked(&mut inner);
    }

    fn stop_locked(inner: &mut Inner) {
        let Acquisition::Streaming { stream } =
            std::mem::replace(&mut inner.acquisition, Acquisition::Idle)
        else {
            log::debug!(
                "{}",
                DeviceError::AcquisitionState {
                    requested: "stop",
                    current: SessionState::Idle,
                }
            );
            return;
        };

        log::info!("stopping acquisition");

        // No new callbacks past this point; in-flight ones hold their own handle
        stream.set_emit_signals(false);
        drop(stream);

        if let Some(camera) = &inner.camera {
            if let Err(e) = camera.stop_acquisition() {
                log::warn!("failed to stop acquisition: {}", e);
            }
        }
        inner.sink = None;
    }

    /// Register a connected client; returns the new count
    pub fn incr_clients(&self) -> u32 {
        self.clients.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Unregister a client; never goes below zero
    pub fn decr_clients(&self) -> u32 {
        match self
            .clients
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    pub fn client_count(&self) -> u32 {
        self.clients.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().camera.is_some()
    }

    pub fn state(&self) -> SessionState {
        match self.inner.lock().acquisition {
            Acquisition::Idle => SessionState::Idle,
            Acquisition::Streaming { .. } => SessionState::Streaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    pub fn bounds(&self) -> DeviceBounds {
        self.inner.lock().bounds
    }

    pub fn options(&self) -> &Arc<StreamOptions> {
        &self.options
    }

    /// Counters of the most recent acquisition's bridge
    pub fn bridge_stats(&self) -> Option<BridgeStats> {
        self.inner
            .lock()
            .bridge_stats
            .as_ref()
            .map(BridgeStatsHandle::snapshot)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        Self::stop_locked(self.inner.get_mut());
    }
}

fn configure_camera(camera: &dyn Camera, options: &StreamOptions) -> Result<DeviceBounds, CameraError> {
    if camera.is_usb3_vision() {
        camera.set_usb_mode(options.usb_mode)?;
    }
    camera.set_chunk_mode(false)?;
    camera.set_region(options.width, options.height)?;
    camera.set_exposure_auto(AutoMode::Continuous)?;
    query_bounds(camera)
}

/// Apply each supplied override that lies within the device bounds
///
/// Writes are best-effort: a rejected write is logged and the remaining
/// overrides are still tried.
fn apply_overrides(camera: &dyn Camera, bounds: &DeviceBounds, options: &StreamOptions) {
    if let Some(exposure) = options.exposure {
        if bounds.exposure().contains(&exposure) {
            let written = camera
                .set_exposure_auto(AutoMode::Off)
                .and_then(|_| camera.set_exposure(exposure));
            if let Err(e) = written {
                log::warn!("failed to set exposure {}: {}", exposure, e);
            }
        } else {
            log::warn!(
                "exposure {} outside [{}, {}], not applied",
                exposure,
                bounds.exposure_min,
                bounds.exposure_max
            );
        }
    }

    if let Some(frame_rate) = options.frame_rate {
        if bounds.frame_rate().contains(&frame_rate) {
            if let Err(e) = camera.set_frame_rate(frame_rate) {
                log::warn!("failed to set frame rate {}: {}", frame_rate, e);
            }
        } else {
            log::warn!(
                "frame rate {} outside [{}, {}], not applied",
                frame_rate,
                bounds.frame_rate_min,
                bounds.frame_rate_max
            );
        }
    }

    if let Some(gain) = options.gain {
        if bounds.gain().contains(&gain) {
            if let Err(e) = camera.set_gain(gain) {
                log::warn!("failed to set gain {}: {}", gain, e);
            }
        } else {
            log::warn!(
                "gain {} outside [{}, {}], not applied",
                gain,
                bounds.gain_min,
                bounds.gain_max
            );
        }
    }
}
