//! Streaming-server callbacks driving the device session
//!
//! The server collaborator invokes these as media sessions are configured,
//! change state, and as clients come and go. Every entry point takes `&self`
//! and may be called from any server thread.

use crate::error::ServerError;
use crate::launch::MulticastPool;
use rtspcam_bridge::FrameSink;
use rtspcam_device::DeviceSession;
use std::fmt;
use std::sync::Arc;

/// Pipeline state reported for a media session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    VoidPending,
    Null,
    Ready,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

pub type CloseHandler = Box<dyn FnOnce() + Send>;

/// A connected client as seen by the server collaborator
pub trait ClientConnection {
    fn id(&self) -> ClientId;

    /// Run `handler` once when the client disconnects
    fn connect_closed(&self, handler: CloseHandler);
}

/// Streams of a constructed media session
pub trait MediaStreams {
    fn n_streams(&self) -> u32;

    fn set_address_pool(&self, index: u32, pool: MulticastPool);
}

#[derive(Clone)]
pub struct LifecycleCoordinator {
    session: Arc<DeviceSession>,
}

impl LifecycleCoordinator {
    pub fn new(session: Arc<DeviceSession>) -> Self {
        LifecycleCoordinator { session }
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    /// A pipeline was built for a media session: feed it from the camera
    pub fn on_media_configured(&self, sink: Arc<dyn FrameSink>) -> Result<(), ServerError> {
        self.session.bind_sink(sink)?;
        self.session.start_acquisition()?;
        Ok(())
    }

    /// Give every stream of the media its own multicast range
    ///
    /// Streams past the end of the multicast range get no pool.
    pub fn on_media_constructed(&self, media: &dyn MediaStreams) {
        for index in 0..media.n_streams() {
            let Some(pool) = MulticastPool::for_stream(index) else {
                log::warn!("no multicast range left for stream {}, skipping", index);
                continue;
            };
            log::debug!(
                "stream {} multicast {}-{} ports {}-{}",
                index,
                pool.min_address,
                pool.max_address,
                pool.min_port,
                pool.max_port
            );
            media.set_address_pool(index, pool);
        }
    }

    pub fn on_media_state_changed(&self, state: MediaState) {
        if state == MediaState::Null {
            self.session.stop_acquisition();
        }
    }

    pub fn on_client_connected(&self, client: &dyn ClientConnection) {
        let count = self.session.incr_clients();
        log::info!("client connected (current: {})", count);

        let coordinator = self.clone();
        let id = client.id();
        client.connect_closed(Box::new(move || coordinator.on_client_closed(id)));
    }

    pub fn on_client_closed(&self, id: ClientId) {
        let count = self.session.decr_clients();
        log::info!("{} disconnected (current: {})", id, count);
    }
}
