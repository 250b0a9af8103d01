//! Message form of the coordinator callbacks
//!
//! Server threads post [`ServerEvent`]s; a single dispatcher thread applies
//! them to the coordinator in arrival order. Failures are logged and never
//! reach the server.

use crate::coordinator::{ClientConnection, ClientId, LifecycleCoordinator, MediaState, MediaStreams};
use crate::error::ServerError;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rtspcam_bridge::FrameSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub enum ServerEvent {
    MediaConfigured(Arc<dyn FrameSink>),
    MediaConstructed(Arc<dyn MediaStreams + Send + Sync>),
    MediaStateChanged(MediaState),
    ClientConnected(Arc<dyn ClientConnection + Send + Sync>),
    ClientClosed(ClientId),
}

impl ServerEvent {
    fn apply(self, coordinator: &LifecycleCoordinator) {
        match self {
            ServerEvent::MediaConfigured(sink) => {
                if let Err(e) = coordinator.on_media_configured(sink) {
                    log::error!("failed to configure media: {}", e);
                }
            }
            ServerEvent::MediaConstructed(media) => coordinator.on_media_constructed(media.as_ref()),
            ServerEvent::MediaStateChanged(state) => coordinator.on_media_state_changed(state),
            ServerEvent::ClientConnected(client) => coordinator.on_client_connected(client.as_ref()),
            ServerEvent::ClientClosed(id) => coordinator.on_client_closed(id),
        }
    }
}

pub struct EventDispatcher {
    // Taken on shutdown; posting and closing are serialized through this lock
    tx: Mutex<Option<Sender<ServerEvent>>>,
    running: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    pub fn spawn(coordinator: LifecycleCoordinator) -> Result<Self, ServerError> {
        let (tx, rx) = channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let thread_handle = thread::Builder::new()
            .name("rtspcam-events".to_string())
            .spawn({
                let running = running.clone();
                move || Self::run(coordinator, rx, running)
            })
            .map_err(ServerError::Spawn)?;

        Ok(EventDispatcher {
            tx: Mutex::new(Some(tx)),
            running,
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }

    fn run(coordinator: LifecycleCoordinator, rx: Receiver<ServerEvent>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Acquire) {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(event) => event.apply(&coordinator),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Events posted before shutdown are still applied
        for event in rx.try_iter() {
            event.apply(&coordinator);
        }

        log::info!("event dispatcher exiting");
    }

    /// Raw channel handle for server threads; `None` after shutdown
    ///
    /// Events sent on a clone after `shutdown` has returned are never applied;
    /// use [`post`](Self::post) when that matters.
    pub fn sender(&self) -> Option<Sender<ServerEvent>> {
        self.tx.lock().clone()
    }

    /// Post an event; true means it will be applied
    pub fn post(&self, event: ServerEvent) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the dispatcher thread and wait for it
    ///
    /// Every event accepted by `post` before this call is applied first.
    pub fn shutdown(&self) {
        // Any post holding the lock finishes its send before the sender goes
        drop(self.tx.lock().take());
        self.running.store(false, Ordering::Release);

        let handle = self.thread_handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("event dispatcher panicked");
            }
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
