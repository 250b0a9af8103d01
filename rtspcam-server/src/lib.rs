//! RTSP server side of the camera bridge
//!
//! Connects streaming-server callbacks to a [`rtspcam_device::DeviceSession`]:
//! media configuration starts acquisition, a `Null` media state stops it,
//! and client connections are counted. Also builds the mount point and the
//! launch description for the selected encode path.

pub mod coordinator;
pub mod error;
pub mod events;
pub mod launch;

pub use coordinator::*;
pub use error::*;
pub use events::{EventDispatcher, ServerEvent};
pub use launch::*;
