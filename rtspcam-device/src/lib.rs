//! Camera device session
//!
//! Owns the opened camera, applies stream options, and drives the
//! acquisition lifecycle that feeds frames through the buffer bridge.

pub mod camera;
pub mod error;
pub mod fake;
pub mod options;
pub mod priority;
pub mod session;

pub use camera::*;
pub use error::*;
pub use fake::{FakeCamera, FakeProvider, FakeSettings};
pub use options::*;
pub use priority::{elevate_current_thread, pin_current_thread, stream_init_hook, ThreadPriority};
pub use session::*;
