pub mod driver;
pub mod poller;

pub use driver::{DrawRuntimeConfig, DrawingHandle, RuntimeError};
pub use poller::SnapshotPoller;
