pub mod backend;
pub mod config;
pub mod domain;
pub mod draw;
pub mod runtime;
pub mod tokio_tools;

#[cfg(test)]
pub mod test_utils;

pub use config::EngineConfig;
pub use draw::DrawingEngine;
pub use runtime::DrawingHandle;
