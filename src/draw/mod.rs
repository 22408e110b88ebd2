//! Drawing reconciliation: snapshot diffing and the animation pipeline that
//! presents each reveal.

pub mod counters;
pub mod diff;
pub mod digits;
pub mod elimination;
pub mod engine;
pub mod events;
pub mod gateway;
pub mod scheduler;
pub mod view;
pub mod winner;

pub use counters::*;
pub use diff::*;
pub use digits::*;
pub use elimination::*;
pub use engine::*;
pub use events::*;
pub use gateway::*;
pub use scheduler::*;
pub use view::*;
pub use winner::*;

#[cfg(test)]
mod tests;
