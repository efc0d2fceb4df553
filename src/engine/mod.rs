pub mod claim;
pub mod control;
pub mod follow_loop;
pub mod goal;
pub mod lifecycle;
pub mod runtime;

pub use control::{Control, RunState};
pub use lifecycle::Engine;
pub use runtime::{AccountRuntime, SharedRuntime};
