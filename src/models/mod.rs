//! Domain model module declarations.

pub mod binary;
pub mod exit_state;
pub mod lifecycle;

pub use binary::BinaryType;
pub use exit_state::{ExitCell, ExitState};
pub use lifecycle::{Lifecycle, LifecycleState};
