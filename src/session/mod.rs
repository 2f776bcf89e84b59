//! Session lifecycle: single-flight refresh and termination.

pub mod coordinator;
pub mod terminator;

pub use coordinator::{Phase, RefreshCoordinator, RefreshResult};
pub use terminator::{HeadlessNavigator, Navigator, SessionTerminator, Termination};
