//! Utility modules: clock, retry, timeout.

pub mod clock;
pub mod retry;
pub mod timeout;
