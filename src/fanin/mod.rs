//! Waiting on many concurrent producers at once.

pub mod collector;
pub mod producer;
pub mod race;

pub use collector::{spawn_all, wait_all, FanIn};
pub use producer::Producer;
pub use race::{first, first_ok};
