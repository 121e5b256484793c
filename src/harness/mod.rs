//! Wires a time source, an impairing link and a client into one runnable
//! experiment driven by a [`HarnessConfig`](crate::config::HarnessConfig).

mod error;
mod runner;

pub use error::{HarnessError, HarnessResult};
pub use runner::{CancelHandle, Harness, RunReport};
