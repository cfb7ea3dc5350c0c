//! Shared tracing setup for the heartwatch binaries.

mod tracing;

pub use crate::tracing::{LogFormat, init_with};
