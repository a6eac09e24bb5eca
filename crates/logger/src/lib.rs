//! Process-wide tracing setup shared by the workspace binaries.

mod tracing;

pub use crate::tracing::{LogFormat, init, init_tracing};
