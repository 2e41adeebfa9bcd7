//! Runtime bootstrap shared by the binary: error types and telemetry.

pub mod error;
pub mod telemetry;
