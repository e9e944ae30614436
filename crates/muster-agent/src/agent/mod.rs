//! Configuration, telemetry and the health endpoint for the agent binary.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration and validation.
//! - [`health`] - HTTP or gRPC health endpoint with a not-serving switch.
//! - [`shutdown`] - signal handling and deregistration on server failure.
//! - [`telemetry`] - log output and optional OpenTelemetry export.

pub mod config;
pub mod health;
pub mod shutdown;
pub mod telemetry;
