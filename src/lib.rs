//! # M Squared ICE Bloc Client Library
//!
//! Async control and telemetry client for M Squared laser systems. Each
//! physical subsystem (SolsTiS seed laser, Equinox pump laser, SFG and DFG
//! conversion stages) sits behind its own ICE Bloc controller, reachable over
//! one TCP connection carrying `{"message": {...}}` JSON envelopes.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: The protocol engine. Transport, envelope codec, the
//!   request/reply dispatcher, push notification routing and the static
//!   operation catalogue of every module type.
//! - **`hardware`**: Typed module facades (`Solstis`, `Equinox`, `Sfg`, `Dfg`),
//!   the `LaserSystem` aggregate and a simulated ICE Bloc for tests.
//! - **`config`**: Layered configuration (TOML file plus `MSQUARED_*`
//!   environment variables) built with `figment`.
//! - **`error`**: The `IceBlocError` enum shared by every layer.
//! - **`logging`**: `tracing-subscriber` initialisation.

pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod protocol;

pub use config::MsquaredConfig;
pub use error::{IceBlocError, Result};
pub use hardware::{Dfg, Equinox, LaserSystem, Module, Sfg, Solstis};
pub use protocol::{CallOptions, Connection, ModuleKind};
