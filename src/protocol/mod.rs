//! ICE Bloc JSON protocol engine.
//!
//! Leaves first:
//!
//! - [`transport`]: one TCP stream per module, raw bytes only.
//! - [`codec`]: `{"message": {...}}` envelope encode/decode.
//! - [`notification`]: classification of push telemetry and final reports.
//! - [`dispatcher`]: the request/reply state machine every operation goes through.
//! - [`registry`]: the static operation catalogue of each module type.
//! - [`reply`]: typed access to decoded reply fields.

pub mod codec;
pub mod dispatcher;
pub mod notification;
pub mod registry;
pub mod reply;
pub mod transport;

pub use codec::{Envelope, ParamValue, Parameters};
pub use dispatcher::{BusyPolicy, CallOptions, Connection, ConnectionState, IdStrategy};
pub use notification::{Notification, ScanActivity, ScanProgress, TaskReport};
pub use registry::{Args, ModuleKind, OperationSpec};
pub use reply::Reply;
pub use transport::Transport;
