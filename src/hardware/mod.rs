//! ICE Bloc Module Facades
//!
//! One facade per module type, each owning exactly one [`Connection`]:
//!
//! - [`Solstis`] - Ti:sapphire seed laser
//! - [`Equinox`] - pump laser
//! - [`Sfg`] / [`Dfg`] - frequency conversion stages
//!
//! Every facade implements [`Module`], which provides the generic,
//! catalogue-driven [`Module::invoke`] entry point plus the shared `start_link`
//! handshake and `ping`. The typed methods on each facade are thin wrappers
//! that pack arguments into an [`Args`] bag and go through the same path, so
//! operation ids and parameter names live only in the registry tables.
//!
//! # Example
//!
//! ```rust,ignore
//! let solstis = Solstis::connect("192.168.1.222", 39902, CallOptions::default()).await?;
//! solstis.start_link("192.168.1.108").await?;
//! let current = solstis.poll_wave_m().await?.wavelength()?;
//! solstis.set_wave_m(current + 1.0).await?;
//! ```

pub mod dfg;
pub mod equinox;
pub mod mock;
pub mod sfg;
pub mod solstis;
pub mod system;
pub mod types;

pub use dfg::Dfg;
pub use equinox::{Equinox, PumpStatus};
pub use sfg::Sfg;
pub use solstis::{Solstis, SolstisStatus, WavelengthPoll, WavelengthRange, WaveTuningStatus};
pub use system::LaserSystem;
pub use types::*;

use crate::error::{IceBlocError, Result};
use crate::protocol::notification::Notification;
use crate::protocol::registry::{self, ModuleKind, OperationSpec};
use crate::protocol::{Args, Connection, Reply, TaskReport};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Behaviour shared by every ICE Bloc module facade.
#[async_trait]
pub trait Module: Send + Sync {
    /// Module type, selects the operation catalogue.
    fn kind(&self) -> ModuleKind;

    /// The module's connection.
    fn connection(&self) -> &Connection;

    /// Validate `args` against `spec` and issue the call.
    async fn call_spec(&self, spec: &'static OperationSpec, args: &Args, report: bool) -> Result<Reply> {
        let parameters = spec.build(args, report)?;
        let reply = self
            .connection()
            .call(spec.id, spec.name, parameters)
            .await?;
        Ok(Reply::new(spec.name, reply))
    }

    /// Issue catalogue operation `name` with `args`.
    ///
    /// # Errors
    /// [`IceBlocError::UnknownOperation`] and [`IceBlocError::InvalidArgument`]
    /// before anything is sent, otherwise whatever the call itself fails with.
    async fn invoke(&self, name: &str, args: &Args) -> Result<Reply> {
        let spec = registry::lookup(self.kind(), name)?;
        self.call_spec(spec, args, false).await
    }

    /// Like [`invoke`](Module::invoke), also requesting a final report.
    ///
    /// The report arrives later as [`Notification::TaskReport`] on
    /// [`subscribe`](Module::subscribe).
    async fn invoke_reported(&self, name: &str, args: &Args) -> Result<Reply> {
        let spec = registry::lookup(self.kind(), name)?;
        self.call_spec(spec, args, true).await
    }

    /// Issue `name` with a final report and wait up to `limit` for it.
    ///
    /// A report flagged as failed becomes [`IceBlocError::Device`].
    async fn invoke_and_wait(&self, name: &str, args: &Args, limit: Duration) -> Result<TaskReport> {
        // subscribe first so a fast report is not missed
        let mut notifications = self.subscribe();
        self.invoke_reported(name, args).await?;
        let report = tokio::time::timeout(limit, wait_for_report(&mut notifications, name))
            .await
            .map_err(|_| IceBlocError::Timeout {
                op: format!("{name} final report"),
                after: limit,
            })??;
        if report.failed {
            return Err(IceBlocError::Device {
                op: name.to_string(),
                message: "final report: task failed".to_string(),
            });
        }
        Ok(report)
    }

    /// Register `ip_address` as the client of this module.
    ///
    /// Some modules ignore every other operation until this handshake is done.
    async fn start_link(&self, ip_address: &str) -> Result<Reply> {
        let reply = self
            .invoke("start_link", &Args::new().with("ip_address", ip_address))
            .await?;
        info!(module = %self.kind(), peer = %self.connection().peer(), "Link started");
        Ok(reply)
    }

    /// Echo `text` off the module; the reply has its case inverted.
    async fn ping(&self, text: &str) -> Result<String> {
        let reply = self
            .invoke("ping", &Args::new().with("text_in", text))
            .await?;
        Ok(reply.text("text_out")?.to_string())
    }

    /// Push telemetry, final reports and unsolicited frames of this module.
    fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.connection().subscribe()
    }

    /// Close the module connection.
    async fn close(&self) {
        self.connection().close().await;
    }
}

async fn wait_for_report(
    notifications: &mut broadcast::Receiver<Notification>,
    op: &str,
) -> Result<TaskReport> {
    loop {
        match notifications.recv().await {
            Ok(Notification::TaskReport(report)) if report.op == op => return Ok(report),
            Ok(other) => debug!(op = other.op(), "Ignoring notification while awaiting report"),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification receiver lagged while awaiting report");
            }
            Err(RecvError::Closed) => {
                return Err(IceBlocError::Protocol(format!(
                    "notification channel closed before '{op}' reported"
                )))
            }
        }
    }
}

/// Implement [`Module`] and the connect constructors for a facade struct
/// holding a `conn: Connection` field.
macro_rules! facade {
    ($facade:ident, $kind:expr) => {
        impl $facade {
            /// Connect to the module at `host:port`.
            ///
            /// # Errors
            /// [`IceBlocError::Connection`](crate::error::IceBlocError::Connection)
            /// if the module cannot be reached.
            pub async fn connect(
                host: &str,
                port: u16,
                options: $crate::protocol::CallOptions,
            ) -> $crate::error::Result<Self> {
                let conn = $crate::protocol::Connection::open(host, port, options).await?;
                Ok(Self::from_connection(conn))
            }

            /// Connect to the module's factory default address.
            pub async fn connect_default(
                options: $crate::protocol::CallOptions,
            ) -> $crate::error::Result<Self> {
                let (host, port) = $kind.default_endpoint();
                Self::connect(host, port, options).await
            }

            /// Wrap an already open connection.
            pub fn from_connection(conn: $crate::protocol::Connection) -> Self {
                Self { conn }
            }
        }

        #[async_trait::async_trait]
        impl $crate::hardware::Module for $facade {
            fn kind(&self) -> $crate::protocol::ModuleKind {
                $kind
            }

            fn connection(&self) -> &$crate::protocol::Connection {
                &self.conn
            }
        }
    };
}

pub(crate) use facade;

/// Any of the four facades, for code that picks the module at runtime.
pub enum AnyModule {
    /// Seed laser.
    Solstis(Solstis),
    /// Pump laser.
    Equinox(Equinox),
    /// SFG stage.
    Sfg(Sfg),
    /// DFG stage.
    Dfg(Dfg),
}

impl AnyModule {
    /// Wrap `conn` in the facade for `kind`.
    pub fn from_connection(kind: ModuleKind, conn: Connection) -> Self {
        match kind {
            ModuleKind::Solstis => Self::Solstis(Solstis::from_connection(conn)),
            ModuleKind::Equinox => Self::Equinox(Equinox::from_connection(conn)),
            ModuleKind::Sfg => Self::Sfg(Sfg::from_connection(conn)),
            ModuleKind::Dfg => Self::Dfg(Dfg::from_connection(conn)),
        }
    }

    /// The facade as a trait object.
    pub fn as_module(&self) -> &dyn Module {
        match self {
            Self::Solstis(m) => m,
            Self::Equinox(m) => m,
            Self::Sfg(m) => m,
            Self::Dfg(m) => m,
        }
    }
}
