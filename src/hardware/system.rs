//! Every configured module of one laser system.

use super::{AnyModule, Dfg, Equinox, Module, Sfg, Solstis};
use crate::config::MsquaredConfig;
use crate::error::{IceBlocError, Result};
use crate::protocol::{Connection, ModuleKind};
use std::collections::BTreeMap;
use tokio::task::JoinSet;
use tracing::{info, instrument};

/// The enabled modules of a system, each on its own connection.
pub struct LaserSystem {
    client_ip: String,
    modules: BTreeMap<ModuleKind, AnyModule>,
}

impl LaserSystem {
    /// Open a connection to every module enabled in `config`.
    ///
    /// Modules are connected concurrently. The first failure is returned and
    /// the other attempts are abandoned.
    #[instrument(skip(config))]
    pub async fn connect(config: &MsquaredConfig) -> Result<Self> {
        let options = config.protocol.call_options();
        let mut attempts = JoinSet::new();
        for kind in config.modules.enabled() {
            let (host, port) = config.modules.get(kind).address(kind);
            let options = options.clone();
            attempts.spawn(async move { (kind, Connection::open(&host, port, options).await) });
        }

        let mut modules = BTreeMap::new();
        while let Some(joined) = attempts.join_next().await {
            let (kind, conn) = joined.map_err(|e| {
                IceBlocError::connection("laser system", format!("connect task failed: {e}"))
            })?;
            let conn = conn?;
            info!(module = %kind, peer = %conn.peer(), "Module connected");
            modules.insert(kind, AnyModule::from_connection(kind, conn));
        }

        Ok(Self {
            client_ip: config.application.client_ip.clone(),
            modules,
        })
    }

    /// Run the `start_link` handshake on every module.
    pub async fn start_link_all(&self) -> Result<()> {
        for module in self.modules.values() {
            module.as_module().start_link(&self.client_ip).await?;
        }
        Ok(())
    }

    /// Connected module kinds, in system order.
    pub fn kinds(&self) -> Vec<ModuleKind> {
        self.modules.keys().copied().collect()
    }

    /// Module `kind` as a trait object.
    pub fn module(&self, kind: ModuleKind) -> Option<&dyn Module> {
        self.modules.get(&kind).map(AnyModule::as_module)
    }

    /// The seed laser, if enabled.
    pub fn solstis(&self) -> Option<&Solstis> {
        match self.modules.get(&ModuleKind::Solstis) {
            Some(AnyModule::Solstis(m)) => Some(m),
            _ => None,
        }
    }

    /// The pump laser, if enabled.
    pub fn equinox(&self) -> Option<&Equinox> {
        match self.modules.get(&ModuleKind::Equinox) {
            Some(AnyModule::Equinox(m)) => Some(m),
            _ => None,
        }
    }

    /// The SFG stage, if enabled.
    pub fn sfg(&self) -> Option<&Sfg> {
        match self.modules.get(&ModuleKind::Sfg) {
            Some(AnyModule::Sfg(m)) => Some(m),
            _ => None,
        }
    }

    /// The DFG stage, if enabled.
    pub fn dfg(&self) -> Option<&Dfg> {
        match self.modules.get(&ModuleKind::Dfg) {
            Some(AnyModule::Dfg(m)) => Some(m),
            _ => None,
        }
    }

    /// Close every module connection.
    pub async fn close(&self) {
        for module in self.modules.values() {
            module.as_module().close().await;
        }
    }
}
