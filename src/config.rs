//! Configuration loading using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (factory addresses of every module)
//! 2. `config/msquared.toml`, or the file given on the command line
//! 3. Environment variables prefixed with `MSQUARED_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use msquared_daq::config::MsquaredConfig;
//!
//! # fn main() -> msquared_daq::error::Result<()> {
//! let config = MsquaredConfig::load()?;
//! config.validate()?;
//! println!("SolsTiS at {:?}", config.modules.solstis.address(msquared_daq::protocol::ModuleKind::Solstis));
//! # Ok(())
//! # }
//! ```
//!
//! `MSQUARED_MODULES__SOLSTIS__HOST=10.0.0.5` overrides a single field.

use crate::error::{IceBlocError, Result};
use crate::protocol::dispatcher::{BusyPolicy, CallOptions, IdStrategy};
use crate::protocol::notification::default_push_ops;
use crate::protocol::registry::ModuleKind;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/msquared.toml";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "MSQUARED_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MsquaredConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Protocol engine tunables
    pub protocol: ProtocolConfig,
    /// Module addresses
    pub modules: ModulesConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address of this computer, registered with each module by `start_link`
    pub client_ip: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "M Squared ICE Bloc client".to_string(),
            log_level: "info".to_string(),
            client_ip: "192.168.1.108".to_string(),
        }
    }
}

/// Protocol engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Reply timeout in milliseconds (0 = wait forever)
    pub read_timeout_ms: u64,
    /// Receive ceiling in bytes
    pub max_frame_bytes: usize,
    /// `reject` or `wait` when a call is already outstanding
    pub busy_policy: BusyPolicy,
    /// `catalogue` or `sequential` transmission ids
    pub id_strategy: IdStrategy,
    /// Fail on replies that do not match the request id/op
    pub verify_correlation: bool,
    /// How long to watch for late replies after a timeout, in milliseconds
    pub stale_reply_window_ms: u64,
    /// Retries after a timeout
    pub retries: u32,
    /// Pause between retries in milliseconds
    pub retry_backoff_ms: u64,
    /// Notification broadcast capacity
    pub notification_capacity: usize,
    /// Op names treated as push telemetry
    pub push_ops: Vec<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::from(&CallOptions::default())
    }
}

impl From<&CallOptions> for ProtocolConfig {
    fn from(options: &CallOptions) -> Self {
        Self {
            connect_timeout_ms: millis(options.connect_timeout),
            read_timeout_ms: options.read_timeout.map_or(0, millis),
            max_frame_bytes: options.max_frame_bytes,
            busy_policy: options.busy_policy,
            id_strategy: options.id_strategy,
            verify_correlation: options.verify_correlation,
            stale_reply_window_ms: millis(options.stale_reply_window),
            retries: options.retries,
            retry_backoff_ms: millis(options.retry_backoff),
            notification_capacity: options.notification_capacity,
            push_ops: options.push_ops.clone(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ProtocolConfig {
    /// Options for [`Connection::open`](crate::protocol::Connection::open).
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: (self.read_timeout_ms > 0)
                .then(|| Duration::from_millis(self.read_timeout_ms)),
            max_frame_bytes: self.max_frame_bytes,
            busy_policy: self.busy_policy,
            id_strategy: self.id_strategy,
            verify_correlation: self.verify_correlation,
            stale_reply_window: Duration::from_millis(self.stale_reply_window_ms),
            retries: self.retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            notification_capacity: self.notification_capacity,
            push_ops: if self.push_ops.is_empty() {
                default_push_ops()
            } else {
                self.push_ops.clone()
            },
        }
    }
}

/// Per-module settings. Unset host/port fall back to the factory address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    /// Host name or IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// TCP port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Whether the system connects to this module
    pub enabled: bool,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            enabled: true,
        }
    }
}

impl ModuleSettings {
    /// Effective `(host, port)` for a module of `kind`.
    pub fn address(&self, kind: ModuleKind) -> (String, u16) {
        let (host, port) = kind.default_endpoint();
        (
            self.host.clone().unwrap_or_else(|| host.to_string()),
            self.port.unwrap_or(port),
        )
    }
}

/// Settings of all four modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModulesConfig {
    /// SolsTiS seed laser
    pub solstis: ModuleSettings,
    /// Equinox pump laser
    pub equinox: ModuleSettings,
    /// SFG stage
    pub sfg: ModuleSettings,
    /// DFG stage
    pub dfg: ModuleSettings,
}

impl ModulesConfig {
    /// Settings of `kind`.
    pub fn get(&self, kind: ModuleKind) -> &ModuleSettings {
        match kind {
            ModuleKind::Solstis => &self.solstis,
            ModuleKind::Equinox => &self.equinox,
            ModuleKind::Sfg => &self.sfg,
            ModuleKind::Dfg => &self.dfg,
        }
    }

    /// Mutable settings of `kind`.
    pub fn get_mut(&mut self, kind: ModuleKind) -> &mut ModuleSettings {
        match kind {
            ModuleKind::Solstis => &mut self.solstis,
            ModuleKind::Equinox => &mut self.equinox,
            ModuleKind::Sfg => &mut self.sfg,
            ModuleKind::Dfg => &mut self.dfg,
        }
    }

    /// Enabled modules in system order.
    pub fn enabled(&self) -> Vec<ModuleKind> {
        ModuleKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).enabled)
            .collect()
    }
}

impl MsquaredConfig {
    /// Load from `config/msquared.toml` and environment variables
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path plus environment variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider, exposed for callers that merge further sources.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(IceBlocError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.application.client_ip.parse::<IpAddr>().is_err() {
            return invalid(format!(
                "Invalid client_ip '{}'",
                self.application.client_ip
            ));
        }

        if self.protocol.max_frame_bytes == 0 {
            return invalid("max_frame_bytes must be greater than 0".to_string());
        }

        if self.protocol.notification_capacity == 0 {
            return invalid("notification_capacity must be greater than 0".to_string());
        }

        for kind in self.modules.enabled() {
            let (host, port) = self.modules.get(kind).address(kind);
            if host.trim().is_empty() {
                return invalid(format!("modules.{kind}.host must not be empty"));
            }
            if port == 0 {
                return invalid(format!("modules.{kind}.port must not be 0"));
            }
        }

        Ok(())
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| IceBlocError::Configuration(format!("cannot render config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid_and_match_factory_addresses() {
        let config = MsquaredConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.modules.solstis.address(ModuleKind::Solstis),
            ("192.168.1.222".to_string(), 39902)
        );
        assert_eq!(
            config.modules.dfg.address(ModuleKind::Dfg),
            ("192.168.1.221".to_string(), 29922)
        );
        assert_eq!(config.modules.enabled().len(), 4);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"

[protocol]
read_timeout_ms = 1500
busy_policy = "wait"

[modules.sfg]
enabled = false

[modules.solstis]
host = "10.0.0.5"
"#
        )
        .unwrap();

        let config = MsquaredConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.client_ip, "192.168.1.108");
        assert_eq!(config.protocol.busy_policy, BusyPolicy::Wait);
        assert_eq!(
            config.modules.solstis.address(ModuleKind::Solstis),
            ("10.0.0.5".to_string(), 39902)
        );
        assert!(!config.modules.sfg.enabled);
        assert_eq!(
            config.modules.enabled(),
            vec![ModuleKind::Solstis, ModuleKind::Equinox, ModuleKind::Dfg]
        );

        let options = config.protocol.call_options();
        assert_eq!(options.read_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn zero_read_timeout_means_wait_forever() {
        let protocol = ProtocolConfig {
            read_timeout_ms: 0,
            ..ProtocolConfig::default()
        };
        assert_eq!(protocol.call_options().read_timeout, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = MsquaredConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = MsquaredConfig::default();
        config.application.client_ip = "not-an-ip".to_string();
        assert!(config.validate().is_err());

        let mut config = MsquaredConfig::default();
        config.modules.equinox.port = Some(0);
        assert!(config.validate().is_err());

        // A disabled module is not checked
        config.modules.equinox.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[protocol]\nretries = \"many\"").unwrap();
        assert!(matches!(
            MsquaredConfig::load_from(file.path()),
            Err(IceBlocError::Config(_))
        ));
    }

    #[test]
    fn renders_back_to_toml() {
        let text = MsquaredConfig::default().to_toml().unwrap();
        assert!(text.contains("[modules.solstis]"));
        assert!(text.contains("busy_policy = \"reject\""));
    }
}
