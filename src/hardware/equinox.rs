//! Equinox pump laser.

use super::types::EquinoxOperation;
use super::Module;
use crate::error::Result;
use crate::protocol::{Args, Connection, ModuleKind, Reply};
use serde::Serialize;

/// Equinox facade.
pub struct Equinox {
    conn: Connection,
}

super::facade!(Equinox, ModuleKind::Equinox);

/// Reply of `laser_status`.
///
/// Diagnostic channels (photodiodes, temperatures, TC4) are left in the raw
/// reply; use [`Equinox::laser_status_raw`] for those.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpStatus {
    /// `off`, `delay`, `ramping`, `standby` or `on`.
    pub emission: String,
    /// Interlock closed (not latched open).
    pub interlock_closed: bool,
    /// `closed`, `open`, `part_open` or `fault`.
    pub shutter: String,
    /// Set power in watts.
    pub set_power_w: f64,
    /// `none`, `warm_up`, `cool_down`, `start` or `stop`.
    pub current_operation: String,
    /// Seconds left for warm up or cool down.
    pub time_remaining_s: Option<f64>,
    /// Warm up complete.
    pub warmed_up: bool,
    /// `none` or the active fault.
    pub fault: String,
    /// Diode current in amps.
    pub diode_current_a: Option<f64>,
    /// External diode driver in use.
    pub external_diode: Option<bool>,
    /// Waveplate motor code (2 is referenced).
    pub waveplate_status: Option<i64>,
}

impl PumpStatus {
    /// Decode a `laser_status` reply.
    pub fn from_reply(reply: &Reply) -> Result<Self> {
        Ok(Self {
            emission: reply.text("emission_status")?.to_string(),
            interlock_closed: reply.text("interlock_status")? == "closed",
            shutter: reply.text("shutter_status")?.to_string(),
            set_power_w: reply.number("set_power")?,
            current_operation: reply.text("current_operation")?.to_string(),
            time_remaining_s: reply.opt_number("time_remaining")?,
            warmed_up: reply.text("warm_up_complete")? == "yes",
            fault: reply.text("fault_condition")?.to_string(),
            diode_current_a: reply.opt_number("diode_current")?,
            external_diode: reply.opt_integer("diode_isExternal")?.map(|v| v == 1),
            waveplate_status: reply.opt_integer("waveplate_status")?,
        })
    }

    /// Emitting at set power.
    pub fn is_emitting(&self) -> bool {
        self.emission == "on"
    }

    /// No fault is latched.
    pub fn is_fault_free(&self) -> bool {
        self.fault == "none"
    }
}

/// `laser_control` status codes.
fn describe_control(code: i64) -> &'static str {
    match code {
        1 => "operation in progress",
        2 => "laser already in requested state",
        3 => "laser not warmed up",
        4 => "waveplate motor not referenced or emission active",
        5 => "interlock open",
        6 => "shutter open",
        7 => "external diode driver not accessible",
        _ => "command failed",
    }
}

fn describe_power(code: i64) -> &'static str {
    match code {
        1 => "power out of range",
        2 => "laser not fully on",
        3 => "shutter not open",
        _ => "command failed",
    }
}

impl Equinox {
    /// Warm up, cool down, start or stop the laser.
    ///
    /// Completion is observed by polling [`laser_status`](Self::laser_status).
    pub async fn laser_control(&self, op: EquinoxOperation) -> Result<Reply> {
        self.invoke("laser_control", &Args::new().with("operation", op))
            .await?
            .ensure_ok(describe_control)
    }

    /// Set output power in watts. The laser must be on with the shutter open.
    pub async fn set_power(&self, watts: f64) -> Result<Reply> {
        self.invoke("set_power", &Args::new().with("power", watts))
            .await?
            .ensure_ok(describe_power)
    }

    /// Reset the interlock latch.
    pub async fn interlock_reset(&self) -> Result<Reply> {
        self.invoke("interlock_reset", &Args::new()).await
    }

    /// Laser status.
    pub async fn laser_status(&self) -> Result<PumpStatus> {
        PumpStatus::from_reply(&self.laser_status_raw().await?)
    }

    /// Laser status with every diagnostic field.
    pub async fn laser_status_raw(&self) -> Result<Reply> {
        self.invoke("laser_status", &Args::new()).await
    }

    /// Initialise and reference the waveplate motor (needed before start).
    pub async fn waveplate_prepare(&self) -> Result<Reply> {
        self.invoke("waveplate_prepare", &Args::new()).await
    }
}
