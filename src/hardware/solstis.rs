//! SolsTiS Ti:sapphire seed laser.
//!
//! Covers the full SolsTiS catalogue: wavelength meter and table tuning,
//! etalon/cavity/resonator tuning and locks, beam alignment, TeraScan, fast
//! scans, ADC/DAC/GPIO access and housekeeping. `digital_pid_control` is only
//! reachable through [`Module::invoke`] since it is meant for complete EMM
//! systems and is rejected elsewhere.
//!
//! Operations that document a final report can be issued with
//! [`Module::invoke_reported`] or [`Module::invoke_and_wait`];
//! [`Solstis::tune_and_wait`] wraps the common case.

use super::types::{
    FastScanKind, LockStatus, StartStop, Switch, SystemVariable, TeraScanKind, TeraScanOutput,
    TeraScanSetup, TeraScanStatus,
};
use super::Module;
use crate::error::{IceBlocError, Result};
use crate::protocol::{Args, Connection, ModuleKind, Reply, TaskReport};
use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// SolsTiS facade.
pub struct Solstis {
    conn: Connection,
}

super::facade!(Solstis, ModuleKind::Solstis);

/// Wavelength meter tuning state from `poll_wave_m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaveTuningStatus {
    /// Tuning software not active.
    NotActive,
    /// No link to a wavelength meter, or none configured.
    NoWavemeter,
    /// Tuning in progress.
    Tuning,
    /// Wavelength is being maintained.
    Maintained,
    /// Undocumented code.
    Unknown(i64),
}

impl WaveTuningStatus {
    /// Map a `status` code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::NotActive,
            1 => Self::NoWavemeter,
            2 => Self::Tuning,
            3 => Self::Maintained,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for WaveTuningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotActive => f.write_str("tuning software not active"),
            Self::NoWavemeter => f.write_str("no wavemeter connected"),
            Self::Tuning => f.write_str("tuning in progress"),
            Self::Maintained => f.write_str("wavelength is being maintained"),
            Self::Unknown(code) => write!(f, "unknown tuning status {code}"),
        }
    }
}

/// Reply of `poll_wave_m`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavelengthPoll {
    /// Tuning state.
    pub status: WaveTuningStatus,
    /// Latest wavelength meter reading in nm, absent without a meter.
    pub current_wavelength_nm: Option<f64>,
    /// Wavelength is being maintained.
    pub maintained: bool,
    /// Current wavelength lies in an extended zone.
    pub extended_zone: bool,
}

impl WavelengthPoll {
    /// Decode a `poll_wave_m` reply.
    pub fn from_reply(reply: &Reply) -> Result<Self> {
        Ok(Self {
            status: WaveTuningStatus::from_code(reply.status()?),
            current_wavelength_nm: reply.opt_number("current_wavelength")?,
            maintained: reply.opt_integer("lock_status")? == Some(1),
            extended_zone: reply.opt_integer("extended_zone")? == Some(1),
        })
    }

    /// Fail with "no wavemeter connected" when there is no meter.
    pub fn require_wavemeter(self) -> Result<Self> {
        if self.status == WaveTuningStatus::NoWavemeter {
            return Err(IceBlocError::Device {
                op: "poll_wave_m".to_string(),
                message: WaveTuningStatus::NoWavemeter.to_string(),
            });
        }
        Ok(self)
    }

    /// Current wavelength, requiring a connected meter.
    pub fn wavelength(&self) -> Result<f64> {
        let poll = self.clone().require_wavemeter()?;
        poll.current_wavelength_nm.ok_or_else(|| {
            IceBlocError::Protocol("'poll_wave_m' reply lacks 'current_wavelength'".to_string())
        })
    }
}

/// Reply of `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolstisStatus {
    /// Current wavelength in nm.
    pub wavelength_nm: f64,
    /// Laser temperature in deg C.
    pub temperature_c: f64,
    /// Temperature control active.
    pub temperature_control: bool,
    /// Etalon lock state.
    pub etalon_lock: super::LockCondition,
    /// Etalon voltage.
    pub etalon_voltage: f64,
    /// Reference cavity lock state.
    pub cavity_lock: super::LockCondition,
    /// Resonator voltage.
    pub resonator_voltage: f64,
    /// ECD lock state, [`NotFitted`](super::LockCondition::NotFitted) without a doubler.
    pub ecd_lock: super::LockCondition,
    /// ECD voltage, absent without a doubler.
    pub ecd_voltage: Option<f64>,
    /// Output monitor voltage.
    pub output_monitor: f64,
    /// Etalon photodiode DC voltage.
    pub etalon_pd_dc: f64,
    /// Dither on.
    pub dither: bool,
}

impl SolstisStatus {
    /// Decode a `get_status` reply.
    ///
    /// # Errors
    /// [`IceBlocError::Device`] when `status` is 1.
    pub fn from_reply(reply: Reply) -> Result<Self> {
        let reply = reply.ensure_ok(|_| "operation failed")?;
        // "not fitted" arrives as text in place of a voltage
        let ecd_voltage = match reply.text("ecd_voltage") {
            Ok(_) => None,
            Err(_) => reply.opt_number("ecd_voltage")?,
        };
        Ok(Self {
            wavelength_nm: reply.number("wavelength")?,
            temperature_c: reply.number("temperature")?,
            temperature_control: reply.text("temperature_status")? == "on",
            etalon_lock: super::LockCondition::parse(reply.text("etalon_lock")?),
            etalon_voltage: reply.number("etalon_voltage")?,
            cavity_lock: super::LockCondition::parse(reply.text("cavity_lock")?),
            resonator_voltage: reply.number("resonator_voltage")?,
            ecd_lock: super::LockCondition::parse(reply.text("ecd_lock")?),
            ecd_voltage,
            output_monitor: reply.number("output_monitor")?,
            etalon_pd_dc: reply.number("etalon_pd_dc")?,
            dither: reply.text("dither")? == "on",
        })
    }
}

/// Reply of `get_wavelength_range`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WavelengthRange {
    /// Shortest reachable wavelength in nm.
    pub minimum_nm: f64,
    /// Longest reachable wavelength in nm.
    pub maximum_nm: f64,
    /// Extended zones as `(start_nm, stop_nm)`.
    pub extended_zones: Vec<(f64, f64)>,
}

impl WavelengthRange {
    /// Decode a `get_wavelength_range` reply.
    ///
    /// Zones are read from `start_zone_<n>`/`stop_zone_<n>`; a single zone may
    /// also come as plain `start_zone`/`stop_zone`.
    pub fn from_reply(reply: &Reply) -> Result<Self> {
        let count = reply.opt_integer("extended_zones")?.unwrap_or(0).max(0);
        let mut extended_zones = Vec::new();
        for n in 1..=count {
            let (start_key, stop_key) = if count == 1 && reply.contains("start_zone") {
                ("start_zone".to_string(), "stop_zone".to_string())
            } else {
                (format!("start_zone_{n}"), format!("stop_zone_{n}"))
            };
            extended_zones.push((reply.number(&start_key)?, reply.number(&stop_key)?));
        }
        Ok(Self {
            minimum_nm: reply.number("minimum_wavelength")?,
            maximum_nm: reply.number("maximum_wavelength")?,
            extended_zones,
        })
    }

    /// True when `wavelength_nm` is within the tunable range.
    pub fn contains(&self, wavelength_nm: f64) -> bool {
        (self.minimum_nm..=self.maximum_nm).contains(&wavelength_nm)
    }
}

/// Beam alignment mode for `beam_alignment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BeamAlignmentMode {
    /// Manual alignment.
    Manual,
    /// Continuous automatic alignment.
    Automatic,
    /// Stop and hold.
    Stop,
    /// One automatic pass.
    OneShot,
}

impl BeamAlignmentMode {
    fn code(self) -> i64 {
        match self {
            Self::Manual => 1,
            Self::Automatic => 2,
            Self::Stop => 3,
            Self::OneShot => 4,
        }
    }
}

/// DAC ramp direction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RampMode {
    /// Jump straight to the target.
    NoRamp,
    /// Ramp only when the target is above the current output.
    UpOnly,
    /// Ramp only when the target is below the current output.
    DownOnly,
    /// Always ramp.
    Always,
}

impl RampMode {
    fn code(self) -> i64 {
        match self {
            Self::NoRamp => 1,
            Self::UpOnly => 2,
            Self::DownOnly => 3,
            Self::Always => 4,
        }
    }
}

/// Arguments of `dac_ramping`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DacRamp {
    /// DAC channel, 0 to 31.
    pub dac_channel: i64,
    /// Start the ramp (`false` stops it, leaving the DAC where it is).
    pub start: bool,
    /// Direction policy.
    pub ramping_mode: RampMode,
    /// Use `step_size` as given instead of deriving it from `ramp_rate`.
    pub explicit_step: bool,
    /// Final output in user units.
    pub target_output: f64,
    /// Ramp rate in user units per second.
    pub ramp_rate: f64,
    /// Update interval in seconds.
    pub update_rate: f64,
    /// Step size in user units.
    pub step_size: f64,
}

impl DacRamp {
    fn args(&self) -> Args {
        Args::new()
            .with("dac_channel", self.dac_channel)
            .with("start_stop", if self.start { 1_i64 } else { 2 })
            .with("ramping_mode", self.ramping_mode.code())
            .with("step_mode", i64::from(self.explicit_step))
            .with("target_output", self.target_output)
            .with("ramp_rate", self.ramp_rate)
            .with("update_rate", self.update_rate)
            .with("step_size", self.step_size)
    }
}

/// One DAC axis of the 3-axis beam maximiser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaximiseAxis {
    /// DAC channel driving the axis.
    pub channel: i64,
    /// Include the axis in the search.
    pub enabled: bool,
    /// Start value.
    pub value: f64,
    /// Step size.
    pub step: f64,
    /// End value.
    pub end_value: f64,
}

/// Arguments of `beam_maximising_3_axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeamMaximiseSettings {
    /// Maximiser instance.
    pub instance: i64,
    /// Run mode code.
    pub run_mode: i64,
    /// Continuous mode code.
    pub cont_mode: i64,
    /// Number of runs.
    pub run_count: i64,
    /// Update interval.
    pub update_rate: f64,
    /// Power drop that triggers a new search.
    pub power_drop: f64,
    /// X axis.
    pub x: MaximiseAxis,
    /// Y axis.
    pub y: MaximiseAxis,
    /// Z axis.
    pub z: MaximiseAxis,
    /// ADC channel measuring the power.
    pub adc_channel: i64,
}

impl BeamMaximiseSettings {
    fn args(&self) -> Args {
        let mut args = Args::new()
            .with("instance", self.instance)
            .with("run_mode", self.run_mode)
            .with("cont_mode", self.cont_mode)
            .with("run_count", self.run_count)
            .with("update_rate", self.update_rate)
            .with("power_drop", self.power_drop)
            .with("adc_channel", self.adc_channel);
        for (axis, settings) in [("x", &self.x), ("y", &self.y), ("z", &self.z)] {
            args.set(format!("dac_{axis}_channel"), settings.channel);
            args.set(format!("dac_{axis}_enable"), i64::from(settings.enabled));
            args.set(format!("dac_{axis}_value"), settings.value);
            args.set(format!("dac_{axis}_step"), settings.step);
            args.set(format!("dac_{axis}_end_value"), settings.end_value);
        }
        args
    }
}

/// Arguments of `beam_alignment_configure`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeamAlignmentSettings {
    /// Alignment instance.
    pub instance: i64,
    /// X DAC channel.
    pub dac_x_channel: i64,
    /// Y DAC channel.
    pub dac_y_channel: i64,
    /// ADC channel measuring the power.
    pub adc_channel: i64,
    /// X step size.
    pub x_step_size: f64,
    /// Y step size.
    pub y_step_size: f64,
    /// X start value.
    pub x_value: f64,
    /// Y start value.
    pub y_value: f64,
    /// Update period.
    pub update_period: f64,
    /// Power drop that triggers realignment.
    pub max_power_drop: f64,
    /// Keep aligning continuously.
    pub continuous: bool,
    /// Number of runs.
    pub run_count: i64,
}

impl BeamAlignmentSettings {
    fn args(&self) -> Args {
        Args::new()
            .with("instance", self.instance)
            .with("dac_x_channel", self.dac_x_channel)
            .with("dac_y_channel", self.dac_y_channel)
            .with("adc_channel", self.adc_channel)
            .with("beam_x_step_size", self.x_step_size)
            .with("beam_y_step_size", self.y_step_size)
            .with("beam_x_value", self.x_value)
            .with("beam_y_value", self.y_value)
            .with("update_period", self.update_period)
            .with("max_power_drop", self.max_power_drop)
            .with("continuous_mode", i64::from(self.continuous))
            .with("run_count", self.run_count)
    }
}

/// Arguments of `set_time`, in the ICE Bloc's two digit year form.
fn clock_args(when: NaiveDateTime) -> Args {
    Args::new()
        .with("hour", i64::from(when.hour()))
        .with("minute", i64::from(when.minute()))
        .with("second", i64::from(when.second()))
        .with("day", i64::from(when.day()))
        .with("month", i64::from(when.month()))
        .with("year", i64::from(when.year().rem_euclid(100)))
}

fn setting(value: f64) -> Args {
    Args::new().with("setting", value)
}

fn operation(value: impl Into<crate::protocol::ParamValue>) -> Args {
    Args::new().with("operation", value)
}

fn scan(kind: impl Into<crate::protocol::ParamValue>) -> Args {
    Args::new().with("scan", kind)
}

impl Solstis {
    // ---- wavelength meter and table tuning ----

    /// Tune to `wavelength_nm` using the wavelength meter.
    pub async fn set_wave_m(&self, wavelength_nm: f64) -> Result<Reply> {
        self.invoke("set_wave_m", &Args::new().with("wavelength", wavelength_nm))
            .await
    }

    /// Tune to `wavelength_nm` and wait for the final report.
    pub async fn tune_and_wait(&self, wavelength_nm: f64, limit: Duration) -> Result<TaskReport> {
        info!(wavelength_nm, "Tuning SolsTiS");
        self.invoke_and_wait(
            "set_wave_m",
            &Args::new().with("wavelength", wavelength_nm),
            limit,
        )
        .await
    }

    /// Wavelength meter tuning status.
    pub async fn poll_wave_m(&self) -> Result<WavelengthPoll> {
        let reply = self.invoke("poll_wave_m", &Args::new()).await?;
        WavelengthPoll::from_reply(&reply)
    }

    /// Apply or remove the wavelength lock.
    pub async fn lock_wave_m(&self, op: Switch) -> Result<Reply> {
        self.invoke("lock_wave_m", &operation(op)).await
    }

    /// Stop wavelength meter tuning.
    pub async fn stop_wave_m(&self) -> Result<Reply> {
        self.invoke("stop_wave_m", &Args::new()).await
    }

    /// Tune to `wavelength_nm` using the wavelength table.
    pub async fn move_wave_t(&self, wavelength_nm: f64) -> Result<Reply> {
        self.invoke("move_wave_t", &Args::new().with("wavelength", wavelength_nm))
            .await
    }

    /// Table tuning status.
    pub async fn poll_move_wave_t(&self) -> Result<Reply> {
        self.invoke("poll_move_wave_t", &Args::new()).await
    }

    /// Stop table tuning.
    pub async fn stop_move_wave_t(&self) -> Result<Reply> {
        self.invoke("stop_move_wave_t", &Args::new()).await
    }

    // ---- tuners and locks ----

    /// Etalon tuning, percent.
    pub async fn tune_etalon(&self, percent: f64) -> Result<Reply> {
        self.invoke("tune_etalon", &setting(percent)).await
    }

    /// Reference cavity tuning, percent.
    pub async fn tune_cavity(&self, percent: f64) -> Result<Reply> {
        self.invoke("tune_cavity", &setting(percent)).await
    }

    /// Reference cavity fine tuning, percent.
    pub async fn fine_tune_cavity(&self, percent: f64) -> Result<Reply> {
        self.invoke("fine_tune_cavity", &setting(percent)).await
    }

    /// Resonator tuning, percent.
    pub async fn tune_resonator(&self, percent: f64) -> Result<Reply> {
        self.invoke("tune_resonator", &setting(percent)).await
    }

    /// Resonator fine tuning, percent.
    pub async fn fine_tune_resonator(&self, percent: f64) -> Result<Reply> {
        self.invoke("fine_tune_resonator", &setting(percent)).await
    }

    /// Switch the etalon lock.
    pub async fn etalon_lock(&self, op: Switch) -> Result<Reply> {
        self.invoke("etalon_lock", &operation(op)).await
    }

    /// Etalon lock condition.
    pub async fn etalon_lock_status(&self) -> Result<LockStatus> {
        LockStatus::from_reply(self.invoke("etalon_lock_status", &Args::new()).await?)
    }

    /// Switch the reference cavity lock.
    pub async fn cavity_lock(&self, op: Switch) -> Result<Reply> {
        self.invoke("cavity_lock", &operation(op)).await
    }

    /// Reference cavity lock condition.
    pub async fn cavity_lock_status(&self) -> Result<LockStatus> {
        LockStatus::from_reply(self.invoke("cavity_lock_status", &Args::new()).await?)
    }

    /// Switch the ECD lock.
    pub async fn ecd_lock(&self, op: Switch) -> Result<Reply> {
        self.invoke("ecd_lock", &operation(op)).await
    }

    /// ECD lock condition and voltage.
    pub async fn ecd_lock_status(&self) -> Result<LockStatus> {
        LockStatus::from_reply(self.invoke("ecd_lock_status", &Args::new()).await?)
    }

    /// Route `signal` to monitor output A.
    pub async fn monitor_a(&self, signal: i64) -> Result<Reply> {
        self.invoke("monitor_a", &Args::new().with("signal", signal))
            .await
    }

    /// Route `signal` to monitor output B.
    pub async fn monitor_b(&self, signal: i64) -> Result<Reply> {
        self.invoke("monitor_b", &Args::new().with("signal", signal))
            .await
    }

    /// Select the etalon profile.
    pub async fn select_profile(&self, profile: i64) -> Result<Reply> {
        self.invoke("select_profile", &Args::new().with("profile", profile))
            .await
    }

    /// Overall system status.
    pub async fn get_status(&self) -> Result<SolstisStatus> {
        SolstisStatus::from_reply(self.invoke("get_status", &Args::new()).await?)
    }

    // ---- beam alignment ----

    /// Beam alignment condition, position and quadrant.
    pub async fn get_alignment_status(&self) -> Result<Reply> {
        self.invoke("get_alignment_status", &Args::new()).await
    }

    /// Set the beam alignment mode.
    pub async fn beam_alignment(&self, mode: BeamAlignmentMode) -> Result<Reply> {
        self.invoke("beam_alignment", &Args::new().with("mode", mode.code()))
            .await
    }

    /// X alignment, percent (50 is centre).
    pub async fn beam_adjust_x(&self, percent: f64) -> Result<Reply> {
        self.invoke("beam_adjust_x", &Args::new().with("x_value", percent))
            .await
    }

    /// Y alignment, percent (50 is centre).
    pub async fn beam_adjust_y(&self, percent: f64) -> Result<Reply> {
        self.invoke("beam_adjust_y", &Args::new().with("y_value", percent))
            .await
    }

    /// Configure a beam alignment instance.
    pub async fn beam_alignment_configure(&self, settings: &BeamAlignmentSettings) -> Result<Reply> {
        self.invoke("beam_alignment_configure", &settings.args())
            .await
    }

    /// Run the 3-axis beam maximiser.
    pub async fn beam_maximising_3_axis(&self, settings: &BeamMaximiseSettings) -> Result<Reply> {
        self.invoke("beam_maximising_3_axis", &settings.args()).await
    }

    /// 3-axis beam maximiser status.
    pub async fn beam_maximising_3_axis_status(&self) -> Result<Reply> {
        self.invoke("beam_maximising_3_axis_status", &Args::new())
            .await
    }

    // ---- TeraScan ----

    /// Configure a TeraScan.
    pub async fn scan_stitch_initialise(&self, setup: &TeraScanSetup) -> Result<Reply> {
        let args = scan(setup.scan)
            .with("start", setup.start_nm)
            .with("stop", setup.stop_nm)
            .with("rate", setup.rate)
            .with("units", setup.units);
        self.invoke("scan_stitch_initialise", &args).await
    }

    /// Start or stop a TeraScan.
    pub async fn scan_stitch_op(&self, kind: TeraScanKind, op: StartStop) -> Result<Reply> {
        self.invoke("scan_stitch_op", &scan(kind).with("operation", op))
            .await
    }

    /// TeraScan progress.
    pub async fn scan_stitch_status(&self, kind: TeraScanKind) -> Result<TeraScanStatus> {
        let reply = self.invoke("scan_stitch_status", &scan(kind)).await?;
        TeraScanStatus::from_reply(&reply)
    }

    /// Switch `scan_stitch_wavelength` telemetry.
    pub async fn scan_stitch_output(&self, op: StartStop) -> Result<Reply> {
        self.invoke("scan_stitch_output", &operation(op)).await
    }

    /// Configure `automatic_output` telemetry.
    pub async fn terascan_output(&self, output: &TeraScanOutput) -> Result<Reply> {
        let args = operation(output.operation)
            .with("delay", output.delay)
            .with("update", output.update)
            .with("pause", output.pause);
        self.invoke("terascan_output", &args).await
    }

    /// Resume a TeraScan paused at a segment start.
    pub async fn terascan_continue(&self) -> Result<Reply> {
        self.invoke("terascan_continue", &Args::new()).await
    }

    // ---- fast scans ----

    /// Start a fast scan of `width` percent over `time_s` seconds.
    pub async fn fast_scan_start(&self, kind: FastScanKind, width: f64, time_s: f64) -> Result<Reply> {
        let args = scan(kind).with("width", width).with("time", time_s);
        self.invoke("fast_scan_start", &args).await
    }

    /// Fast scan status and tuner value.
    pub async fn fast_scan_poll(&self, kind: FastScanKind) -> Result<Reply> {
        self.invoke("fast_scan_poll", &scan(kind)).await
    }

    /// Stop a fast scan and return the tuner to its centre.
    pub async fn fast_scan_stop(&self, kind: FastScanKind) -> Result<Reply> {
        self.invoke("fast_scan_stop", &scan(kind)).await
    }

    /// Stop a fast scan, leaving the tuner where it is.
    pub async fn fast_scan_stop_nr(&self, kind: FastScanKind) -> Result<Reply> {
        self.invoke("fast_scan_stop_nr", &scan(kind)).await
    }

    // ---- PBA ----

    /// Start or stop the PBA reference.
    pub async fn pba_reference(&self, op: StartStop) -> Result<Reply> {
        self.invoke("pba_reference", &operation(op)).await
    }

    /// PBA reference status.
    pub async fn pba_reference_status(&self) -> Result<Reply> {
        self.invoke("pba_reference_status", &Args::new()).await
    }

    // ---- ranges, tolerances and locks ----

    /// Tunable range and extended zones.
    pub async fn get_wavelength_range(&self) -> Result<WavelengthRange> {
        let reply = self.invoke("get_wavelength_range", &Args::new()).await?;
        WavelengthRange::from_reply(&reply)
    }

    /// Tolerance at which `set_wave_m` reports.
    pub async fn set_wave_tolerance_m(&self, tolerance: f64) -> Result<Reply> {
        self.invoke("set_wave_tolerance_m", &Args::new().with("tolerance", tolerance))
            .await
    }

    /// Obsolete from firmware V60; acknowledged with status 0.
    pub async fn set_wave_lock_tolerance_m(&self, tolerance: f64) -> Result<Reply> {
        self.invoke(
            "set_wave_lock_tolerance_m",
            &Args::new().with("tolerance", tolerance),
        )
        .await
    }

    /// Maintain a fixed wavelength, `lock_wavelength_nm` defaults to the current one.
    pub async fn lock_wave_m_fixed(&self, op: Switch, lock_wavelength_nm: Option<f64>) -> Result<Reply> {
        let mut args = operation(op);
        if let Some(nm) = lock_wavelength_nm {
            args.set("lock_wavelength", nm);
        }
        self.invoke("lock_wave_m_fixed", &args).await
    }

    /// Maintain a fixed mid-IR wavelength.
    pub async fn lock_mir_wavelength(&self, op: Switch, lock_wavelength_nm: f64) -> Result<Reply> {
        self.invoke(
            "lock_mir_wavelength",
            &operation(op).with("lock_wavelength", lock_wavelength_nm),
        )
        .await
    }

    /// IR, green and MIR wavelengths.
    pub async fn get_mir_wavelength(&self) -> Result<Reply> {
        self.invoke("get_mir_wavelength", &Args::new()).await
    }

    /// Select the wavelength meter channel (0 for single channel meters).
    pub async fn set_w_meter_channel(&self, channel: i64, recovery: Option<i64>) -> Result<Reply> {
        let mut args = Args::new().with("channel", channel);
        if let Some(recovery) = recovery {
            args.set("recovery", recovery);
        }
        self.invoke("set_w_meter_channel", &args).await
    }

    /// Switch the etalon scan used while tuning.
    pub async fn set_etalon_tuning_scan(&self, op: Switch) -> Result<Reply> {
        self.invoke("set_etalon_tuning_scan", &operation(op)).await
    }

    /// Switch the slow PI wavelength update.
    pub async fn slow_wavelength_update(
        &self,
        op: Switch,
        p_const: f64,
        i_const: f64,
        interval_s: f64,
    ) -> Result<Reply> {
        let args = operation(op)
            .with("p_const", p_const)
            .with("i_const", i_const)
            .with("interval", interval_s);
        self.invoke("slow_wavelength_update", &args).await
    }

    /// Switch a system variable.
    pub async fn set_system_variable(&self, variable: SystemVariable, condition: Switch) -> Result<Reply> {
        let args = Args::new()
            .with("variable", variable)
            .with("condition", condition);
        self.invoke("set_system_variable", &args).await
    }

    // ---- I/O ----

    /// Every ADC channel (`channel_count`, then `channel_n`/`value_n`/`units_n`).
    pub async fn read_all_adc(&self) -> Result<Reply> {
        self.invoke("read_all_adc", &Args::new()).await
    }

    /// Digital PID loop status.
    pub async fn digital_pid_poll(&self) -> Result<Reply> {
        self.invoke("digital_pid_poll", &Args::new()).await
    }

    /// Drive GPIO `channel` high or low.
    pub async fn gpio_output(&self, channel: i64, high: bool) -> Result<Reply> {
        let args = Args::new()
            .with("channel", channel)
            .with("value", i64::from(high));
        self.invoke("gpio_output", &args).await
    }

    /// Ramp a DAC output.
    pub async fn dac_ramping(&self, ramp: &DacRamp) -> Result<Reply> {
        self.invoke("dac_ramping", &ramp.args()).await
    }

    /// Progress of a DAC ramp.
    pub async fn dac_ramping_poll(&self, dac_channel: i64) -> Result<Reply> {
        self.invoke("dac_ramping_poll", &Args::new().with("dac_channel", dac_channel))
            .await
    }

    /// Set digital potentiometer `channel` to `value` (0 to 255).
    pub async fn digital_pot_output(&self, channel: i64, value: i64) -> Result<Reply> {
        let args = Args::new().with("channel", channel).with("value", value);
        self.invoke("digital_pot_output", &args).await
    }

    /// Set DAC `channel` to `value`.
    pub async fn dac_output(&self, channel: i64, value: f64) -> Result<Reply> {
        let args = Args::new()
            .with("channel", channel)
            .with("output_value", value);
        self.invoke("dac_output", &args).await
    }

    /// Etalon, resonator, cavity and ECD tuner values, percent.
    pub async fn get_dac_tuning_values(&self) -> Result<Reply> {
        self.invoke("get_dac_tuning_values", &Args::new()).await
    }

    // ---- housekeeping ----

    /// Set the ICE Bloc clock.
    pub async fn set_time(&self, when: NaiveDateTime) -> Result<Reply> {
        self.invoke("set_time", &clock_args(when)).await
    }

    /// Set the ICE Bloc clock from the local clock.
    pub async fn sync_clock(&self) -> Result<Reply> {
        let now = Local::now().naive_local();
        info!(%now, "Setting SolsTiS clock");
        self.set_time(now).await
    }

    /// Wavelength table entry closest to `wavelength_nm`.
    pub async fn table_entry_info(&self, wavelength_nm: f64) -> Result<Reply> {
        self.invoke("table_entry_info", &Args::new().with("wavelength", wavelength_nm))
            .await
    }

    /// Hardware and software versions.
    pub async fn system_info(&self) -> Result<Reply> {
        self.invoke("system_info", &Args::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::registry::lookup;
    use crate::protocol::Parameters;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn reply(op: &str, value: Value) -> Reply {
        match value {
            Value::Object(map) => Reply::new(op, map),
            _ => Reply::new(op, Parameters::new()),
        }
    }

    #[test]
    fn no_wavemeter_is_reported() {
        let poll = WavelengthPoll::from_reply(&reply("poll_wave_m", json!({"status": [1]}))).unwrap();
        assert_eq!(poll.status, WaveTuningStatus::NoWavemeter);
        let err = poll.require_wavemeter().unwrap_err();
        assert!(err.to_string().contains("no wavemeter connected"));
    }

    #[test]
    fn maintained_wavelength_poll() {
        let poll = WavelengthPoll::from_reply(&reply(
            "poll_wave_m",
            json!({"status": [3], "current_wavelength": [780.2456], "lock_status": [1], "extended_zone": [0]}),
        ))
        .unwrap();
        assert!(poll.maintained);
        assert!(!poll.extended_zone);
        assert!((poll.wavelength().unwrap() - 780.2456).abs() < 1e-9);
    }

    #[test]
    fn status_with_ecd_not_fitted() {
        let status = SolstisStatus::from_reply(reply(
            "get_status",
            json!({
                "status": [0],
                "wavelength": [780.0],
                "temperature": [22.5],
                "temperature_status": "on",
                "etalon_lock": "on",
                "etalon_voltage": [1.2],
                "cavity_lock": "off",
                "resonator_voltage": [55.0],
                "ecd_lock": "not fitted",
                "ecd_voltage": "not fitted",
                "output_monitor": [3.1],
                "etalon_pd_dc": [0.4],
                "dither": "off"
            }),
        ))
        .unwrap();
        assert!(status.etalon_lock.is_locked());
        assert_eq!(status.ecd_lock, super::super::LockCondition::NotFitted);
        assert_eq!(status.ecd_voltage, None);
        assert!(status.temperature_control);
        assert!(!status.dither);
    }

    #[test]
    fn wavelength_range_zones() {
        let range = WavelengthRange::from_reply(&reply(
            "get_wavelength_range",
            json!({
                "minimum_wavelength": [696.0],
                "maximum_wavelength": [1000.0],
                "extended_zones": [2],
                "start_zone_1": [696.0], "stop_zone_1": [700.0],
                "start_zone_2": [990.0], "stop_zone_2": [1000.0]
            }),
        ))
        .unwrap();
        assert_eq!(range.extended_zones, vec![(696.0, 700.0), (990.0, 1000.0)]);
        assert!(range.contains(780.0));
        assert!(!range.contains(1100.0));

        let single = WavelengthRange::from_reply(&reply(
            "get_wavelength_range",
            json!({"minimum_wavelength": [700.0], "maximum_wavelength": [1000.0], "extended_zones": [1], "start_zone": [990.0], "stop_zone": [1000.0]}),
        ))
        .unwrap();
        assert_eq!(single.extended_zones, vec![(990.0, 1000.0)]);
    }

    #[test]
    fn settings_build_against_catalogue() {
        let axis = MaximiseAxis {
            channel: 1,
            enabled: true,
            value: 50.0,
            step: 0.5,
            end_value: 60.0,
        };
        let settings = BeamMaximiseSettings {
            instance: 1,
            run_mode: 2,
            cont_mode: 1,
            run_count: 3,
            update_rate: 1.0,
            power_drop: 5.0,
            x: axis,
            y: axis,
            z: MaximiseAxis { enabled: false, ..axis },
            adc_channel: 4,
        };
        let bag = lookup(ModuleKind::Solstis, "beam_maximising_3_axis")
            .unwrap()
            .build(&settings.args(), false)
            .unwrap()
            .unwrap();
        assert_eq!(bag["dac_z_enable"], json!([0]));
        assert_eq!(bag["dac_x_step"], json!([0.5]));

        let ramp = DacRamp {
            dac_channel: 2,
            start: true,
            ramping_mode: RampMode::Always,
            explicit_step: false,
            target_output: 1.5,
            ramp_rate: 0.1,
            update_rate: 0.01,
            step_size: 0.001,
        };
        let bag = lookup(ModuleKind::Solstis, "dac_ramping")
            .unwrap()
            .build(&ramp.args(), false)
            .unwrap()
            .unwrap();
        assert_eq!(bag["start_stop"], json!([1]));
        assert_eq!(bag["ramping_mode"], json!([4]));

        let alignment = BeamAlignmentSettings {
            instance: 1,
            dac_x_channel: 0,
            dac_y_channel: 1,
            adc_channel: 2,
            x_step_size: 0.1,
            y_step_size: 0.1,
            x_value: 50.0,
            y_value: 50.0,
            update_period: 1.0,
            max_power_drop: 2.0,
            continuous: true,
            run_count: 0,
        };
        assert!(lookup(ModuleKind::Solstis, "beam_alignment_configure")
            .unwrap()
            .build(&alignment.args(), false)
            .is_ok());
    }

    #[test]
    fn clock_uses_two_digit_year() {
        let when = NaiveDate::from_ymd_opt(2026, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 30))
            .unwrap();
        let bag = lookup(ModuleKind::Solstis, "set_time")
            .unwrap()
            .build(&clock_args(when), false)
            .unwrap()
            .unwrap();
        assert_eq!(bag["year"], json!([26]));
        assert_eq!(bag["hour"], json!([14]));
        assert_eq!(bag["day"], json!([9]));
    }
}
