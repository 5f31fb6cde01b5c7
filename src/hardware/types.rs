//! Argument enums, settings and typed replies shared by several facades.

use crate::error::{IceBlocError, Result};
use crate::protocol::{ParamValue, Reply};
use serde::Serialize;
use std::fmt;

/// Enum whose variants map one to one onto wire words.
macro_rules! wire_words {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $word:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Wire word.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $word),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for ParamValue {
            fn from(value: $name) -> Self {
                ParamValue::Text(value.as_str().to_string())
            }
        }
    };
}

wire_words! {
    /// Two-state `operation`/`condition` argument.
    Switch {
        /// Enable.
        On => "on",
        /// Disable.
        Off => "off",
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

wire_words! {
    /// Start/stop `operation` or `action` argument.
    StartStop {
        /// Begin the task.
        Start => "start",
        /// End the task.
        Stop => "stop",
    }
}

wire_words! {
    /// TeraScan type.
    ///
    /// The SolsTiS accepts `medium`, `fine` and `line` (`coarse` is documented
    /// but unavailable). The SFG stage accepts `medium`, `fine`, `ir_medium` and
    /// `ir_fine`.
    TeraScanKind {
        /// BRF only.
        Coarse => "coarse",
        /// BRF and etalon.
        Medium => "medium",
        /// BRF, etalon and resonator.
        Fine => "fine",
        /// Line narrow scan: BRF, etalon and cavity.
        Line => "line",
        /// BRF and etalon, infrared range.
        IrMedium => "ir_medium",
        /// BRF, etalon and resonator, infrared range.
        IrFine => "ir_fine",
    }
}

wire_words! {
    /// TeraScan rate units.
    ScanRateUnits {
        /// Medium, fine and line scans.
        GhzPerSecond => "GHz/s",
        /// Fine and line scans.
        MhzPerSecond => "MHz/s",
        /// Line scans only.
        KhzPerSecond => "kHz/s",
    }
}

impl ScanRateUnits {
    /// Unit word used by the conversion stages, which omit the `/s`.
    pub fn stage_word(self) -> &'static str {
        match self {
            Self::GhzPerSecond => "GHz",
            Self::MhzPerSecond => "MHz",
            Self::KhzPerSecond => "kHz",
        }
    }
}

wire_words! {
    /// Fast scan type.
    FastScanKind {
        /// Etalon, continuous.
        EtalonContinuous => "etalon_continuous",
        /// Etalon, single sweep.
        EtalonSingle => "etalon_single",
        /// Reference cavity, continuous.
        CavityContinuous => "cavity_continuous",
        /// Reference cavity, single sweep.
        CavitySingle => "cavity_single",
        /// Resonator, continuous.
        ResonatorContinuous => "resonator_continuous",
        /// Resonator, single sweep.
        ResonatorSingle => "resonator_single",
        /// ECD, continuous.
        EcdContinuous => "ecd_continuous",
        /// Reference cavity fringe test.
        FringeTest => "fringe_test",
        /// Resonator ramp.
        ResonatorRamp => "resonator_ramp",
        /// ECD ramp.
        EcdRamp => "ecd_ramp",
        /// Reference cavity, triangular.
        CavityTriangular => "cavity_triangular",
        /// Resonator, triangular.
        ResonatorTriangular => "resonator_triangular",
    }
}

impl FastScanKind {
    /// Largest scan width (percent) the tuner of this scan accepts.
    pub fn max_width(self) -> f64 {
        match self {
            Self::EtalonContinuous | Self::EtalonSingle => 250.0,
            Self::CavityContinuous
            | Self::CavitySingle
            | Self::FringeTest
            | Self::CavityTriangular => 130.0,
            Self::ResonatorContinuous
            | Self::ResonatorSingle
            | Self::ResonatorRamp
            | Self::ResonatorTriangular => 30.0,
            Self::EcdContinuous | Self::EcdRamp => 100.0,
        }
    }
}

wire_words! {
    /// Output beam of a conversion stage.
    Beam {
        /// Visible output.
        Visible => "visible",
        /// Infrared output.
        Infrared => "infrared",
    }
}

wire_words! {
    /// SolsTiS system variable for `set_system_variable`.
    SystemVariable {
        /// Wavelength maintenance.
        MaintainWavelength => "maintain_wavelength",
        /// ECD maintenance.
        MaintainEcd => "maintain_ecd",
    }
}

wire_words! {
    /// Equinox `laser_control` operation.
    EquinoxOperation {
        /// Begin warm up.
        WarmUp => "warm_up",
        /// Begin cool down.
        CoolDown => "cool_down",
        /// Start emission.
        Start => "start",
        /// Stop emission.
        Stop => "stop",
    }
}

wire_words! {
    /// DFG pump shutter action.
    ShutterAction {
        /// Open the shutter.
        Open => "open",
        /// Close the shutter.
        Close => "close",
    }
}

/// TeraScan configuration for `scan_stitch_initialise`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TeraScanSetup {
    /// Scan type.
    pub scan: TeraScanKind,
    /// Start wavelength in nm.
    pub start_nm: f64,
    /// Stop wavelength in nm.
    pub stop_nm: f64,
    /// Scan rate, one of the documented steps for the scan type.
    pub rate: f64,
    /// Unit of `rate`.
    pub units: ScanRateUnits,
}

/// Automatic output configuration for `terascan_output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeraScanOutput {
    /// Start or stop generating `automatic_output` frames.
    pub operation: StartStop,
    /// Delay between the start frame and scanning.
    pub delay: i64,
    /// Output points per segment (0 for none).
    pub update: i64,
    /// Pause at the start of every segment until `terascan_continue`.
    pub pause: Switch,
}

/// Lock state reported for the etalon, reference cavity, ECD and UV locks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LockCondition {
    /// Lock off.
    Off,
    /// Lock on.
    On,
    /// Debug condition.
    Debug,
    /// Lock in error.
    Error,
    /// Search algorithm active.
    Search,
    /// Off due to low output.
    Low,
    /// Lock hardware absent.
    NotFitted,
    /// Word this client does not know.
    Other(String),
}

impl LockCondition {
    /// Parse a lock condition word.
    pub fn parse(word: &str) -> Self {
        match word {
            "off" => Self::Off,
            "on" => Self::On,
            "debug" => Self::Debug,
            "error" => Self::Error,
            "search" => Self::Search,
            "low" => Self::Low,
            "not fitted" | "not_fitted" => Self::NotFitted,
            other => Self::Other(other.to_string()),
        }
    }

    /// True only for [`LockCondition::On`].
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for LockCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Off => "the lock is off",
            Self::On => "the lock is on",
            Self::Debug => "the lock is in a debug condition",
            Self::Error => "the lock is in error",
            Self::Search => "the lock search algorithm is active",
            Self::Low => "the lock is off due to low output",
            Self::NotFitted => "not fitted",
            Self::Other(word) => word.as_str(),
        };
        f.write_str(text)
    }
}

/// Reply of the `*_lock_status` operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockStatus {
    /// Lock state.
    pub condition: LockCondition,
    /// Lock voltage, reported by the ECD lock only.
    pub voltage: Option<f64>,
}

impl LockStatus {
    /// Decode a lock status reply.
    ///
    /// # Errors
    /// [`IceBlocError::Device`] when `status` is 1, [`IceBlocError::Protocol`]
    /// for a malformed reply.
    pub fn from_reply(reply: Reply) -> Result<Self> {
        let reply = reply.ensure_ok(|_| "operation failed")?;
        Ok(Self {
            condition: LockCondition::parse(reply.text("condition")?),
            voltage: reply.opt_number("voltage")?,
        })
    }
}

/// TeraScan progress, as reported by `scan_stitch_status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TeraScanStatus {
    /// No scan running.
    Idle,
    /// Scan in progress.
    Active {
        /// Current wavelength in nm.
        current_nm: f64,
        /// Start wavelength in nm.
        start_nm: f64,
        /// Stop wavelength in nm.
        stop_nm: f64,
        /// True while scanning, false while tuning to the next segment.
        scanning: bool,
    },
    /// TeraScan is not licensed on this module.
    Unavailable,
}

impl TeraScanStatus {
    /// Decode a `scan_stitch_status` reply.
    pub fn from_reply(reply: &Reply) -> Result<Self> {
        match reply.status()? {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Active {
                current_nm: reply.number("current")?,
                start_nm: reply.number("start")?,
                stop_nm: reply.number("stop")?,
                scanning: reply.opt_integer("operation")? == Some(1),
            }),
            2 => Ok(Self::Unavailable),
            other => Err(IceBlocError::Protocol(format!(
                "scan_stitch_status: unknown status {other}"
            ))),
        }
    }
}

/// Reply of the conversion stages' `status` operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionStatus {
    /// Current wavelength in nm.
    pub wavelength_nm: f64,
    /// Wavelength tuning in progress.
    pub tuning: bool,
    /// Output beam monitor.
    pub output_beam: Option<f64>,
    /// Pump beam monitor.
    pub pump_beam: Option<f64>,
    /// SolsTiS monitor.
    pub solstis_monitor: Option<f64>,
    /// Pump emission word (`off`, `delay`, `ramping`, `on`, `not_available`).
    pub emission: Option<String>,
    /// Pump shutter word (`closed`, `open`, `not_available`).
    pub shutter: Option<String>,
    /// UV lock state.
    pub uv_lock: Option<LockCondition>,
    /// PPLN oven word (`active`, `optimising`, `stopping`, `disabled`, `starting`).
    pub oven_status: Option<String>,
    /// Fitted oven number.
    pub fitted_oven: Option<i64>,
    /// Automatic PBA running.
    pub pba_on: Option<bool>,
    /// PBA reference word (`inactive`, `auto`, `manual`).
    pub pba_reference: Option<String>,
}

impl ConversionStatus {
    /// Decode a `status` reply. Only `wavelength` and `tuning` are mandatory.
    pub fn from_reply(reply: &Reply) -> Result<Self> {
        let word = |key: &str| -> Result<Option<String>> {
            if reply.contains(key) {
                Ok(Some(reply.text(key)?.to_string()))
            } else {
                Ok(None)
            }
        };
        Ok(Self {
            wavelength_nm: reply.number("wavelength")?,
            tuning: reply.text("tuning")? == "active",
            output_beam: reply.opt_number("output_beam")?,
            pump_beam: reply.opt_number("pump_beam")?,
            solstis_monitor: reply.opt_number("solstis_monitor")?,
            emission: word("emission")?,
            shutter: word("shutter")?,
            uv_lock: word("uv_lock")?.map(|w| LockCondition::parse(&w)),
            oven_status: word("oven_status")?,
            fitted_oven: reply.opt_integer("fitted_oven")?,
            pba_on: word("pba_status")?.map(|w| w == "on"),
            pba_reference: word("pba_reference")?,
        })
    }
}
