//! Static operation catalogue for every ICE Bloc module type.
//!
//! Each module exposes a closed, numbered table of operations with a fixed
//! parameter schema. The tables below are the single source of truth for
//! operation ids and parameter names: facades and the generic
//! [`Module::invoke`](crate::hardware::Module::invoke) entry point both build
//! their requests through [`OperationSpec::build`], which validates the
//! argument bag before anything is sent.

use crate::error::{IceBlocError, Result};
use crate::protocol::codec::{unwrap_scalar, ParamValue, Parameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Id of the shared `start_link` handshake.
pub const START_LINK_ID: u32 = 900;
/// Id of the shared `ping` operation.
pub const PING_ID: u32 = 901;

/// The four ICE Bloc module types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// SolsTiS Ti:sapphire seed laser.
    Solstis,
    /// Equinox pump laser.
    Equinox,
    /// Sum frequency generation stage (EMM).
    Sfg,
    /// Difference frequency generation stage.
    Dfg,
}

impl ModuleKind {
    /// Every module kind, in system order.
    pub const ALL: [ModuleKind; 4] = [Self::Solstis, Self::Equinox, Self::Sfg, Self::Dfg];

    /// Lowercase name used in config and on the command line.
    pub fn label(self) -> &'static str {
        match self {
            Self::Solstis => "solstis",
            Self::Equinox => "equinox",
            Self::Sfg => "sfg",
            Self::Dfg => "dfg",
        }
    }

    /// Factory default address of this module.
    pub fn default_endpoint(self) -> (&'static str, u16) {
        match self {
            Self::Solstis => ("192.168.1.222", 39902),
            Self::Equinox => ("192.168.1.225", 49946),
            Self::Sfg => ("192.168.1.221", 39902),
            Self::Dfg => ("192.168.1.221", 29922),
        }
    }

    /// Module specific operations (the shared ones are in [`COMMON`]).
    pub fn catalogue(self) -> &'static [OperationSpec] {
        match self {
            Self::Solstis => SOLSTIS,
            Self::Equinox => EQUINOX,
            Self::Sfg => SFG,
            Self::Dfg => DFG,
        }
    }

    /// Shared and module specific operations together.
    pub fn operations(self) -> impl Iterator<Item = &'static OperationSpec> {
        COMMON.iter().chain(self.catalogue())
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModuleKind {
    type Err = IceBlocError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "solstis" => Ok(Self::Solstis),
            "equinox" => Ok(Self::Equinox),
            "sfg" => Ok(Self::Sfg),
            "dfg" => Ok(Self::Dfg),
            other => Err(IceBlocError::Configuration(format!(
                "unknown module '{other}', expected solstis, equinox, sfg or dfg"
            ))),
        }
    }
}

/// Value type of one request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Floating point quantity, wire-wrapped as `[x]`.
    Number,
    /// Integral quantity, wire-wrapped as `[n]`.
    Integer,
    /// Bare string.
    Text,
}

/// Schema of one request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    /// Wire name.
    pub name: &'static str,
    /// Accepted value type.
    pub kind: ParamKind,
    /// Whether the operation refuses to run without it.
    pub required: bool,
}

impl ParamSpec {
    const fn number(name: &'static str) -> Self {
        Self { name, kind: ParamKind::Number, required: true }
    }

    const fn integer(name: &'static str) -> Self {
        Self { name, kind: ParamKind::Integer, required: true }
    }

    const fn text(name: &'static str) -> Self {
        Self { name, kind: ParamKind::Text, required: true }
    }

    const fn optional(self) -> Self {
        Self { required: false, ..self }
    }
}

/// One catalogued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationSpec {
    /// Operation id sent as `transmission_id`.
    pub id: u32,
    /// Wire op name.
    pub name: &'static str,
    /// One line description.
    pub summary: &'static str,
    /// Parameter schema, in documentation order.
    pub params: &'static [ParamSpec],
    /// Accepts `"report":"finished"` and later pushes `<name>_f_r`.
    pub reports: bool,
}

impl OperationSpec {
    /// Schema of parameter `name`.
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validate `args` and produce the request parameter bag.
    ///
    /// Returns `None` when there is nothing to send, so the `parameters` key is
    /// omitted on the wire. `report` adds `"report":"finished"`.
    ///
    /// # Errors
    /// [`IceBlocError::InvalidArgument`] for unknown, missing or mistyped
    /// parameters, or a final report requested from an operation without one.
    pub fn build(&self, args: &Args, report: bool) -> Result<Option<Parameters>> {
        let invalid = |message: String| IceBlocError::InvalidArgument {
            op: self.name.to_string(),
            message,
        };

        let mut bag = Parameters::new();
        for (name, value) in &args.0 {
            let spec = self
                .param(name)
                .ok_or_else(|| invalid(format!("unknown parameter '{name}'")))?;
            let value = coerce(spec, value).ok_or_else(|| {
                invalid(format!(
                    "parameter '{name}' expects {:?}, got {value}",
                    spec.kind
                ))
            })?;
            bag.insert(name.clone(), value.to_wire());
        }

        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !bag.contains_key(p.name))
        {
            return Err(invalid(format!("missing parameter '{}'", missing.name)));
        }

        if report {
            if !self.reports {
                return Err(invalid("operation has no final report".to_string()));
            }
            bag.insert("report".to_string(), Value::String("finished".to_string()));
        }

        Ok(if bag.is_empty() { None } else { Some(bag) })
    }
}

fn coerce(spec: &ParamSpec, value: &ParamValue) -> Option<ParamValue> {
    match (spec.kind, value) {
        (ParamKind::Number, ParamValue::Number(_)) => Some(value.clone()),
        (ParamKind::Number, ParamValue::Integer(v)) => Some(ParamValue::Number(*v as f64)),
        (ParamKind::Integer, ParamValue::Integer(_)) => Some(value.clone()),
        (ParamKind::Integer, ParamValue::Number(v)) if v.fract() == 0.0 => {
            Some(ParamValue::Integer(*v as i64))
        }
        (ParamKind::Text, ParamValue::Text(_)) => Some(value.clone()),
        _ => None,
    }
}

/// Named argument bag for [`OperationSpec::build`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(BTreeMap<String, ParamValue>);

impl Args {
    /// Empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Add or replace an argument.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Argument `name`, if given.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// True when no argument was given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build from a JSON object such as `{"wavelength": 780.1, "operation": "on"}`.
    ///
    /// One-element arrays are accepted in place of scalars, so a parameter bag
    /// copied from the wire can be fed back in.
    ///
    /// # Errors
    /// [`IceBlocError::InvalidArgument`] for non-object input or nested values.
    pub fn from_json(op: &str, value: &Value) -> Result<Self> {
        let invalid = |message: String| IceBlocError::InvalidArgument {
            op: op.to_string(),
            message,
        };
        let object = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::new()),
            other => return Err(invalid(format!("arguments must be an object, got {other}"))),
        };

        let mut args = Self::new();
        for (name, raw) in object {
            let value = match unwrap_scalar(raw) {
                Value::String(s) => ParamValue::Text(s.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => ParamValue::Integer(i),
                    None => ParamValue::Number(n.as_f64().unwrap_or(f64::NAN)),
                },
                other => {
                    return Err(invalid(format!("unsupported value for '{name}': {other}")))
                }
            };
            args.set(name.clone(), value);
        }
        Ok(args)
    }
}

/// Find `name` among the operations of `kind` (shared ones included).
///
/// # Errors
/// [`IceBlocError::UnknownOperation`] if the module has no such operation.
pub fn lookup(kind: ModuleKind, name: &str) -> Result<&'static OperationSpec> {
    kind.operations()
        .find(|spec| spec.name == name)
        .ok_or_else(|| IceBlocError::UnknownOperation {
            module: kind.label().to_string(),
            op: name.to_string(),
        })
}

macro_rules! op {
    (@reports reported) => { true };
    (@reports) => { false };
    ($id:literal, $name:literal, $summary:literal, [$($param:expr),* $(,)?] $(, $flag:ident)?) => {
        OperationSpec {
            id: $id,
            name: $name,
            summary: $summary,
            params: &[$($param),*],
            reports: op!(@reports $($flag)?),
        }
    };
}

use ParamSpec as P;

/// Operations every module understands.
pub static COMMON: &[OperationSpec] = &[
    op!(900, "start_link", "Register the client IP address with the module", [P::text("ip_address")]),
    op!(901, "ping", "Echo text back with its case inverted", [P::text("text_in")]),
];

/// SolsTiS seed laser.
pub static SOLSTIS: &[OperationSpec] = &[
    op!(1, "set_wave_m", "Tune to a wavelength using the wavelength meter", [P::number("wavelength")], reported),
    op!(2, "poll_wave_m", "Poll wavelength meter tuning status", []),
    op!(3, "lock_wave_m", "Apply or remove the wavelength lock", [P::text("operation")]),
    op!(4, "stop_wave_m", "Stop wavelength meter tuning", []),
    op!(5, "move_wave_t", "Tune using the wavelength table", [P::number("wavelength")], reported),
    op!(6, "poll_move_wave_t", "Poll wavelength table tuning", []),
    op!(7, "stop_move_wave_t", "Stop wavelength table tuning", []),
    op!(8, "tune_etalon", "Set etalon tuning (percent)", [P::number("setting")], reported),
    op!(9, "tune_cavity", "Set reference cavity tuning (percent)", [P::number("setting")], reported),
    op!(10, "fine_tune_cavity", "Set reference cavity fine tuning (percent)", [P::number("setting")], reported),
    op!(11, "tune_resonator", "Set resonator tuning (percent)", [P::number("setting")], reported),
    op!(12, "fine_tune_resonator", "Set resonator fine tuning (percent)", [P::number("setting")], reported),
    op!(13, "etalon_lock", "Switch the etalon lock", [P::text("operation")], reported),
    op!(14, "etalon_lock_status", "Read the etalon lock condition", []),
    op!(15, "cavity_lock", "Switch the reference cavity lock", [P::text("operation")], reported),
    op!(16, "cavity_lock_status", "Read the reference cavity lock condition", []),
    op!(17, "ecd_lock", "Switch the ECD (doubler) lock", [P::text("operation")], reported),
    op!(18, "ecd_lock_status", "Read the ECD lock condition and voltage", []),
    op!(19, "monitor_a", "Route a signal to monitor output A", [P::integer("signal")], reported),
    op!(20, "monitor_b", "Route a signal to monitor output B", [P::integer("signal")], reported),
    op!(21, "select_profile", "Select the etalon profile", [P::integer("profile")], reported),
    op!(22, "get_status", "Read the overall system status", []),
    op!(23, "get_alignment_status", "Read the beam alignment status", []),
    op!(24, "beam_alignment", "Set the beam alignment mode", [P::integer("mode")], reported),
    op!(25, "beam_adjust_x", "Set the X beam alignment (percent)", [P::number("x_value")], reported),
    op!(26, "beam_adjust_y", "Set the Y beam alignment (percent)", [P::number("y_value")], reported),
    op!(27, "scan_stitch_initialise", "Configure a TeraScan", [
        P::text("scan"),
        P::number("start"),
        P::number("stop"),
        P::number("rate"),
        P::text("units"),
    ]),
    op!(28, "scan_stitch_op", "Start or stop a TeraScan", [P::text("scan"), P::text("operation")], reported),
    op!(29, "scan_stitch_status", "Read TeraScan progress", [P::text("scan")]),
    op!(30, "scan_stitch_output", "Switch TeraScan wavelength output", [P::text("operation")]),
    op!(31, "terascan_output", "Configure TeraScan automatic output", [
        P::text("operation"),
        P::integer("delay"),
        P::integer("update"),
        P::text("pause"),
    ]),
    op!(32, "fast_scan_start", "Start a fast scan around the current setting", [
        P::text("scan"),
        P::number("width"),
        P::number("time"),
    ], reported),
    op!(33, "fast_scan_poll", "Poll a fast scan", [P::text("scan")]),
    op!(34, "fast_scan_stop", "Stop a fast scan and re-centre the tuner", [P::text("scan")], reported),
    op!(35, "fast_scan_stop_nr", "Stop a fast scan without re-centring", [P::text("scan")], reported),
    op!(36, "pba_reference", "Start or stop the PBA reference", [P::text("operation")], reported),
    op!(37, "pba_reference_status", "Read the PBA reference status", []),
    op!(38, "get_wavelength_range", "Read the tunable range and extended zones", []),
    op!(39, "terascan_continue", "Resume a paused TeraScan", []),
    op!(40, "read_all_adc", "Read every ADC channel", [], reported),
    op!(41, "set_wave_tolerance_m", "Set the wavelength tuning tolerance", [P::number("tolerance")]),
    op!(42, "set_wave_lock_tolerance_m", "Set the wavelength lock tolerance (obsolete)", [P::number("tolerance")]),
    op!(43, "digital_pid_control", "Start or stop the digital PID loop", [P::text("operation")]),
    op!(44, "digital_pid_poll", "Poll the digital PID loop", []),
    op!(45, "set_w_meter_channel", "Select the wavelength meter channel", [
        P::integer("channel"),
        P::integer("recovery").optional(),
    ]),
    op!(46, "lock_wave_m_fixed", "Maintain a fixed wavelength", [
        P::text("operation"),
        P::number("lock_wavelength").optional(),
    ]),
    op!(47, "gpio_output", "Drive a GPIO line", [P::integer("channel"), P::integer("value")], reported),
    op!(48, "dac_ramping", "Ramp a DAC output", [
        P::integer("dac_channel"),
        P::integer("start_stop"),
        P::integer("ramping_mode"),
        P::integer("step_mode"),
        P::number("target_output"),
        P::number("ramp_rate"),
        P::number("update_rate"),
        P::number("step_size"),
    ]),
    op!(49, "dac_ramping_poll", "Poll a DAC ramp", [P::integer("dac_channel")]),
    op!(50, "digital_pot_output", "Set a digital potentiometer", [P::integer("channel"), P::integer("value")]),
    op!(51, "dac_output", "Set a DAC output", [P::integer("channel"), P::number("output_value")]),
    op!(52, "lock_mir_wavelength", "Maintain a fixed mid-IR wavelength", [
        P::text("operation"),
        P::number("lock_wavelength"),
    ]),
    op!(53, "get_mir_wavelength", "Read the IR, green and MIR wavelengths", []),
    op!(54, "get_dac_tuning_values", "Read the four tuner DAC values", []),
    op!(55, "set_time", "Set the ICE Bloc clock", [
        P::integer("hour"),
        P::integer("minute"),
        P::integer("second"),
        P::integer("day"),
        P::integer("month"),
        P::integer("year"),
    ]),
    op!(56, "set_etalon_tuning_scan", "Switch the etalon scan used during tuning", [P::text("operation")]),
    op!(57, "slow_wavelength_update", "Switch the slow PI wavelength update", [
        P::text("operation"),
        P::number("p_const"),
        P::number("i_const"),
        P::number("interval"),
    ]),
    op!(58, "beam_maximising_3_axis", "Run 3-axis beam maximising", [
        P::integer("instance"),
        P::integer("run_mode"),
        P::integer("cont_mode"),
        P::integer("run_count"),
        P::number("update_rate"),
        P::number("power_drop"),
        P::integer("dac_x_channel"),
        P::integer("dac_x_enable"),
        P::number("dac_x_value"),
        P::number("dac_x_step"),
        P::number("dac_x_end_value"),
        P::integer("dac_y_channel"),
        P::integer("dac_y_enable"),
        P::number("dac_y_value"),
        P::number("dac_y_step"),
        P::number("dac_y_end_value"),
        P::integer("dac_z_channel"),
        P::integer("dac_z_enable"),
        P::number("dac_z_value"),
        P::number("dac_z_step"),
        P::number("dac_z_end_value"),
        P::integer("adc_channel"),
    ]),
    op!(59, "beam_maximising_3_axis_status", "Read 3-axis beam maximising status", []),
    op!(60, "set_system_variable", "Switch a system variable", [P::text("variable"), P::text("condition")]),
    op!(61, "table_entry_info", "Read the wavelength table entry for a wavelength", [P::number("wavelength")]),
    op!(62, "system_info", "Read hardware and software versions", []),
    op!(63, "beam_alignment_configure", "Configure a beam alignment instance", [
        P::integer("instance"),
        P::integer("dac_x_channel"),
        P::integer("dac_y_channel"),
        P::integer("adc_channel"),
        P::number("beam_x_step_size"),
        P::number("beam_y_step_size"),
        P::number("beam_x_value"),
        P::number("beam_y_value"),
        P::number("update_period"),
        P::number("max_power_drop"),
        P::integer("continuous_mode"),
        P::integer("run_count"),
    ]),
];

/// Equinox pump laser.
pub static EQUINOX: &[OperationSpec] = &[
    op!(1, "laser_control", "Warm up, cool down, start or stop the laser", [P::text("operation")]),
    op!(2, "set_power", "Set output power in watts", [P::number("power")]),
    op!(3, "interlock_reset", "Reset the interlock latch", []),
    op!(4, "laser_status", "Read the laser status", []),
    op!(5, "waveplate_prepare", "Initialise and reference the waveplate motor", []),
];

/// SFG conversion stage.
pub static SFG: &[OperationSpec] = &[
    op!(1, "wavelength", "Tune the visible or infrared output", [P::text("beam"), P::number("target")], reported),
    op!(2, "wavelength_stop", "Stop wavelength tuning", [], reported),
    op!(3, "status", "Read the stage status", []),
    op!(4, "pba_control", "Start or stop automatic PBA", [P::text("action")]),
    op!(5, "pba_reference", "Start or stop the PBA reference", [
        P::text("action"),
        P::integer("solstis").optional(),
    ]),
    op!(6, "scan_stitch_initialise", "Configure a TeraScan", [
        P::text("scan"),
        P::number("start"),
        P::number("stop"),
        P::number("rate"),
        P::text("units"),
    ]),
    op!(7, "scan_stitch_op", "Start or stop a TeraScan", [P::text("scan"), P::text("operation")], reported),
    op!(8, "scan_stitch_status", "Read TeraScan progress", [P::text("scan")]),
    op!(9, "terascan_output", "Configure TeraScan automatic output", [
        P::text("operation"),
        P::integer("delay"),
        P::integer("update"),
        P::text("pause"),
    ]),
    op!(10, "terascan_continue", "Resume a paused TeraScan", []),
    op!(11, "emm_read_all_adc", "Read every ADC channel of the EMM", []),
];

/// DFG conversion stage.
pub static DFG: &[OperationSpec] = &[
    op!(1, "wavelength", "Tune the visible or infrared output", [P::text("beam"), P::number("target")], reported),
    op!(2, "wavelength_stop", "Stop wavelength tuning", [], reported),
    op!(3, "status", "Read the stage status", []),
    op!(4, "laser_control", "Switch the pump laser", [P::text("action")]),
    op!(5, "shutter_control", "Open or close the pump shutter", [P::text("action")]),
    op!(6, "pba_control", "Start or stop automatic PBA", [P::text("action")]),
    op!(7, "pba_reference", "Start or stop the PBA reference", [
        P::text("action"),
        P::integer("solstis").optional(),
    ]),
    op!(8, "change_ppln", "Shut the PPLN oven down for change over", []),
    op!(9, "start_ppln", "Start the PPLN oven after change over", [P::integer("fitted_oven")]),
    op!(10, "optimise_ppln", "Optimise the PPLN position", []),
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn ids_and_names_are_unique_per_module() {
        for kind in ModuleKind::ALL {
            let mut ids = HashSet::new();
            let mut names = HashSet::new();
            for spec in kind.operations() {
                assert!(ids.insert(spec.id), "{kind}: duplicate id {}", spec.id);
                assert!(names.insert(spec.name), "{kind}: duplicate op {}", spec.name);
            }
        }
    }

    #[test]
    fn corrected_entries_use_their_own_op_names() {
        assert_eq!(lookup(ModuleKind::Solstis, "set_time").unwrap().id, 55);
        assert_eq!(lookup(ModuleKind::Sfg, "scan_stitch_initialise").unwrap().id, 6);
        assert_eq!(lookup(ModuleKind::Sfg, "terascan_continue").unwrap().id, 10);
        assert_eq!(lookup(ModuleKind::Sfg, "emm_read_all_adc").unwrap().id, 11);
        assert_eq!(lookup(ModuleKind::Dfg, "optimise_ppln").unwrap().id, 10);
    }

    #[test]
    fn shared_operations_resolve_on_every_module() {
        for kind in ModuleKind::ALL {
            assert_eq!(lookup(kind, "ping").unwrap().id, PING_ID);
            assert_eq!(lookup(kind, "start_link").unwrap().id, START_LINK_ID);
        }
        assert!(matches!(
            lookup(ModuleKind::Equinox, "set_wave_m"),
            Err(IceBlocError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn build_wraps_numbers_and_keeps_text_bare() {
        let spec = lookup(ModuleKind::Solstis, "lock_mir_wavelength").unwrap();
        let bag = spec
            .build(&Args::new().with("operation", "on").with("lock_wavelength", 1550.25), false)
            .unwrap()
            .unwrap();
        assert_eq!(
            Value::Object(bag),
            json!({"operation": "on", "lock_wavelength": [1550.25]})
        );
    }

    #[test]
    fn no_argument_operation_builds_no_bag() {
        let spec = lookup(ModuleKind::Solstis, "poll_wave_m").unwrap();
        assert_eq!(spec.build(&Args::new(), false).unwrap(), None);
    }

    #[test]
    fn report_flag_is_added_only_where_supported() {
        let spec = lookup(ModuleKind::Solstis, "read_all_adc").unwrap();
        let bag = spec.build(&Args::new(), true).unwrap().unwrap();
        assert_eq!(bag["report"], json!("finished"));

        let spec = lookup(ModuleKind::Solstis, "get_status").unwrap();
        assert!(matches!(
            spec.build(&Args::new(), true),
            Err(IceBlocError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn validation_rejects_bad_bags() {
        let spec = lookup(ModuleKind::Solstis, "set_wave_m").unwrap();
        assert!(spec.build(&Args::new(), false).is_err());
        assert!(spec
            .build(&Args::new().with("wavelength", "780"), false)
            .is_err());
        assert!(spec
            .build(&Args::new().with("wavelength", 780.0).with("speed", 1.0), false)
            .is_err());
    }

    #[test]
    fn integers_accept_whole_numbers_only() {
        let spec = lookup(ModuleKind::Dfg, "start_ppln").unwrap();
        let bag = spec
            .build(&Args::new().with("fitted_oven", 2.0), false)
            .unwrap()
            .unwrap();
        assert_eq!(bag["fitted_oven"], json!([2]));
        assert!(spec
            .build(&Args::new().with("fitted_oven", 2.5), false)
            .is_err());
    }

    #[test]
    fn optional_parameters_may_be_omitted() {
        let spec = lookup(ModuleKind::Sfg, "pba_reference").unwrap();
        let bag = spec
            .build(&Args::new().with("action", "stop"), false)
            .unwrap()
            .unwrap();
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn args_from_json_unwraps_wire_values() {
        let args = Args::from_json("set_wave_m", &json!({"wavelength": [780.5], "operation": "on", "channel": 3}))
            .unwrap();
        assert_eq!(args.get("wavelength"), Some(&ParamValue::Number(780.5)));
        assert_eq!(args.get("operation"), Some(&ParamValue::Text("on".into())));
        assert_eq!(args.get("channel"), Some(&ParamValue::Integer(3)));
        assert!(Args::from_json("x", &json!([1, 2])).is_err());
    }

    #[test]
    fn module_kind_parses_case_insensitively() {
        assert_eq!("SolsTiS".parse::<ModuleKind>().unwrap(), ModuleKind::Solstis);
        assert!("laser".parse::<ModuleKind>().is_err());
    }
}
