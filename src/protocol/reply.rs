//! Typed access to reply parameter bags.
//!
//! Modules wrap numeric reply fields in one-element arrays (`"status":[1]`).
//! [`Reply`] hides that quirk: every accessor unwraps a one-element array before
//! converting, and also accepts a bare scalar.

use crate::error::{IceBlocError, Result};
use crate::protocol::codec::{unwrap_scalar, Parameters};
use serde_json::Value;

/// Decoded reply of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    op: String,
    parameters: Parameters,
}

impl Reply {
    /// Wrap the parameters returned for `op`.
    pub fn new(op: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            op: op.into(),
            parameters,
        }
    }

    /// Operation this reply answers.
    pub fn op(&self) -> &str {
        &self.op
    }

    /// Raw parameter bag, exactly as received.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Consume the reply and return the raw parameter bag.
    pub fn into_parameters(self) -> Parameters {
        self.parameters
    }

    /// True when the reply carries `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    fn field(&self, key: &str) -> Result<&Value> {
        self.parameters
            .get(key)
            .map(unwrap_scalar)
            .ok_or_else(|| IceBlocError::Protocol(format!("'{}' reply lacks '{key}'", self.op)))
    }

    fn mistyped(&self, key: &str, expected: &str, got: &Value) -> IceBlocError {
        IceBlocError::Protocol(format!(
            "'{}' reply field '{key}' is not {expected}: {got}",
            self.op
        ))
    }

    /// Numeric field as `f64`.
    pub fn number(&self, key: &str) -> Result<f64> {
        let value = self.field(key)?;
        value
            .as_f64()
            .ok_or_else(|| self.mistyped(key, "a number", value))
    }

    /// Integral field as `i64`. Whole floats (`2.0`) are accepted.
    pub fn integer(&self, key: &str) -> Result<i64> {
        let value = self.field(key)?;
        if let Some(v) = value.as_i64() {
            return Ok(v);
        }
        match value.as_f64() {
            Some(v) if v.fract() == 0.0 => Ok(v as i64),
            _ => Err(self.mistyped(key, "an integer", value)),
        }
    }

    /// Text field.
    pub fn text(&self, key: &str) -> Result<&str> {
        let value = self.field(key)?;
        value
            .as_str()
            .ok_or_else(|| self.mistyped(key, "text", value))
    }

    /// The `status` code almost every reply carries.
    pub fn status(&self) -> Result<i64> {
        self.integer("status")
    }

    /// Numeric field that may be absent.
    pub fn opt_number(&self, key: &str) -> Result<Option<f64>> {
        if self.contains(key) {
            self.number(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Integral field that may be absent.
    pub fn opt_integer(&self, key: &str) -> Result<Option<i64>> {
        if self.contains(key) {
            self.integer(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Fail with [`IceBlocError::Device`] unless `status` is 0.
    ///
    /// `describe` maps the non-zero code to the module's documented meaning.
    pub fn ensure_ok(self, describe: impl Fn(i64) -> &'static str) -> Result<Self> {
        let status = self.status()?;
        if status == 0 {
            Ok(self)
        } else {
            Err(IceBlocError::Device {
                op: self.op.clone(),
                message: format!("status {status}: {}", describe(status)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(value: Value) -> Reply {
        match value {
            Value::Object(map) => Reply::new("get_status", map),
            _ => Reply::new("get_status", Parameters::new()),
        }
    }

    #[test]
    fn unwraps_single_element_sequences() {
        let r = reply(json!({"status": [0], "wavelength": [780.25], "dither": "off"}));
        assert_eq!(r.status().unwrap(), 0);
        assert!((r.number("wavelength").unwrap() - 780.25).abs() < 1e-9);
        assert_eq!(r.text("dither").unwrap(), "off");
    }

    #[test]
    fn accepts_bare_scalars_and_whole_floats() {
        let r = reply(json!({"status": 2, "channel_count": [18.0]}));
        assert_eq!(r.status().unwrap(), 2);
        assert_eq!(r.integer("channel_count").unwrap(), 18);
    }

    #[test]
    fn missing_or_mistyped_fields_are_protocol_errors() {
        let r = reply(json!({"dither": [1.5]}));
        assert!(matches!(r.status(), Err(IceBlocError::Protocol(_))));
        assert!(matches!(r.text("dither"), Err(IceBlocError::Protocol(_))));
        assert!(matches!(r.integer("dither"), Err(IceBlocError::Protocol(_))));
        assert_eq!(r.opt_number("absent").unwrap(), None);
    }

    #[test]
    fn ensure_ok_maps_status_to_device_error() {
        let ok = reply(json!({"status": [0]}));
        assert!(ok.ensure_ok(|_| "unused").is_ok());

        let failed = reply(json!({"status": [1]}));
        let err = failed.ensure_ok(|_| "operation failed").unwrap_err();
        assert!(err.to_string().contains("operation failed"));
    }
}
