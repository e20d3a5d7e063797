//! Parameter values accepted by the setters and descriptions returned by
//! `get_parameters`.

use serde::Serialize;
use serde_json::Value;
use shared::units::Quantity;

use crate::error::ParameterError;

/// A value passed to `set_parameter`.
///
/// Widgets and command lines hand over numbers, free-form strings or lists
/// of either; library callers may also pass a parsed [`Quantity`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    Quantity(Quantity),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Convert a JSON value. Objects, booleans and null have no meaning here.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(ParamValue::Number),
            Value::String(s) => Some(ParamValue::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(ParamValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(ParamValue::List),
            _ => None,
        }
    }

    /// Parse a command-line value: JSON when it parses, otherwise plain text.
    pub fn from_cli(text: &str) -> Self {
        serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|value| ParamValue::from_json(&value))
            .unwrap_or_else(|| ParamValue::Text(text.to_string()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text.trim()),
            ParamValue::List(items) if items.len() == 1 => items[0].as_text(),
            _ => None,
        }
    }

    /// Interpret the value as one quantity. Bare numbers are dimensionless.
    pub fn to_quantity(&self, name: &str) -> Result<Quantity, ParameterError> {
        match self {
            ParamValue::Number(value) => Ok(Quantity::dimensionless(*value)),
            ParamValue::Text(text) => {
                Quantity::parse(text).map_err(|e| ParameterError::unit(name, e))
            }
            ParamValue::Quantity(q) => Ok(q.clone()),
            ParamValue::List(items) if items.len() == 1 => items[0].to_quantity(name),
            ParamValue::List(_) => Err(ParameterError::invalid(name, "expected a single value")),
        }
    }

    /// Numeric value in `unit`; a dimensionless value is taken to be in `unit` already.
    pub fn to_f64_in(&self, name: &str, unit: &str) -> Result<f64, ParameterError> {
        let quantity = self.to_quantity(name)?;
        let value = if quantity.unit.is_dimensionless() {
            quantity.value
        } else {
            quantity
                .value_in(unit)
                .map_err(|e| ParameterError::unit(name, e))?
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ParameterError::invalid(name, "value must be finite"))
        }
    }

    /// A positive integer such as a dither or read count.
    pub fn to_count(&self, name: &str) -> Result<u32, ParameterError> {
        let value = self.to_f64_in(name, "")?;
        if value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
            return Err(ParameterError::invalid(
                name,
                format!("{value} is not a positive integer"),
            ));
        }
        Ok(value as u32)
    }

    /// The elements of a list value.
    ///
    /// A string such as `"0.7x20"` or `"0.7, 20"` is split into its parts and
    /// a scalar becomes a one-element list.
    pub fn items(&self) -> Vec<ParamValue> {
        match self {
            ParamValue::List(items) => items.clone(),
            ParamValue::Text(text) => {
                let separators: &[char] = if text.contains(',') { &[','] } else { &['x', 'X'] };
                text.split(separators)
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| ParamValue::Text(part.to_string()))
                    .collect()
            }
            other => vec![other.clone()],
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<Quantity> for ParamValue {
    fn from(value: Quantity) -> Self {
        ParamValue::Quantity(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// One selectable choice of an enumerable parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterOption {
    pub value: Value,
    pub name: String,
}

impl ParameterOption {
    pub fn new(value: impl Into<Value>, name: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: name.into(),
        }
    }

    /// An option whose display name is its value.
    pub fn plain(value: &str) -> Self {
        Self::new(value, value)
    }
}

/// Description of a settable parameter, enough to build an input widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParameterOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 2]>,
}

impl ParameterInfo {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            unit: None,
            options: Vec::new(),
            bounds: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = ParameterOption>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some([min, max]);
        self
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_text_and_number_agree() {
        let text = ParamValue::from("1.3").to_f64_in("airmass", "").unwrap();
        let number = ParamValue::from(1.3).to_f64_in("airmass", "").unwrap();
        assert_eq!(text, number);
    }

    #[test]
    fn test_unit_conversion() {
        let value = ParamValue::from("2 arcsec").to_f64_in("seeing", "arcsec").unwrap();
        assert_relative_eq!(value, 2.0);
        let value = ParamValue::from("20 min").to_f64_in("exposure", "s").unwrap();
        assert_relative_eq!(value, 1200.0, max_relative = 1e-12);
        assert!(matches!(
            ParamValue::from("2 s").to_f64_in("seeing", "arcsec"),
            Err(ParameterError::Unit { .. })
        ));
    }

    #[test]
    fn test_counts() {
        assert_eq!(ParamValue::from(4).to_count("dithers").unwrap(), 4);
        assert_eq!(ParamValue::from("3").to_count("reads").unwrap(), 3);
        assert!(ParamValue::from(0).to_count("dithers").is_err());
        assert!(ParamValue::from(1.5).to_count("dithers").is_err());
    }

    #[test]
    fn test_items_split_text() {
        let by_x = ParamValue::from("0.7x20").items();
        assert_eq!(by_x, vec![ParamValue::from("0.7"), ParamValue::from("20")]);
        let by_comma = ParamValue::from("0.7 arcsec, 20 arcsec").items();
        assert_eq!(by_comma.len(), 2);
        assert_eq!(by_comma[1], ParamValue::from("20 arcsec"));
        assert_eq!(ParamValue::from(2.0).items(), vec![ParamValue::from(2.0)]);
    }

    #[test]
    fn test_from_cli() {
        assert_eq!(ParamValue::from_cli("1.5"), ParamValue::Number(1.5));
        assert_eq!(ParamValue::from_cli("18 magab"), ParamValue::from("18 magab"));
        assert_eq!(
            ParamValue::from_cli("[\"600 s\", 1200]"),
            ParamValue::List(vec![ParamValue::from("600 s"), ParamValue::Number(1200.0)])
        );
        assert_eq!(ParamValue::from_cli("true"), ParamValue::from("true"));
    }

    #[test]
    fn test_info_serialization_omits_empty_fields() {
        let info = ParameterInfo::new(1.5).with_bounds(1.0, 2.0);
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({ "value": 1.5, "bounds": [1.0, 2.0] })
        );
        let info = ParameterInfo::new("K").with_options([ParameterOption::plain("K")]);
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({ "value": "K", "options": [{ "value": "K", "name": "K" }] })
        );
    }
}
