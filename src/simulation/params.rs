//! Textual model parameters
//!
//! Every model is configured from a map of upper-case keys to string values.
//! Models declare their keys as [`ParamSpec`] tables; [`ParamReader`] turns
//! the raw text into typed values, falling back to the declared default when
//! a value cannot be parsed and rejecting parsed values outside the declared
//! range.

use log::warn;
use std::collections::BTreeMap;

use super::error::ModelError;
use super::types::Address;

/// Type tag for a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
    Boolean,
    Address,
    ModelRef,
    Text,
    Enumeration(&'static [&'static str]),
}

/// Declaration of one model parameter
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub default: &'static str,
    /// Inclusive bounds for numeric parameters
    pub range: Option<(f64, f64)>,
}

impl ParamSpec {
    pub const fn new(key: &'static str, kind: ParamKind, default: &'static str) -> Self {
        Self {
            key,
            kind,
            default,
            range: None,
        }
    }

    pub const fn bounded(
        key: &'static str,
        kind: ParamKind,
        default: &'static str,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            key,
            kind,
            default,
            range: Some((min, max)),
        }
    }
}

/// Raw key/value parameter map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelParams {
    values: BTreeMap<String, String>,
}

impl ModelParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.set(key.as_ref(), value);
        }
        params
    }

    /// Parse `KEY=VALUE` pairs separated by semicolons or newlines
    pub fn parse(text: &str) -> Self {
        let mut params = Self::new();
        for entry in text.split([';', '\n']) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('=') {
                Some((key, value)) => params.set(key.trim(), value.trim()),
                None => warn!("Ignoring parameter entry without '=': {}", entry),
            }
        }
        params
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.trim().to_ascii_uppercase(), value.into());
    }

    /// Builder-style `set`
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_uppercase()).map(|v| v.as_str())
    }

    /// Copy every entry of `other` over this map
    pub fn merge(&mut self, other: &ModelParams) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Returns true for `Y`, `Yes`, `T` and `True` in any case
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "t" | "true"
    )
}

/// Parse a number with an optional SI-style suffix (`G,M,K,m,u,n,p,f,%`)
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(number) = value.parse::<f64>() {
        return number.is_finite().then_some(number);
    }

    let suffix = value.chars().last()?;
    let scale = match suffix {
        'G' => 1e9,
        'M' => 1e6,
        'K' | 'k' => 1e3,
        'm' => 1e-3,
        'u' => 1e-6,
        'n' => 1e-9,
        'p' => 1e-12,
        'f' => 1e-15,
        '%' => 1e-2,
        _ => return None,
    };
    let mantissa = value[..value.len() - suffix.len_utf8()].trim_end();
    mantissa
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(|n| n * scale)
}

/// Split a semicolon-delimited dependency string into model names
pub fn parse_dependencies(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Typed access to one model's parameters
pub struct ParamReader<'a> {
    model: &'a str,
    params: &'a ModelParams,
}

impl<'a> ParamReader<'a> {
    pub fn new(model: &'a str, params: &'a ModelParams) -> Self {
        Self { model, params }
    }

    /// Warn about keys the model does not declare
    pub fn warn_unknown(&self, specs: &[ParamSpec]) {
        for key in self.params.keys() {
            if !specs.iter().any(|spec| spec.key == key) {
                warn!("Model {}: ignoring unknown parameter {}", self.model, key);
            }
        }
    }

    fn raw(&self, spec: &ParamSpec) -> &str {
        self.params.get(spec.key).unwrap_or(spec.default)
    }

    fn check_range(&self, spec: &ParamSpec, value: f64, raw: &str) -> Result<(), ModelError> {
        if let Some((min, max)) = spec.range {
            if value < min || value > max {
                return Err(ModelError::InvalidParameter {
                    key: spec.key.to_string(),
                    value: raw.to_string(),
                    reason: format!("outside range [{}, {}]", min, max),
                });
            }
        }
        Ok(())
    }

    pub fn float(&self, spec: &ParamSpec) -> Result<f64, ModelError> {
        let raw = self.raw(spec);
        let value = match parse_number(raw) {
            Some(value) => value,
            None => {
                warn!(
                    "Model {}: cannot parse {}='{}', using default {}",
                    self.model, spec.key, raw, spec.default
                );
                parse_number(spec.default).unwrap_or_default()
            }
        };
        self.check_range(spec, value, raw)?;
        Ok(value)
    }

    pub fn int(&self, spec: &ParamSpec) -> Result<i64, ModelError> {
        let raw = self.raw(spec);
        let value = match parse_number(raw).filter(|n| n.fract() == 0.0) {
            Some(value) => value,
            None => {
                warn!(
                    "Model {}: cannot parse {}='{}' as an integer, using default {}",
                    self.model, spec.key, raw, spec.default
                );
                parse_number(spec.default).unwrap_or_default()
            }
        };
        self.check_range(spec, value, raw)?;
        Ok(value as i64)
    }

    pub fn boolean(&self, spec: &ParamSpec) -> bool {
        parse_bool(self.raw(spec))
    }

    /// Empty values mean "no address"
    pub fn address(&self, spec: &ParamSpec) -> Result<Option<Address>, ModelError> {
        let raw = self.raw(spec).trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<Address>()
            .map(Some)
            .map_err(|_| ModelError::UnparseableAddress(raw.to_string()))
    }

    /// Empty values mean "no reference"
    pub fn model_ref(&self, spec: &ParamSpec) -> Option<String> {
        let raw = self.raw(spec).trim();
        (!raw.is_empty()).then(|| raw.to_string())
    }

    pub fn text(&self, spec: &ParamSpec) -> String {
        self.raw(spec).trim().to_string()
    }

    /// Case-insensitive choice among the declared options
    pub fn choice(&self, spec: &ParamSpec) -> &'static str {
        let options: &'static [&'static str] = match spec.kind {
            ParamKind::Enumeration(options) => options,
            _ => &[],
        };
        let raw = self.raw(spec).trim();
        let find = |candidate: &str| {
            options
                .iter()
                .copied()
                .find(|option| option.eq_ignore_ascii_case(candidate))
        };
        find(raw).unwrap_or_else(|| {
            warn!(
                "Model {}: '{}' is not one of {:?} for {}, using default {}",
                self.model, raw, options, spec.key, spec.default
            );
            find(spec.default).unwrap_or(spec.default)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: ParamSpec = ParamSpec::bounded("RANGE", ParamKind::Float, "1000", 0.0, 1e5);
    const COUNT: ParamSpec = ParamSpec::new("COUNT", ParamKind::Int, "3");
    const MODE: ParamSpec =
        ParamSpec::new("MODE", ParamKind::Enumeration(&["street", "uniform"]), "street");

    #[test]
    fn test_parse_bool() {
        for truthy in ["Y", "yes", "T", "TRUE", " true "] {
            assert!(parse_bool(truthy), "{} should be true", truthy);
        }
        for falsy in ["N", "no", "1", "", "on"] {
            assert!(!parse_bool(falsy), "{} should be false", falsy);
        }
    }

    #[test]
    fn test_parse_number_suffixes() {
        assert_eq!(parse_number("12"), Some(12.0));
        assert_eq!(parse_number("2K"), Some(2000.0));
        assert_eq!(parse_number("3M"), Some(3e6));
        assert_eq!(parse_number("1.5G"), Some(1.5e9));
        assert!((parse_number("10m").unwrap() - 0.01).abs() < 1e-12);
        assert!((parse_number("4u").unwrap() - 4e-6).abs() < 1e-18);
        assert!((parse_number("50%").unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("K"), None);
    }

    #[test]
    fn test_parse_dependencies() {
        assert_eq!(
            parse_dependencies("mob0; comm0;;trip0 "),
            vec!["mob0", "comm0", "trip0"]
        );
        assert!(parse_dependencies("").is_empty());
    }

    #[test]
    fn test_params_text_and_case() {
        let params = ModelParams::parse("range=250; Mode = Uniform\nbogus");
        assert_eq!(params.get("RANGE"), Some("250"));
        assert_eq!(params.get("mode"), Some("Uniform"));
        assert_eq!(params.keys().count(), 2);
    }

    #[test]
    fn test_reader_defaults_and_ranges() {
        let params = ModelParams::new().with("RANGE", "fast").with("COUNT", "2.5");
        let reader = ParamReader::new("comm0", &params);
        // Malformed values fall back to the declared default
        assert_eq!(reader.float(&RANGE).unwrap(), 1000.0);
        assert_eq!(reader.int(&COUNT).unwrap(), 3);

        let params = ModelParams::new().with("RANGE", "-5");
        let err = ParamReader::new("comm0", &params).float(&RANGE).unwrap_err();
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn test_reader_choice_and_address() {
        let params = ModelParams::new()
            .with("MODE", "UNIFORM")
            .with("ADDRESS", "1.2.3");
        let reader = ParamReader::new("car0", &params);
        assert_eq!(reader.choice(&MODE), "uniform");

        let spec = ParamSpec::new("ADDRESS", ParamKind::Address, "");
        assert_eq!(reader.address(&spec).unwrap_err().code(), 3);

        let empty = ModelParams::new();
        assert_eq!(ParamReader::new("car0", &empty).address(&spec).unwrap(), None);
    }
}
