//! Runner argument schema.
//!
//! One ordered list of `{name, kind, default}` entries describes every Runner argument. The
//! CLI builds its `run-toymc` flags from it and the submitter renders scripts with it, so
//! [`RunnerConfig`] and the schema must always name the same fields.

use crate::hypothesis::Hypothesis;
use crate::toydata::ToydataMode;
use alea_core::{Error, ParameterDefinition, Result, ValueMap};
use alea_inference::IntervalKind;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Value kind of a Runner argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    /// String
    Str,
    /// Integer
    Int,
    /// Float
    Float,
    /// Boolean
    Bool,
    /// JSON object
    Map,
    /// JSON array
    List,
}

impl ArgKind {
    /// Schema string
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgKind::Str => "str",
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::Bool => "bool",
            ArgKind::Map => "map",
            ArgKind::List => "list",
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One Runner argument
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    /// Argument name (also the `--name` flag)
    pub name: &'static str,
    /// Value kind
    pub kind: ArgKind,
    /// Default value (`null` = unset)
    pub default: Value,
    /// One-line help text
    pub help: &'static str,
}

fn arg(name: &'static str, kind: ArgKind, default: Value, help: &'static str) -> ArgSpec {
    ArgSpec { name, kind, default, help }
}

/// All Runner arguments, in order.
pub fn runner_arguments() -> Vec<ArgSpec> {
    vec![
        arg("statistical_model", ArgKind::Str, json!("gaussian"), "Registered model kind"),
        arg("poi", ArgKind::Str, json!("mu"), "Parameter of interest"),
        arg(
            "hypotheses",
            ArgKind::List,
            json!(["free"]),
            "Hypotheses: free, null, true or {name: value}",
        ),
        arg("n_mc", ArgKind::Int, json!(3), "Number of Monte Carlo repetitions"),
        arg("common_hypothesis", ArgKind::Map, json!({}), "Values fixed in every hypothesis"),
        arg("generate_values", ArgKind::Map, json!({}), "Parameter values for toy generation"),
        arg("nominal_values", ArgKind::Map, json!({}), "Nominal values applied to the model"),
        arg("statistical_model_config", ArgKind::Str, Value::Null, "Model config (YAML or JSON)"),
        arg("parameter_definition", ArgKind::Map, Value::Null, "Parameter definition"),
        arg("statistical_model_args", ArgKind::Map, json!({}), "Extra model arguments"),
        arg("likelihood_config", ArgKind::Map, Value::Null, "Likelihood configuration"),
        arg("compute_confidence_interval", ArgKind::Bool, json!(false), "Compute intervals"),
        arg("confidence_level", ArgKind::Float, json!(0.9), "Confidence level"),
        arg("confidence_interval_kind", ArgKind::Str, json!("central"), "central, upper or lower"),
        arg(
            "toydata_mode",
            ArgKind::Str,
            json!("generate_and_write"),
            "read, generate, generate_and_write or no_toydata",
        ),
        arg("toydata_file", ArgKind::Str, json!("test_toydata_file.json"), "Toy-data file"),
        arg("only_toydata", ArgKind::Bool, json!(false), "Only generate toy data, no fits"),
        arg("output_file", ArgKind::Str, json!("test_output_file.json"), "Result file"),
        arg("metadata", ArgKind::Map, json!({}), "Extra file-level metadata"),
        arg("seed", ArgKind::Int, Value::Null, "Base seed; toy i uses seed + i"),
    ]
}

/// Schema entry by name
pub fn runner_argument(name: &str) -> Option<ArgSpec> {
    runner_arguments().into_iter().find(|a| a.name == name)
}

/// Name -> default value for every argument.
pub fn default_arguments() -> Map<String, Value> {
    runner_arguments().into_iter().map(|a| (a.name.to_string(), a.default)).collect()
}

/// Render an argument value for a command line.
///
/// `null` is `None`; floats keep 4 decimals; maps and lists are compact JSON.
pub fn arg_to_str(value: &Value, kind: ArgKind) -> Result<String> {
    let mismatch = || Error::Validation(format!("value {} is not of kind {}", value, kind));
    if value.is_null() {
        return Ok("None".to_string());
    }
    match kind {
        ArgKind::Str => value.as_str().map(str::to_string).ok_or_else(mismatch),
        ArgKind::Int => value
            .as_i64()
            .map(|v| v.to_string())
            .or_else(|| value.as_u64().map(|v| v.to_string()))
            .ok_or_else(mismatch),
        ArgKind::Float => value.as_f64().map(|v| format!("{:.4}", v)).ok_or_else(mismatch),
        ArgKind::Bool => value.as_bool().map(|v| v.to_string()).ok_or_else(mismatch),
        ArgKind::Map if value.is_object() => Ok(serde_json::to_string(value)?),
        ArgKind::List if value.is_array() => Ok(serde_json::to_string(value)?),
        ArgKind::Map | ArgKind::List => Err(mismatch()),
    }
}

/// Parse a command-line string back into an argument value.
pub fn str_to_arg(text: &str, kind: ArgKind) -> Result<Value> {
    if text == "None" {
        return Ok(Value::Null);
    }
    let invalid = |e: &dyn fmt::Display| {
        Error::Validation(format!("cannot parse '{}' as {}: {}", text, kind, e))
    };
    match kind {
        ArgKind::Str => Ok(Value::String(text.to_string())),
        ArgKind::Int => match text.parse::<i64>() {
            Ok(v) => Ok(Value::from(v)),
            Err(e) => text.parse::<u64>().map(Value::from).map_err(|_| invalid(&e)),
        },
        ArgKind::Float => {
            let v = text.parse::<f64>().map_err(|e| invalid(&e))?;
            serde_json::Number::from_f64(v).map(Value::Number).ok_or_else(|| invalid(&"not finite"))
        }
        ArgKind::Bool => match text {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            _ => Err(invalid(&"expected true or false")),
        },
        ArgKind::Map | ArgKind::List => {
            let value: Value = serde_json::from_str(text).map_err(|e| invalid(&e))?;
            match (kind, &value) {
                (ArgKind::Map, Value::Object(_)) | (ArgKind::List, Value::Array(_)) => Ok(value),
                _ => Err(invalid(&"wrong JSON type")),
            }
        }
    }
}

/// Fail unless `value` is `null` or an object whose values are all numbers.
pub fn require_numeric_map(name: &str, value: &Value) -> Result<()> {
    let numeric = match value {
        Value::Null => true,
        Value::Object(map) => map.values().all(Value::is_number),
        _ => false,
    };
    if numeric {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} should be a map of numbers, but {} is provided",
            name, value
        )))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Typed Runner arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Registered model kind
    pub statistical_model: String,
    /// Parameter of interest
    pub poi: String,
    /// Ordered hypotheses
    pub hypotheses: Vec<Hypothesis>,
    /// Monte Carlo repetitions
    pub n_mc: usize,
    /// Values fixed in every hypothesis
    #[serde(deserialize_with = "null_as_default")]
    pub common_hypothesis: ValueMap,
    /// Toy-data generation values (may hold `poi_expectation`)
    #[serde(deserialize_with = "null_as_default")]
    pub generate_values: ValueMap,
    /// Nominal values applied to the model
    #[serde(deserialize_with = "null_as_default")]
    pub nominal_values: ValueMap,
    /// Model config file; overrides `parameter_definition` and `likelihood_config`
    pub statistical_model_config: Option<PathBuf>,
    /// Parameter definition
    pub parameter_definition: Option<ParameterDefinition>,
    /// Extra model arguments
    #[serde(deserialize_with = "null_as_default")]
    pub statistical_model_args: Map<String, Value>,
    /// Likelihood configuration
    pub likelihood_config: Option<Value>,
    /// Compute `(dl, ul)` for hypotheses leaving the poi free
    pub compute_confidence_interval: bool,
    /// Confidence level
    pub confidence_level: f64,
    /// Interval kind
    pub confidence_interval_kind: IntervalKind,
    /// Toy-data mode
    pub toydata_mode: ToydataMode,
    /// Toy-data file
    pub toydata_file: Option<PathBuf>,
    /// Only generate toy data
    pub only_toydata: bool,
    /// Result file
    pub output_file: Option<PathBuf>,
    /// Extra file-level metadata
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
    /// Base seed
    pub seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            statistical_model: "gaussian".to_string(),
            poi: "mu".to_string(),
            hypotheses: vec![Hypothesis::Free],
            n_mc: 3,
            common_hypothesis: ValueMap::new(),
            generate_values: ValueMap::new(),
            nominal_values: ValueMap::new(),
            statistical_model_config: None,
            parameter_definition: None,
            statistical_model_args: Map::new(),
            likelihood_config: None,
            compute_confidence_interval: false,
            confidence_level: 0.9,
            confidence_interval_kind: IntervalKind::Central,
            toydata_mode: ToydataMode::GenerateAndWrite,
            toydata_file: Some(PathBuf::from("test_toydata_file.json")),
            only_toydata: false,
            output_file: Some(PathBuf::from("test_output_file.json")),
            metadata: Map::new(),
            seed: None,
        }
    }
}

impl RunnerConfig {
    /// Build from an argument map; missing arguments take their defaults.
    pub fn from_arguments(arguments: &Map<String, Value>) -> Result<Self> {
        for name in ["common_hypothesis", "generate_values", "nominal_values"] {
            if let Some(value) = arguments.get(name) {
                require_numeric_map(name, value)?;
            }
        }
        serde_json::from_value(Value::Object(arguments.clone()))
            .map_err(|e| Error::Config(format!("invalid runner arguments: {}", e)))
    }

    /// Argument map with every schema entry.
    pub fn to_arguments(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Validation(format!("runner config serialized to {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_matches_config_fields() {
        let mut schema: Vec<String> =
            runner_arguments().iter().map(|a| a.name.to_string()).collect();
        schema.sort();
        let mut fields: Vec<String> =
            RunnerConfig::default().to_arguments().unwrap().keys().cloned().collect();
        fields.sort();
        assert_eq!(schema, fields);
        assert_eq!(RunnerConfig::default().to_arguments().unwrap(), default_arguments());
        let parsed = RunnerConfig::from_arguments(&default_arguments()).unwrap();
        assert_eq!(parsed, RunnerConfig::default());
    }

    #[test]
    fn test_arg_to_str() {
        assert_eq!(arg_to_str(&Value::Null, ArgKind::Float).unwrap(), "None");
        assert_eq!(arg_to_str(&json!(0.9), ArgKind::Float).unwrap(), "0.9000");
        assert_eq!(arg_to_str(&json!(12), ArgKind::Int).unwrap(), "12");
        assert_eq!(arg_to_str(&json!(true), ArgKind::Bool).unwrap(), "true");
        assert_eq!(arg_to_str(&json!({"mu": 1.0}), ArgKind::Map).unwrap(), r#"{"mu":1.0}"#);
        let hypotheses = arg_to_str(&json!(["free", "null"]), ArgKind::List).unwrap();
        assert_eq!(hypotheses, r#"["free","null"]"#);
        assert!(arg_to_str(&json!("x"), ArgKind::Int).is_err());
    }

    #[test]
    fn test_str_to_arg() {
        assert_eq!(str_to_arg("None", ArgKind::Map).unwrap(), Value::Null);
        assert_eq!(str_to_arg("0.9000", ArgKind::Float).unwrap(), json!(0.9));
        assert_eq!(str_to_arg("5", ArgKind::Int).unwrap(), json!(5));
        assert_eq!(str_to_arg("False", ArgKind::Bool).unwrap(), json!(false));
        assert_eq!(str_to_arg(r#"{"mu":0.0}"#, ArgKind::Map).unwrap(), json!({"mu": 0.0}));
        assert!(str_to_arg("[1]", ArgKind::Map).is_err());
        assert!(str_to_arg("yes", ArgKind::Bool).is_err());
        assert!(str_to_arg("inf", ArgKind::Float).is_err());
    }

    #[test]
    fn test_rendered_defaults_parse_back() {
        let mut parsed = Map::new();
        for spec in runner_arguments() {
            let text = arg_to_str(&spec.default, spec.kind).unwrap();
            parsed.insert(spec.name.to_string(), str_to_arg(&text, spec.kind).unwrap());
        }
        assert_eq!(RunnerConfig::from_arguments(&parsed).unwrap(), RunnerConfig::default());
    }

    #[test]
    fn test_non_numeric_maps_rejected() {
        let mut args = default_arguments();
        args.insert("generate_values".into(), json!({"mu": "zero"}));
        let err = RunnerConfig::from_arguments(&args).unwrap_err();
        assert!(err.to_string().contains("generate_values"));

        let mut args = default_arguments();
        args.insert("common_hypothesis".into(), json!({"sigma": [2.0]}));
        assert!(RunnerConfig::from_arguments(&args).is_err());
    }

    #[test]
    fn test_null_maps_and_unknown_arguments() {
        let mut args = Map::new();
        args.insert("nominal_values".into(), Value::Null);
        args.insert("hypotheses".into(), json!(["free", {"mu": 1.0}]));
        let config = RunnerConfig::from_arguments(&args).unwrap();
        assert!(config.nominal_values.is_empty());
        assert_eq!(config.hypotheses[1], Hypothesis::Explicit([("mu".to_string(), 1.0)].into()));

        args.insert("n_batch".into(), json!(2));
        assert!(matches!(RunnerConfig::from_arguments(&args), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_toydata_mode_fails_when_parsed() {
        let mut args = Map::new();
        args.insert("toydata_mode".into(), json!("simulate"));
        assert!(RunnerConfig::from_arguments(&args).is_err());
    }
}
