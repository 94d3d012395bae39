//! Model configuration files (YAML or JSON).

use alea_core::{Error, ParameterDefinition, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameter definition plus likelihood configuration of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Parameter definitions
    pub parameter_definition: ParameterDefinition,
    /// Likelihood configuration, model specific
    #[serde(default)]
    pub likelihood_config: Option<serde_json::Value>,
}

/// Read a configuration file: JSON for `.json`, YAML otherwise.
pub fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config {}: {}", path.display(), e),
        ))
    })?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    if ext == "json" {
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    } else {
        serde_yaml_ng::from_slice(&bytes)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Load a model configuration file.
pub fn load_model_config(path: &Path) -> Result<ModelConfig> {
    let config: ModelConfig = read_config(path)?;
    log::info!("loaded model config {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_path(filename: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("alea_models_{}_{}_{}", std::process::id(), nanos, filename));
        p
    }

    #[test]
    fn test_yaml_model_config() {
        let path = tmp_path("model.yaml");
        std::fs::write(
            &path,
            "parameter_definition:
  mu:
    nominal_value: 0.0
    fit_guess: 0.0
  sigma:
    nominal_value: 1.0
    fit_limits: [0.0, null]
likelihood_config: null
",
        )
        .unwrap();
        let config = load_model_config(&path).unwrap();
        match &config.parameter_definition {
            ParameterDefinition::Detailed(map) => {
                assert_eq!(map["sigma"].fit_limits, Some((Some(0.0), None)));
                assert!(map["mu"].fittable);
            }
            other => panic!("unexpected definition {other:?}"),
        }
        assert!(config.likelihood_config.is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_json_model_config_with_names() {
        let path = tmp_path("model.json");
        std::fs::write(
            &path,
            r#"{
                "parameter_definition": ["signal_rate_multiplier"],
                "likelihood_config": {"components": {"signal": 3.0}}
            }"#,
        )
        .unwrap();
        let config = load_model_config(&path).unwrap();
        assert_eq!(
            config.parameter_definition,
            ParameterDefinition::Names(vec!["signal_rate_multiplier".into()])
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_malformed_config() {
        let path = tmp_path("broken.yaml");
        std::fs::write(&path, "parameter_definition: [unclosed\n").unwrap();
        assert!(matches!(load_model_config(&path), Err(Error::Config(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
