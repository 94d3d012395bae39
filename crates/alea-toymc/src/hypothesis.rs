//! Hypotheses and their resolution into fixed-parameter maps.

use alea_core::{Error, Result, ValueMap};
use serde::{Deserialize, Serialize};

/// One entry of the runner's hypothesis list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HypothesisRepr", into = "HypothesisRepr")]
pub enum Hypothesis {
    /// No constraint; the unconstrained reference fit
    Free,
    /// The poi fixed at zero
    Null,
    /// The poi fixed at its generate value
    True,
    /// Explicit parameter values
    Explicit(ValueMap),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum HypothesisRepr {
    Name(String),
    Values(ValueMap),
}

impl TryFrom<HypothesisRepr> for Hypothesis {
    type Error = String;

    fn try_from(repr: HypothesisRepr) -> std::result::Result<Self, String> {
        match repr {
            HypothesisRepr::Name(name) => match name.as_str() {
                "free" => Ok(Hypothesis::Free),
                "null" => Ok(Hypothesis::Null),
                "true" => Ok(Hypothesis::True),
                other => Err(format!(
                    "unknown hypothesis '{}', expected free, null, true or a map of values",
                    other
                )),
            },
            HypothesisRepr::Values(values) => Ok(Hypothesis::Explicit(values)),
        }
    }
}

impl From<Hypothesis> for HypothesisRepr {
    fn from(h: Hypothesis) -> Self {
        match h {
            Hypothesis::Explicit(values) => HypothesisRepr::Values(values),
            other => HypothesisRepr::Name(other.symbolic_name().unwrap_or_default().to_string()),
        }
    }
}

impl Hypothesis {
    /// `free`, `null` or `true`; `None` for explicit values
    pub fn symbolic_name(&self) -> Option<&'static str> {
        match self {
            Hypothesis::Free => Some("free"),
            Hypothesis::Null => Some("null"),
            Hypothesis::True => Some("true"),
            Hypothesis::Explicit(_) => None,
        }
    }

    /// Values this hypothesis fixes, before `common_hypothesis` is applied.
    pub fn values(&self, poi: &str, generate_values: &ValueMap) -> Result<ValueMap> {
        match self {
            Hypothesis::Free => Ok(ValueMap::new()),
            Hypothesis::Null => Ok([(poi.to_string(), 0.0)].into()),
            Hypothesis::True => {
                let value = generate_values.get(poi).ok_or_else(|| {
                    Error::Validation(format!(
                        "hypothesis 'true' needs {} in generate_values {:?}",
                        poi, generate_values
                    ))
                })?;
                Ok([(poi.to_string(), *value)].into())
            }
            Hypothesis::Explicit(values) => Ok(values.clone()),
        }
    }
}

/// Resolve the hypothesis list into fixed-parameter maps, in order.
///
/// Each map is `common_hypothesis` overlaid by the hypothesis' own values. The list must be
/// non-empty, `free` (when present) must come first, and confidence intervals need `free`.
pub fn resolve_hypotheses(
    hypotheses: &[Hypothesis],
    poi: &str,
    common_hypothesis: &ValueMap,
    generate_values: &ValueMap,
    compute_confidence_interval: bool,
) -> Result<Vec<ValueMap>> {
    if hypotheses.is_empty() {
        return Err(Error::Validation("hypotheses should not be empty".to_string()));
    }
    let free_at = hypotheses.iter().position(|h| *h == Hypothesis::Free);
    match free_at {
        None if compute_confidence_interval => {
            return Err(Error::Validation(
                "free hypothesis is needed for confidence interval calculation".to_string(),
            ))
        }
        Some(i) if i != 0 => {
            return Err(Error::Validation(format!(
                "free hypothesis should be the first hypothesis, found at position {}",
                i
            )))
        }
        _ => {}
    }

    hypotheses
        .iter()
        .map(|h| {
            let mut values = common_hypothesis.clone();
            values.extend(h.values(poi, generate_values)?);
            Ok(values)
        })
        .collect()
}

/// Table names: the symbolic name when there is one, else the position.
pub fn result_names(hypotheses: &[Hypothesis]) -> Vec<String> {
    hypotheses
        .iter()
        .enumerate()
        .map(|(i, h)| h.symbolic_name().map_or_else(|| i.to_string(), str::to_string))
        .collect()
}
