//! Profile-likelihood confidence intervals on a parameter of interest.
//!
//! The test statistic is `t(x) = 2 * (ll_hat - ll(x))`, where `ll_hat` is the best fit under
//! the reference hypothesis and `ll(x)` the conditional fit with the poi fixed at `x`. The
//! interval edges are where `t` crosses the asymptotic chi-square(1) critical value.

use crate::MaximumLikelihoodEstimator;
use alea_core::{Error, Result, StatisticalModel, ValueMap};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::fmt;
use std::str::FromStr;

/// Which edges of the interval are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    /// Two-sided interval
    Central,
    /// Upper limit only (lower edge is `-inf`)
    Upper,
    /// Lower limit only (upper edge is `+inf`)
    Lower,
}

impl IntervalKind {
    /// Configuration string
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalKind::Central => "central",
            IntervalKind::Upper => "upper",
            IntervalKind::Lower => "lower",
        }
    }
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "central" => Ok(IntervalKind::Central),
            "upper" => Ok(IntervalKind::Upper),
            "lower" => Ok(IntervalKind::Lower),
            other => Err(Error::Validation(format!(
                "confidence_interval_kind must be one of central, upper, lower; got '{}'",
                other
            ))),
        }
    }
}

/// Confidence-interval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceIntervalConfig {
    /// Confidence level in (0, 1)
    pub confidence_level: f64,
    /// Interval kind
    pub kind: IntervalKind,
    /// Relative tolerance of the edge bisection
    pub rtol: f64,
    /// Max bisection iterations per edge
    pub max_iter: usize,
}

impl Default for ConfidenceIntervalConfig {
    fn default() -> Self {
        Self { confidence_level: 0.9, kind: IntervalKind::Central, rtol: 1e-6, max_iter: 100 }
    }
}

impl ConfidenceIntervalConfig {
    /// Check the confidence level range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.confidence_level && self.confidence_level < 1.0) {
            return Err(Error::Validation(format!(
                "confidence_level must be in (0,1), got {}",
                self.confidence_level
            )));
        }
        if self.kind != IntervalKind::Central && self.confidence_level <= 0.5 {
            return Err(Error::Validation(format!(
                "one-sided intervals need confidence_level > 0.5, got {}",
                self.confidence_level
            )));
        }
        Ok(())
    }

    /// Asymptotic critical value of `t`.
    ///
    /// One-sided intervals use the two-sided quantile at `1 - 2 * (1 - cl)`.
    pub fn critical_value(&self) -> Result<f64> {
        self.validate()?;
        let p = match self.kind {
            IntervalKind::Central => self.confidence_level,
            IntervalKind::Upper | IntervalKind::Lower => 1.0 - 2.0 * (1.0 - self.confidence_level),
        };
        let chi2 = ChiSquared::new(1.0).map_err(|e| Error::Computation(e.to_string()))?;
        Ok(chi2.inverse_cdf(p))
    }
}

/// Compute the `(lower, upper)` interval on `poi_name`.
///
/// `best_fit_args` is the hypothesis of the reference (global) fit and
/// `confidence_interval_args` the constraints applied to every conditional fit. The search
/// runs inside the poi's `parameter_interval_bounds` (falling back to its fit limits), which
/// must be finite. An edge that is never crossed inside the bounds is reported as the bound.
pub fn confidence_interval(
    mle: &MaximumLikelihoodEstimator,
    model: &dyn StatisticalModel,
    poi_name: &str,
    best_fit_args: &ValueMap,
    confidence_interval_args: &ValueMap,
    config: &ConfidenceIntervalConfig,
) -> Result<(f64, f64)> {
    let critical = config.critical_value()?;
    if confidence_interval_args.contains_key(poi_name) {
        return Err(Error::Validation(format!(
            "confidence_interval_args {:?} must not fix the poi '{}'",
            confidence_interval_args, poi_name
        )));
    }

    let poi = model.parameters().require(poi_name)?;
    let (lo, hi) = poi.interval_bounds();
    if !(lo.is_finite() && hi.is_finite()) {
        return Err(Error::Validation(format!(
            "poi '{}' needs finite parameter_interval_bounds (or fit limits) for \
             confidence intervals, got ({}, {})",
            poi_name, lo, hi
        )));
    }

    let best = mle.fit(model, best_fit_args)?;
    let poi_hat = best
        .value(poi_name)
        .ok_or_else(|| {
            Error::Validation(format!("poi '{}' is not a fittable parameter", poi_name))
        })?
        .clamp(lo, hi);
    let ll_hat = best.max_ll;

    // t(x) - critical; positive means x is excluded.
    let objective = |x: f64| -> Result<f64> {
        let mut args = confidence_interval_args.clone();
        args.insert(poi_name.to_string(), x);
        let cond = mle.fit(model, &args)?;
        let mut t = 2.0 * (ll_hat - cond.max_ll);
        match config.kind {
            IntervalKind::Upper if x < poi_hat => t = 0.0,
            IntervalKind::Lower if x > poi_hat => t = 0.0,
            _ => {}
        }
        Ok(t.max(0.0) - critical)
    };

    let lower = match config.kind {
        IntervalKind::Upper => f64::NEG_INFINITY,
        IntervalKind::Central | IntervalKind::Lower => {
            if objective(lo)? > 0.0 {
                bisect(&objective, lo, poi_hat, config)?
            } else {
                log::warn!(
                    "confidence interval on '{}' reaches the lower search bound {}",
                    poi_name,
                    lo
                );
                lo
            }
        }
    };
    let upper = match config.kind {
        IntervalKind::Lower => f64::INFINITY,
        IntervalKind::Central | IntervalKind::Upper => {
            if objective(hi)? > 0.0 {
                bisect(&objective, hi, poi_hat, config)?
            } else {
                log::warn!(
                    "confidence interval on '{}' reaches the upper search bound {}",
                    poi_name,
                    hi
                );
                hi
            }
        }
    };

    Ok((lower, upper))
}

/// Bisection between `excluded` (objective > 0) and `allowed` (objective <= 0).
fn bisect(
    objective: &dyn Fn(f64) -> Result<f64>,
    mut excluded: f64,
    mut allowed: f64,
    config: &ConfidenceIntervalConfig,
) -> Result<f64> {
    for _ in 0..config.max_iter {
        let mid = 0.5 * (excluded + allowed);
        if objective(mid)? > 0.0 {
            excluded = mid;
        } else {
            allowed = mid;
        }

        let denom = allowed.abs().max(1.0);
        if ((excluded - allowed).abs() / denom) < config.rtol {
            break;
        }
    }
    Ok(0.5 * (excluded + allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mle::tests::MeasurementModel;
    use approx::assert_relative_eq;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("upper".parse::<IntervalKind>().unwrap(), IntervalKind::Upper);
        assert!("sideways".parse::<IntervalKind>().is_err());
        assert_eq!(IntervalKind::Lower.to_string(), "lower");
    }

    #[test]
    fn test_critical_values() {
        let central = ConfidenceIntervalConfig::default();
        // chi2(1) 90% quantile = 1.6449^2
        assert_relative_eq!(central.critical_value().unwrap(), 2.705543, epsilon = 1e-5);

        let upper = ConfidenceIntervalConfig { kind: IntervalKind::Upper, ..Default::default() };
        // one-sided 90% -> 1.2816^2
        assert_relative_eq!(upper.critical_value().unwrap(), 1.642374, epsilon = 1e-5);

        let bad = ConfidenceIntervalConfig { confidence_level: 1.5, ..Default::default() };
        assert!(bad.critical_value().is_err());
    }

    #[test]
    fn test_central_interval_of_gaussian_measurement() {
        let model = MeasurementModel::new(1.0);
        let mle = MaximumLikelihoodEstimator::new();
        let (dl, ul) = confidence_interval(
            &mle,
            &model,
            "mu",
            &ValueMap::new(),
            &ValueMap::new(),
            &ConfidenceIntervalConfig::default(),
        )
        .unwrap();
        // x +- z_0.95 * sigma
        assert_relative_eq!(dl, 1.0 - 1.644854, epsilon = 1e-4);
        assert_relative_eq!(ul, 1.0 + 1.644854, epsilon = 1e-4);
    }

    #[test]
    fn test_upper_limit_of_gaussian_measurement() {
        let model = MeasurementModel::new(0.5);
        let mle = MaximumLikelihoodEstimator::new();
        let config = ConfidenceIntervalConfig { kind: IntervalKind::Upper, ..Default::default() };
        let (dl, ul) =
            confidence_interval(&mle, &model, "mu", &ValueMap::new(), &ValueMap::new(), &config)
                .unwrap();
        assert_eq!(dl, f64::NEG_INFINITY);
        assert_relative_eq!(ul, 0.5 + 1.281552, epsilon = 1e-4);
    }

    #[test]
    fn test_interval_clipped_at_search_bound() {
        let model = MeasurementModel::new(9.5);
        let mle = MaximumLikelihoodEstimator::new();
        let (dl, ul) = confidence_interval(
            &mle,
            &model,
            "mu",
            &ValueMap::new(),
            &ValueMap::new(),
            &ConfidenceIntervalConfig::default(),
        )
        .unwrap();
        assert_relative_eq!(dl, 9.5 - 1.644854, epsilon = 1e-4);
        assert_eq!(ul, 10.0);
    }

    #[test]
    fn test_poi_fixed_by_constraints_is_rejected() {
        let model = MeasurementModel::new(1.0);
        let mle = MaximumLikelihoodEstimator::new();
        let args: ValueMap = [("mu".to_string(), 0.0)].into();
        let r = confidence_interval(
            &mle,
            &model,
            "mu",
            &ValueMap::new(),
            &args,
            &ConfidenceIntervalConfig::default(),
        );
        assert!(r.is_err());
    }
}
