//! Generate-values resolution (`poi_expectation`).

use alea_core::{Error, Result, StatisticalModel, ValueMap};

/// Derived generate-values key: requested expected yield of the poi's component
pub const POI_EXPECTATION: &str = "poi_expectation";
/// Suffix a poi needs for `poi_expectation` to apply
pub const RATE_MULTIPLIER_SUFFIX: &str = "_rate_multiplier";

/// Replace `poi_expectation` by the poi value giving that expected yield.
///
/// The component is the poi name without `_rate_multiplier`; its yield `N` is evaluated
/// under the remaining generate values overlaid by `nominal_values`, and the poi becomes
/// `poi_expectation / N`. Without `poi_expectation` the map is returned unchanged.
pub fn resolve_generate_values(
    model: &dyn StatisticalModel,
    poi: &str,
    mut generate_values: ValueMap,
    nominal_values: &ValueMap,
) -> Result<ValueMap> {
    let Some(expectation) = generate_values.remove(POI_EXPECTATION) else {
        return Ok(generate_values);
    };
    if generate_values.contains_key(poi) {
        return Err(Error::Validation(format!(
            "cannot specify both {} and {} in generate_values, {} is derived from {}",
            poi, POI_EXPECTATION, poi, POI_EXPECTATION
        )));
    }
    let component = poi.strip_suffix(RATE_MULTIPLIER_SUFFIX).ok_or_else(|| {
        Error::Validation(format!(
            "poi {} should end with {} when {} is provided",
            poi, RATE_MULTIPLIER_SUFFIX, POI_EXPECTATION
        ))
    })?;

    let mut values = generate_values.clone();
    values.extend(nominal_values.iter().map(|(k, v)| (k.clone(), *v)));
    let expectations = model.get_expectation_values(&values)?;
    let nominal = *expectations.get(component).ok_or_else(|| {
        Error::Validation(format!(
            "model '{}' has no component '{}', components: {:?}",
            model.name(),
            component,
            expectations.keys().collect::<Vec<_>>()
        ))
    })?;
    if nominal == 0.0 || !nominal.is_finite() {
        return Err(Error::Computation(format!(
            "expectation of component '{}' is {}, cannot scale it to {} = {}",
            component, nominal, POI_EXPECTATION, expectation
        )));
    }

    generate_values.insert(poi.to_string(), expectation / nominal);
    Ok(generate_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alea_models::{CountingConfig, CountingModel, GaussianModel};

    const POI: &str = "signal_rate_multiplier";

    fn counting() -> CountingModel {
        CountingModel::new(CountingConfig::default(), None).unwrap()
    }

    #[test]
    fn test_unchanged_without_poi_expectation() {
        let model = GaussianModel::new(None).unwrap();
        let gv: ValueMap = [("mu".to_string(), 1.0), ("sigma".to_string(), 2.0)].into();
        let resolved = resolve_generate_values(&model, "mu", gv.clone(), &ValueMap::new());
        assert_eq!(resolved.unwrap(), gv);
    }

    #[test]
    fn test_ratio_to_nominal_expectation() {
        let gv: ValueMap = [(POI_EXPECTATION.to_string(), 25.0)].into();
        let resolved = resolve_generate_values(&counting(), POI, gv, &ValueMap::new()).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["signal_rate_multiplier"], 25.0 / 10.0);
        assert!(!resolved.contains_key(POI_EXPECTATION));
    }

    #[test]
    fn test_other_generate_values_are_kept() {
        let gv: ValueMap = [
            (POI_EXPECTATION.to_string(), 30.0),
            ("background_rate_multiplier".to_string(), 2.0),
        ]
        .into();
        // the signal expectation does not depend on the background multiplier
        let resolved = resolve_generate_values(&counting(), POI, gv, &ValueMap::new()).unwrap();
        assert_eq!(resolved["signal_rate_multiplier"], 3.0);
        assert_eq!(resolved["background_rate_multiplier"], 2.0);
    }

    #[test]
    fn test_explicit_poi_conflicts() {
        let gv: ValueMap = [
            (POI_EXPECTATION.to_string(), 25.0),
            ("signal_rate_multiplier".to_string(), 1.0),
        ]
        .into();
        assert!(resolve_generate_values(&counting(), POI, gv, &ValueMap::new()).is_err());
    }

    #[test]
    fn test_poi_needs_rate_multiplier_suffix() {
        let gv: ValueMap = [(POI_EXPECTATION.to_string(), 25.0)].into();
        let err = resolve_generate_values(&counting(), "signal", gv, &ValueMap::new()).unwrap_err();
        assert!(err.to_string().contains(RATE_MULTIPLIER_SUFFIX));
    }
}
