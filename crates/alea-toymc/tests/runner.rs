use alea_core::{DataArray, Dataset, Error, ToydataFile, ValueMap};
use alea_toymc::{Hypothesis, ResultFile, Runner, RunnerConfig, ToydataMode};
use approx::assert_relative_eq;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("alea_runner_{}_{}_{}", std::process::id(), nanos, filename))
}

fn values(pairs: &[(&str, f64)]) -> ValueMap {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Gaussian runner with sigma held at 2 in every fit.
fn gaussian_config(hypotheses: Vec<Hypothesis>) -> RunnerConfig {
    RunnerConfig {
        hypotheses,
        generate_values: values(&[("mu", 0.0), ("sigma", 2.0)]),
        common_hypothesis: values(&[("sigma", 2.0)]),
        toydata_mode: ToydataMode::Generate,
        toydata_file: None,
        output_file: Some(tmp_path("out.json")),
        seed: Some(1),
        ..Default::default()
    }
}

fn counting_config() -> RunnerConfig {
    RunnerConfig {
        statistical_model: "counting".to_string(),
        poi: "signal_rate_multiplier".to_string(),
        hypotheses: vec![Hypothesis::Free, Hypothesis::Null],
        generate_values: values(&[("signal_rate_multiplier", 1.0)]),
        common_hypothesis: values(&[("background_rate_multiplier", 1.0)]),
        toydata_mode: ToydataMode::Generate,
        toydata_file: None,
        output_file: Some(tmp_path("counting.json")),
        seed: Some(5),
        ..Default::default()
    }
}

#[test]
fn generate_values_unchanged_without_poi_expectation() {
    let runner = Runner::new(gaussian_config(vec![Hypothesis::Free])).unwrap();
    assert_eq!(runner.generate_values(), &values(&[("mu", 0.0), ("sigma", 2.0)]));
}

#[test]
fn poi_expectation_resolves_to_ratio() {
    let mut config = counting_config();
    config.generate_values = values(&[("poi_expectation", 25.0)]);
    let runner = Runner::new(config).unwrap();
    assert_eq!(runner.generate_values(), &values(&[("signal_rate_multiplier", 2.5)]));
}

#[test]
fn poi_expectation_with_explicit_poi_fails() {
    let mut config = counting_config();
    config.generate_values = values(&[("poi_expectation", 25.0), ("signal_rate_multiplier", 1.0)]);
    assert!(matches!(Runner::new(config), Err(Error::Validation(_))));
}

#[test]
fn poi_expectation_needs_rate_multiplier_poi() {
    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.generate_values = values(&[("poi_expectation", 25.0)]);
    assert!(Runner::new(config).is_err());
}

#[test]
fn hypothesis_order_is_checked() {
    assert!(Runner::new(gaussian_config(vec![Hypothesis::Null, Hypothesis::Free])).is_err());

    let mut config = gaussian_config(vec![Hypothesis::Free, Hypothesis::Null]);
    config.common_hypothesis.clear();
    let runner = Runner::new(config).unwrap();
    assert_eq!(runner.hypotheses_values(), &[ValueMap::new(), values(&[("mu", 0.0)])]);
    assert_eq!(runner.result_names(), &["free".to_string(), "null".to_string()]);
}

#[test]
fn confidence_interval_needs_free_hypothesis() {
    let mut config = gaussian_config(vec![Hypothesis::Null]);
    config.compute_confidence_interval = true;
    assert!(Runner::new(config).is_err());
}

#[test]
fn only_toydata_needs_generate_and_write() {
    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.only_toydata = true;
    let err = Runner::new(config).unwrap_err();
    assert!(err.to_string().contains("only_toydata"));
}

#[test]
fn configuration_errors() {
    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.statistical_model = "blueice".to_string();
    assert!(matches!(Runner::new(config), Err(Error::UnknownModel { .. })));

    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.n_mc = 0;
    assert!(Runner::new(config).is_err());

    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.poi = "tau".to_string();
    assert!(Runner::new(config).is_err());

    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.generate_values.insert("tau".to_string(), 1.0);
    assert!(Runner::new(config).is_err());

    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.toydata_mode = ToydataMode::Read;
    assert!(Runner::new(config).is_err());
}

#[test]
fn two_hypotheses_give_two_tables() {
    let config = gaussian_config(vec![Hypothesis::Free, Hypothesis::Null]);
    let mut runner = Runner::new(config).unwrap();
    let tables = runner.simulate_and_fit().unwrap();
    assert_eq!(tables.len(), 2);
    for table in &tables {
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns, vec!["mu", "sigma", "ll", "dl", "ul"]);
        assert!(table.column("ll").unwrap().iter().all(|ll| ll.is_finite()));
        assert!(table.column("dl").unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(table.column("sigma").unwrap(), vec![2.0; 3]);
    }
    assert_eq!(tables[1].column("mu").unwrap(), vec![0.0; 3]);
}

#[test]
fn same_seed_same_results() {
    let run = || {
        let mut runner = Runner::new(gaussian_config(vec![Hypothesis::Free])).unwrap();
        runner.simulate_and_fit().unwrap()
    };
    assert_eq!(run()[0].column("mu"), run()[0].column("mu"));
}

#[test]
fn read_mode_uses_first_n_mc_toys() {
    let toys = tmp_path("toys.json");

    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.n_mc = 4;
    config.toydata_mode = ToydataMode::GenerateAndWrite;
    config.toydata_file = Some(toys.clone());
    config.only_toydata = true;
    config.output_file = None;
    Runner::new(config).unwrap().run().unwrap();
    let stored = ToydataFile::read(&toys).unwrap();
    assert_eq!(stored.len(), 4);

    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.n_mc = 2;
    config.toydata_mode = ToydataMode::Read;
    config.toydata_file = Some(toys.clone());
    let tables = Runner::new(config).unwrap().simulate_and_fit().unwrap();
    let mu = tables[0].column("mu").unwrap();
    for (i, fitted) in mu.iter().enumerate() {
        let measurement = stored.toydata[i].require_array("gaussian").unwrap();
        let hat_mu = measurement.value("hat_mu", 0).unwrap();
        assert_relative_eq!(*fitted, hat_mu, epsilon = 1e-4);
    }

    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.n_mc = 5;
    config.toydata_mode = ToydataMode::Read;
    config.toydata_file = Some(toys.clone());
    let err = Runner::new(config).unwrap().simulate_and_fit().unwrap_err();
    assert!(matches!(err, Error::InsufficientToydata { stored: 4, n_mc: 5 }));

    std::fs::remove_file(&toys).unwrap();
}

#[test]
fn gaussian_end_to_end_without_toydata() {
    let output = tmp_path("e2e.json");
    let mut config = gaussian_config(vec![Hypothesis::Free, Hypothesis::Null]);
    config.n_mc = 1;
    config.toydata_mode = ToydataMode::NoToydata;
    config.output_file = Some(output.clone());
    config.metadata.insert("campaign".to_string(), serde_json::json!("test"));
    let mut runner = Runner::new(config).unwrap();

    let hat_mu = 0.8;
    let data = Dataset::new(vec![DataArray::new("gaussian").with_column("hat_mu", vec![hat_mu])]);
    runner.model_mut().load_dataset(Some(data)).unwrap();
    runner.run().unwrap();

    let file = ResultFile::read(&output).unwrap();
    std::fs::remove_file(&output).unwrap();
    assert_eq!(file.names(), vec!["free", "null"]);
    let free = file.table("free").unwrap();
    let null = file.table("null").unwrap();
    assert_eq!((free.len(), null.len()), (1, 1));
    assert_relative_eq!(free.value(0, "mu").unwrap(), hat_mu, epsilon = 1e-4);
    assert_eq!(null.value(0, "mu"), Some(0.0));
    assert!(null.value(0, "ll").unwrap().is_finite());
    assert!(free.value(0, "ll").unwrap() >= null.value(0, "ll").unwrap());

    assert_eq!(null.hypotheses_values, values(&[("mu", 0.0), ("sigma", 2.0)]));
    assert_eq!(file.metadata["poi"], "mu");
    assert_eq!(file.metadata["campaign"], "test");
    assert_eq!(file.metadata["seed"], 1);
    assert_eq!(file.metadata["common_hypothesis"], serde_json::json!({"sigma": 2.0}));
    assert_eq!(file.metadata["generate_values"], serde_json::json!({"mu": 0.0, "sigma": 2.0}));
    assert!(file.metadata.contains_key("date"));
}

#[test]
fn gaussian_end_to_end_with_free_sigma() {
    let output = tmp_path("e2e_free_sigma.json");
    let mut config = gaussian_config(vec![Hypothesis::Free, Hypothesis::Null]);
    config.common_hypothesis.clear();
    config.n_mc = 1;
    config.toydata_mode = ToydataMode::NoToydata;
    config.output_file = Some(output.clone());
    let mut runner = Runner::new(config).unwrap();

    let data = Dataset::new(vec![DataArray::new("gaussian").with_column("hat_mu", vec![0.8])]);
    runner.model_mut().load_dataset(Some(data)).unwrap();
    runner.run().unwrap();

    let file = ResultFile::read(&output).unwrap();
    std::fs::remove_file(&output).unwrap();
    let free = file.table("free").unwrap();
    let null = file.table("null").unwrap();
    assert_eq!((free.len(), null.len()), (1, 1));
    assert_relative_eq!(free.value(0, "mu").unwrap(), 0.8, epsilon = 1e-3);
    assert!(free.value(0, "ll").unwrap().is_finite());
    assert_eq!(null.value(0, "mu"), Some(0.0));
    assert_relative_eq!(null.value(0, "sigma").unwrap(), 0.8, epsilon = 1e-3);
    assert!(null.value(0, "ll").unwrap().is_finite());
    assert_eq!(null.hypotheses_values, values(&[("mu", 0.0)]));
}

#[test]
fn default_config_runs_in_generate_mode() {
    let output = tmp_path("defaults.json");
    let config = RunnerConfig {
        toydata_mode: ToydataMode::Generate,
        output_file: Some(output.clone()),
        ..Default::default()
    };
    Runner::new(config).unwrap().run().unwrap();

    let file = ResultFile::read(&output).unwrap();
    std::fs::remove_file(&output).unwrap();
    let free = file.table("free").unwrap();
    assert_eq!(free.len(), 3);
    assert!(free.column("ll").unwrap().iter().all(|ll| ll.is_finite()));
}

#[test]
fn hypothesis_on_non_fittable_parameter_fails_when_used() {
    let definition = serde_json::json!({
        "mu": {"nominal_value": 0.0},
        "sigma": {"nominal_value": 2.0, "fittable": false}
    });
    let mut config = gaussian_config(vec![
        Hypothesis::Free,
        Hypothesis::Explicit(values(&[("sigma", 1.0)])),
    ]);
    config.common_hypothesis.clear();
    config.parameter_definition = Some(serde_json::from_value(definition).unwrap());
    let mut runner = Runner::new(config).unwrap();
    assert_eq!(runner.columns(), &["mu", "ll", "dl", "ul"]);

    let err = runner.simulate_and_fit().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("sigma"));
    assert!(message.contains("fittable"));
}

#[test]
fn counting_confidence_intervals() {
    let mut config = counting_config();
    config.n_mc = 2;
    config.compute_confidence_interval = true;
    config.confidence_level = 0.9;
    let mut runner = Runner::new(config).unwrap();

    let done = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&done);
    runner.set_progress(move |i, n| seen.borrow_mut().push((i, n)));

    let tables = runner.simulate_and_fit().unwrap();
    assert_eq!(*done.borrow(), vec![(1, 2), (2, 2)]);
    assert_eq!(
        tables[0].columns,
        vec!["background_rate_multiplier", "signal_rate_multiplier", "ll", "dl", "ul"]
    );
    for i in 0..2 {
        let (mu, dl, ul) = (
            tables[0].value(i, "signal_rate_multiplier").unwrap(),
            tables[0].value(i, "dl").unwrap(),
            tables[0].value(i, "ul").unwrap(),
        );
        assert!(dl.is_finite() && ul.is_finite());
        assert!(dl <= mu && mu <= ul, "{dl} <= {mu} <= {ul}");
        assert!(ul < 50.0);
        // the null hypothesis fixes the poi: no interval
        assert!(tables[1].value(i, "dl").unwrap().is_nan());
        assert!(tables[1].value(i, "ul").unwrap().is_nan());
    }
}

#[test]
fn model_config_file_overrides_definition() {
    let model_config = tmp_path("gaussian.yaml");
    std::fs::write(
        &model_config,
        "parameter_definition:
  mu:
    nominal_value: 0.0
    fit_limits: [-5.0, 5.0]
  sigma:
    nominal_value: 2.0
    fittable: false
likelihood_config: null
",
    )
    .unwrap();
    let mut config = gaussian_config(vec![Hypothesis::Free]);
    config.common_hypothesis.clear();
    config.statistical_model_config = Some(model_config.clone());
    config.parameter_definition = Some(alea_core::ParameterDefinition::Names(vec!["mu".into()]));
    let runner = Runner::new(config).unwrap();
    std::fs::remove_file(&model_config).unwrap();

    let mu = runner.model().parameters().get("mu").unwrap();
    assert_eq!(mu.fit_limits, Some((Some(-5.0), Some(5.0))));
    assert_eq!(runner.model().fittable(), vec!["mu"]);
}

#[test]
fn output_file_is_only_written_after_a_complete_run() {
    let output = tmp_path("never.json");
    let tau = Hypothesis::Explicit(values(&[("tau", 1.0)]));
    let mut config = gaussian_config(vec![Hypothesis::Free, tau]);
    config.output_file = Some(output.clone());
    let mut runner = Runner::new(config).unwrap();
    assert!(runner.run().is_err());
    assert!(!output.exists());
}
