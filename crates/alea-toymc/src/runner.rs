//! Toy Monte Carlo runner.
//!
//! A [`Runner`] owns one statistical model and drives `n_mc` repetitions of
//! "get toy data -> fit every hypothesis -> record", then writes one result file.
//! All configuration is validated in [`Runner::new`], before any toy data is touched.

use crate::args::RunnerConfig;
use crate::generate_values::{resolve_generate_values, POI_EXPECTATION};
use crate::hypothesis::{resolve_hypotheses, result_names};
use crate::output::{result_columns, ResultFile, ResultRecord, ResultTable};
use crate::toydata::{ToydataGenerator, ToydataMode};
use alea_core::{Error, Result, StatisticalModel, ValueMap};
use alea_inference::{confidence_interval, ConfidenceIntervalConfig, MaximumLikelihoodEstimator};
use alea_models::{load_model_config, ModelArgs, ModelRegistry};

/// Progress observer, called with `(done, total)` after every repetition
pub type ProgressCallback = Box<dyn FnMut(usize, usize)>;

/// Toy Monte Carlo runner.
pub struct Runner {
    config: RunnerConfig,
    model: Box<dyn StatisticalModel>,
    mle: MaximumLikelihoodEstimator,
    interval: ConfidenceIntervalConfig,
    generate_values: ValueMap,
    hypotheses_values: Vec<ValueMap>,
    result_names: Vec<String>,
    columns: Vec<String>,
    seed: u64,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("model", &self.model.name())
            .field("poi", &self.config.poi)
            .field("n_mc", &self.config.n_mc)
            .field("hypotheses_values", &self.hypotheses_values)
            .field("generate_values", &self.generate_values)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Runner {
    /// Build a runner with the built-in models.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        Self::with_registry(config, &ModelRegistry::with_builtin_models())
    }

    /// Build a runner resolving the model kind through `registry`.
    pub fn with_registry(mut config: RunnerConfig, registry: &ModelRegistry) -> Result<Self> {
        if config.n_mc == 0 {
            return Err(Error::Validation("n_mc must be positive".to_string()));
        }
        if config.only_toydata && config.toydata_mode != ToydataMode::GenerateAndWrite {
            return Err(Error::Validation(format!(
                "only_toydata is true, you should only generate_and_write, but toydata_mode is {}",
                config.toydata_mode
            )));
        }
        if config.toydata_mode.needs_file() && config.toydata_file.is_none() {
            return Err(Error::Validation(format!(
                "toydata_mode {} needs a toydata_file",
                config.toydata_mode
            )));
        }
        if !config.only_toydata && config.output_file.is_none() {
            return Err(Error::Validation("output_file is needed unless only_toydata".to_string()));
        }

        if let Some(path) = &config.statistical_model_config {
            let model_config = load_model_config(path)?;
            if config.parameter_definition.is_some() {
                log::warn!(
                    "parameter_definition is overwritten, because statistical_model_config is \
                     provided!"
                );
            }
            if config.likelihood_config.is_some() {
                log::warn!(
                    "likelihood_config is overwritten, because statistical_model_config is \
                     provided!"
                );
            }
            config.parameter_definition = Some(model_config.parameter_definition);
            config.likelihood_config = model_config.likelihood_config;
        }

        let model = registry.create(
            &config.statistical_model,
            &ModelArgs {
                parameter_definition: config.parameter_definition.clone(),
                likelihood_config: config.likelihood_config.clone(),
                nominal_values: config.nominal_values.clone(),
                model_args: config.statistical_model_args.clone(),
            },
        )?;

        model.parameters().require(&config.poi)?;
        for name in config.generate_values.keys().filter(|k| k.as_str() != POI_EXPECTATION) {
            if model.parameters().get(name).is_none() {
                return Err(Error::Validation(format!(
                    "generate_values {:?} names unknown parameter '{}', parameters: {:?}",
                    config.generate_values,
                    name,
                    model.get_parameter_list()
                )));
            }
        }

        let generate_values = resolve_generate_values(
            model.as_ref(),
            &config.poi,
            config.generate_values.clone(),
            &config.nominal_values,
        )?;
        let hypotheses_values = resolve_hypotheses(
            &config.hypotheses,
            &config.poi,
            &config.common_hypothesis,
            &generate_values,
            config.compute_confidence_interval,
        )?;
        let result_names = result_names(&config.hypotheses);
        let columns = result_columns(&model.fittable());

        let interval = ConfidenceIntervalConfig {
            confidence_level: config.confidence_level,
            kind: config.confidence_interval_kind,
            ..Default::default()
        };
        if config.compute_confidence_interval {
            interval.validate()?;
        }

        let seed = match config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                log::info!("no seed given, drawing toy data with seed {}", seed);
                seed
            }
        };

        Ok(Self {
            config,
            model,
            mle: MaximumLikelihoodEstimator::new(),
            interval,
            generate_values,
            hypotheses_values,
            result_names,
            columns,
            seed,
            progress: None,
        })
    }

    /// Observe progress with `(done, total)` after every repetition.
    pub fn set_progress(&mut self, callback: impl FnMut(usize, usize) + 'static) {
        self.progress = Some(Box::new(callback));
    }

    /// Runner configuration as given (model config file already applied)
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The model
    pub fn model(&self) -> &dyn StatisticalModel {
        self.model.as_ref()
    }

    /// Mutable model access, e.g. to load data for `no_toydata` runs
    pub fn model_mut(&mut self) -> &mut dyn StatisticalModel {
        self.model.as_mut()
    }

    /// Generate values after `poi_expectation` resolution
    pub fn generate_values(&self) -> &ValueMap {
        &self.generate_values
    }

    /// Resolved hypotheses, in order
    pub fn hypotheses_values(&self) -> &[ValueMap] {
        &self.hypotheses_values
    }

    /// Result table names, in hypothesis order
    pub fn result_names(&self) -> &[String] {
        &self.result_names
    }

    /// Result columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Base seed of the toy data
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn toydata_generator(&self) -> Result<ToydataGenerator> {
        ToydataGenerator::new(
            self.config.toydata_mode,
            self.config.n_mc,
            self.config.toydata_file.clone(),
            self.generate_values.clone(),
            self.seed,
        )
    }

    fn report_progress(&mut self, done: usize) {
        let total = self.config.n_mc;
        if let Some(callback) = self.progress.as_mut() {
            callback(done, total);
        }
    }

    /// Only produce the toy data (stored in `generate_and_write` mode).
    pub fn simulate(&mut self) -> Result<()> {
        let mut generator = self.toydata_generator()?;
        for i_mc in 0..self.config.n_mc {
            generator.next(self.model.as_ref())?;
            self.report_progress(i_mc + 1);
        }
        generator.finish(self.model.as_ref())
    }

    /// Fit one hypothesis on the current data.
    fn fit_hypothesis(&self, hypothesis: &ValueMap) -> Result<ResultRecord> {
        let fittable = self.model.fittable();
        if let Some(name) = hypothesis.keys().find(|k| !fittable.contains(*k)) {
            return Err(Error::Validation(format!(
                "The hypothesis {:?} should be a subset of the fittable parameters {:?} in the \
                 statistical model, '{}' is not fittable",
                hypothesis, fittable, name
            )));
        }

        let fit = self.mle.fit(self.model.as_ref(), hypothesis)?;
        let free_poi = !hypothesis.contains_key(&self.config.poi);
        let (dl, ul) = if self.config.compute_confidence_interval && free_poi {
            confidence_interval(
                &self.mle,
                self.model.as_ref(),
                &self.config.poi,
                &self.hypotheses_values[0],
                hypothesis,
                &self.interval,
            )?
        } else {
            (f64::NAN, f64::NAN)
        };
        Ok(ResultRecord { values: fit.values, ll: fit.max_ll, dl, ul })
    }

    /// Run every repetition and return one table per hypothesis.
    pub fn simulate_and_fit(&mut self) -> Result<Vec<ResultTable>> {
        let n_mc = self.config.n_mc;
        let mut tables: Vec<ResultTable> = self
            .result_names
            .iter()
            .zip(&self.hypotheses_values)
            .map(|(name, values)| {
                ResultTable::new(name.clone(), values.clone(), self.columns.clone(), n_mc)
            })
            .collect();

        let mut generator = self.toydata_generator()?;
        for i_mc in 0..n_mc {
            let data = generator.next(self.model.as_ref())?;
            self.model.load_dataset(data)?;

            let records = self
                .hypotheses_values
                .iter()
                .map(|hypothesis| self.fit_hypothesis(hypothesis))
                .collect::<Result<Vec<_>>>()?;
            for (table, record) in tables.iter_mut().zip(&records) {
                table.set_row(i_mc, record)?;
            }
            log::debug!("toy {} of {} done", i_mc + 1, n_mc);
            self.report_progress(i_mc + 1);
        }
        generator.finish(self.model.as_ref())?;
        Ok(tables)
    }

    /// Result file for `tables`, with the run metadata attached.
    pub fn result_file(&self, tables: Vec<ResultTable>) -> Result<ResultFile> {
        let mut metadata = self.config.metadata.clone();
        metadata.insert(
            "date".to_string(),
            chrono::Local::now().format("%Y%m%d_%H:%M:%S").to_string().into(),
        );
        metadata.insert("poi".to_string(), self.config.poi.clone().into());
        metadata.insert(
            "common_hypothesis".to_string(),
            serde_json::to_value(&self.config.common_hypothesis)?,
        );
        let generate_values = serde_json::to_value(&self.generate_values)?;
        metadata.insert("generate_values".to_string(), generate_values);
        metadata.insert("seed".to_string(), self.seed.into());
        Ok(ResultFile { metadata, tables })
    }

    /// Write the result file.
    pub fn write_output(&self, tables: Vec<ResultTable>) -> Result<()> {
        let path = self
            .config
            .output_file
            .as_ref()
            .ok_or_else(|| Error::Validation("no output_file configured".to_string()))?;
        self.result_file(tables)?.write(path)
    }

    /// `simulate` for only-toydata runs, else `simulate_and_fit` followed by `write_output`.
    pub fn run(&mut self) -> Result<()> {
        if self.config.only_toydata {
            self.simulate()
        } else {
            let tables = self.simulate_and_fit()?;
            self.write_output(tables)
        }
    }
}
