//! `alea submit`: expand a computation grid into `run-toymc` invocations.
//!
//! A submission config names the model, its config file, the poi and a set of named
//! computations. Each computation combines `to_zip` lists (zipped), `to_vary` lists
//! (Cartesian product) and `in_common` values into runner argument sets; every set becomes
//! one or more tickets (one per batch), each a shell script calling `alea run-toymc`.

use alea_core::StatisticalModel;
use alea_models::{load_model_config, read_config, ModelArgs, ModelRegistry};
use alea_toymc::generate_values::POI_EXPECTATION;
use alea_toymc::{arg_to_str, default_arguments, runner_arguments, str_to_arg, Runner, RunnerConfig};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Arguments fixed by the submission config itself
const SUBMITTER_ARGS: [&str; 3] = ["statistical_model", "statistical_model_config", "poi"];
/// File arguments placed in the output folder and templated per batch
const FILE_ARGS: [&str; 2] = ["output_file", "toydata_file"];

fn default_computation() -> String {
    "discovery_power".to_string()
}

/// One named computation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputationOptions {
    /// Lists of equal length, combined element-wise
    #[serde(default)]
    pub to_zip: Map<String, Value>,
    /// Lists combined as a Cartesian product
    #[serde(default)]
    pub to_vary: Map<String, Value>,
    /// Values shared by every combination
    #[serde(default)]
    pub in_common: Map<String, Value>,
}

/// Submission config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionConfig {
    /// Registered model kind
    pub statistical_model: String,
    /// Model config file, relative paths are resolved next to the submission config
    #[serde(default)]
    pub statistical_model_config: Option<PathBuf>,
    /// Parameter of interest
    pub poi: String,
    /// Named computations
    pub computation_options: BTreeMap<String, ComputationOptions>,
    /// Computation to run
    #[serde(default = "default_computation")]
    pub computation: String,
    /// Folder for result and toy-data files
    #[serde(default)]
    pub outputfolder: Option<PathBuf>,
}

impl SubmissionConfig {
    /// Read a YAML or JSON submission config.
    pub fn read(path: &Path) -> Result<Self> {
        let mut config: Self = read_config(path)
            .with_context(|| format!("failed to load submission config {}", path.display()))?;
        if let Some(model_config) = &config.statistical_model_config {
            if !model_config.exists() {
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                config.statistical_model_config = Some(dir.join(model_config));
            }
        }
        Ok(config)
    }
}

/// Combine `to_zip`, `to_vary` and `in_common` into argument sets.
///
/// Zipped combinations are the outer loop; varied ones follow key order.
pub fn compute_variations(
    to_zip: &Map<String, Value>,
    to_vary: &Map<String, Value>,
    in_common: &Map<String, Value>,
) -> Result<Vec<Map<String, Value>>> {
    let lists = |section: &str, map: &Map<String, Value>| -> Result<Vec<(String, Vec<Value>)>> {
        map.iter()
            .map(|(k, v)| match v {
                Value::Array(items) => Ok((k.clone(), items.clone())),
                other => bail!("{}.{} should be a list, got {}", section, k, other),
            })
            .collect()
    };
    for key in to_zip.keys().chain(to_vary.keys()) {
        if in_common.contains_key(key) || (to_zip.contains_key(key) && to_vary.contains_key(key)) {
            bail!("argument '{}' is given in more than one of to_zip, to_vary, in_common", key);
        }
    }

    let zip_lists = lists("to_zip", to_zip)?;
    let n_zip = match zip_lists.first() {
        Some((_, first)) => first.len(),
        None => 1,
    };
    if let Some((k, v)) = zip_lists.iter().find(|(_, v)| v.len() != n_zip) {
        bail!("all to_zip lists need the same length {}, but {} has {}", n_zip, k, v.len());
    }
    let zipped: Vec<Map<String, Value>> = (0..n_zip)
        .map(|i| zip_lists.iter().map(|(k, v)| (k.clone(), v[i].clone())).collect())
        .collect();

    let mut varied: Vec<Map<String, Value>> = vec![Map::new()];
    for (key, items) in lists("to_vary", to_vary)? {
        let (key, items) = (&key, &items);
        varied = varied
            .into_iter()
            .flat_map(|partial| {
                items.iter().map(move |item| {
                    let mut next = partial.clone();
                    next.insert(key.clone(), item.clone());
                    next
                })
            })
            .collect();
    }

    let mut variations = Vec::with_capacity(zipped.len() * varied.len());
    for z in &zipped {
        for v in &varied {
            let mut combination = z.clone();
            combination.extend(v.clone());
            combination.extend(in_common.clone());
            variations.push(combination);
        }
    }
    Ok(variations)
}

/// Insert `_{i_batch}` before the file extension.
pub fn add_i_batch(filename: &str) -> String {
    let name_start = filename.rfind('/').map_or(0, |i| i + 1);
    match filename[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = name_start + dot;
            format!("{}_{{i_batch}}{}", &filename[..dot], &filename[dot..])
        }
        _ => format!("{}_{{i_batch}}", filename),
    }
}

fn render_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fill `{key}` placeholders from `fields`; `{{` and `}}` are literal braces.
pub fn format_template(template: &str, fields: &Map<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let key: String = chars.by_ref().take_while(|&c| c != '}').collect();
                let value = fields.get(&key).ok_or_else(|| {
                    anyhow!(
                        "key '{}' of {} is not in the provided arguments {:?}",
                        key,
                        template,
                        fields.keys().collect::<Vec<_>>()
                    )
                })?;
                out.push_str(&render_field(value));
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Runner arguments of one grid point, before batching.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedArguments {
    /// Complete runner arguments (`n_mc` already divided by `n_batch`)
    pub arguments: Map<String, Value>,
    /// Number of batches
    pub n_batch: usize,
}

/// One job: the script and its output file.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    /// Shell command line
    pub script: String,
    /// Complete runner arguments of this job
    pub arguments: Map<String, Value>,
    /// Result file of this job
    pub output_file: Option<String>,
}

/// Expands one computation of a submission config.
#[derive(Debug)]
pub struct Submitter {
    config: SubmissionConfig,
    computation: ComputationOptions,
    outputfolder: PathBuf,
    fittable: Vec<String>,
    not_fittable: Vec<String>,
    executable: String,
    debug: bool,
}

impl Submitter {
    /// Resolve the computation, create the output folder and classify the model parameters.
    pub fn new(config: SubmissionConfig, debug: bool) -> Result<Self> {
        let computation =
            config.computation_options.get(&config.computation).cloned().ok_or_else(|| {
                anyhow!(
                    "computation '{}' not in computation_options {:?}",
                    config.computation,
                    config.computation_options.keys().collect::<Vec<_>>()
                )
            })?;

        let outputfolder =
            config.outputfolder.clone().ok_or_else(|| anyhow!("outputfolder is not provided"))?;
        std::fs::create_dir_all(&outputfolder)
            .with_context(|| format!("failed to create outputfolder {}", outputfolder.display()))?;
        let outputfolder = std::fs::canonicalize(&outputfolder)?;

        let mut args = ModelArgs::default();
        if let Some(path) = &config.statistical_model_config {
            let model_config = load_model_config(path)?;
            args.parameter_definition = Some(model_config.parameter_definition);
            args.likelihood_config = model_config.likelihood_config;
        }
        let model = build_model(&config.statistical_model, &args)?;
        let mut fittable = model.fittable();
        fittable.push(POI_EXPECTATION.to_string());
        let not_fittable = model.not_fittable();

        Ok(Self {
            config,
            computation,
            outputfolder,
            fittable,
            not_fittable,
            executable: "alea".to_string(),
            debug,
        })
    }

    /// Program used in scripts (default `alea`)
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Absolute output folder
    pub fn outputfolder(&self) -> &Path {
        &self.outputfolder
    }

    fn common_runner_args(&self) -> Map<String, Value> {
        let model_config = match &self.config.statistical_model_config {
            Some(path) => Value::String(path.to_string_lossy().into_owned()),
            None => Value::Null,
        };
        let mut common = Map::new();
        common.insert("statistical_model".into(), self.config.statistical_model.clone().into());
        common.insert("statistical_model_config".into(), model_config);
        common.insert("poi".into(), self.config.poi.clone().into());
        common
    }

    /// Runner arguments of every grid point.
    pub fn merged_arguments(&self) -> Result<Vec<MergedArguments>> {
        let variations = compute_variations(
            &self.computation.to_zip,
            &self.computation.to_vary,
            &self.computation.in_common,
        )?;
        let mut merged = Vec::with_capacity(variations.len());
        for variation in variations {
            if let Some(key) = SUBMITTER_ARGS.iter().find(|k| variation.contains_key(**k)) {
                bail!(
                    "{} is given in computation_options, but it is already set by the submitter",
                    key
                );
            }
            let mut arguments = default_arguments();
            arguments.extend(variation);
            arguments.extend(self.common_runner_args());

            let n_batch = self.update_n_batch(&mut arguments)?;
            self.update_output_files(&mut arguments, n_batch.is_some());
            self.update_runner_values(&mut arguments)?;

            let known: Vec<&str> = runner_arguments().iter().map(|a| a.name).collect();
            if let Some(unknown) = arguments.keys().find(|k| !known.contains(&k.as_str())) {
                bail!(
                    "argument '{}' is not a runner argument, known arguments: {:?}",
                    unknown,
                    known
                );
            }
            merged.push(MergedArguments { arguments, n_batch: n_batch.unwrap_or(1) });
        }
        Ok(merged)
    }

    fn update_n_batch(&self, arguments: &mut Map<String, Value>) -> Result<Option<usize>> {
        let Some(n_batch) = arguments.remove("n_batch") else {
            return Ok(None);
        };
        let n_batch = n_batch
            .as_u64()
            .filter(|&n| n > 0)
            .ok_or_else(|| anyhow!("n_batch must be a positive integer, got {}", n_batch))?;
        let n_mc = arguments
            .get("n_mc")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("n_mc must be an integer when n_batch is given"))?;
        if n_mc % n_batch != 0 {
            bail!("n_mc {} must be divisible by n_batch {}", n_mc, n_batch);
        }
        arguments.insert("n_mc".into(), (n_mc / n_batch).into());
        Ok(Some(n_batch as usize))
    }

    fn update_output_files(&self, arguments: &mut Map<String, Value>, batched: bool) {
        for name in FILE_ARGS {
            let Some(Value::String(file)) = arguments.get(name) else {
                continue;
            };
            let file = if batched { add_i_batch(file) } else { file.clone() };
            let path = self.outputfolder.join(file);
            arguments.insert(name.into(), path.to_string_lossy().into_owned().into());
        }
    }

    /// Move top-level parameter values into `generate_values` (fittable) or
    /// `nominal_values` (not fittable).
    fn update_runner_values(&self, arguments: &mut Map<String, Value>) -> Result<()> {
        let mut section = |name: &str| -> Result<Map<String, Value>> {
            match arguments.remove(name) {
                None | Some(Value::Null) => Ok(Map::new()),
                Some(Value::Object(map)) => Ok(map),
                Some(other) => bail!("{} should be a map, got {}", name, other),
            }
        };
        let mut generate_values = section("generate_values")?;
        let mut nominal_values = section("nominal_values")?;

        let keys: Vec<String> = arguments.keys().cloned().collect();
        for key in keys {
            if self.fittable.contains(&key) {
                if let Some(v) = arguments.remove(&key) {
                    generate_values.insert(key, v);
                }
            } else if self.not_fittable.contains(&key) {
                if let Some(v) = arguments.remove(&key) {
                    nominal_values.insert(key, v);
                }
            }
        }
        if let Some(k) = generate_values.keys().find(|k| !self.fittable.contains(k)) {
            bail!(
                "generate_values {:?} should be a subset of the fittable parameters {:?}, \
                 '{}' is not",
                generate_values,
                self.fittable,
                k
            );
        }
        let checked = [("generate_values", &generate_values), ("nominal_values", &nominal_values)];
        for (name, values) in checked {
            if !values.values().all(Value::is_number) {
                bail!("{} {:?} should all be numbers", name, values);
            }
        }
        arguments.insert("generate_values".into(), Value::Object(generate_values));
        arguments.insert("nominal_values".into(), Value::Object(nominal_values));
        Ok(())
    }

    /// One ticket per batch of every grid point; in debug mode only the first.
    pub fn computation_tickets(&self) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();
        for merged in self.merged_arguments()? {
            for i_batch in 0..merged.n_batch {
                let mut arguments = merged.arguments.clone();
                let mut fields = Map::new();
                fields.insert("i_batch".into(), i_batch.into());
                for section in ["nominal_values", "generate_values"] {
                    if let Some(Value::Object(values)) = arguments.get(section) {
                        fields.extend(values.clone());
                    }
                }
                for name in FILE_ARGS {
                    if let Some(Value::String(template)) = arguments.get(name) {
                        let file = format_template(template, &fields)
                            .with_context(|| format!("please check {}", name))?;
                        arguments.insert(name.into(), file.into());
                    }
                }
                let script = self.script(&arguments)?;
                let output_file =
                    arguments.get("output_file").and_then(Value::as_str).map(str::to_string);
                tickets.push(Ticket { script, arguments, output_file });
                if self.debug {
                    tracing::info!("debug mode, only the first ticket is kept");
                    return Ok(tickets);
                }
            }
        }
        Ok(tickets)
    }

    fn script(&self, arguments: &Map<String, Value>) -> Result<String> {
        let mut words = vec![self.executable.clone(), "run-toymc".to_string()];
        for spec in runner_arguments() {
            let value = arguments.get(spec.name).unwrap_or(&Value::Null);
            words.push(format!("--{}", spec.name));
            words.push(arg_to_str(value, spec.kind)?);
        }
        shlex::try_join(words.iter().map(String::as_str))
            .map_err(|e| anyhow!("cannot quote script: {}", e))
    }
}

fn build_model(kind: &str, args: &ModelArgs) -> Result<Box<dyn StatisticalModel>> {
    ModelRegistry::with_builtin_models()
        .create(kind, args)
        .with_context(|| format!("failed to build model '{}' to classify its parameters", kind))
}

/// Parse `--name value` pairs of a ticket script back into runner arguments.
pub fn parse_script_arguments(script: &str) -> Result<Map<String, Value>> {
    let words = shlex::split(script).ok_or_else(|| anyhow!("cannot split script: {}", script))?;
    let start = words
        .iter()
        .position(|w| w == "run-toymc")
        .ok_or_else(|| anyhow!("script does not call run-toymc: {}", script))?;
    let mut arguments = Map::new();
    let mut rest = words[start + 1..].iter();
    while let Some(flag) = rest.next() {
        let name =
            flag.strip_prefix("--").ok_or_else(|| anyhow!("expected --<argument>, got {}", flag))?;
        let spec = alea_toymc::runner_argument(name)
            .ok_or_else(|| anyhow!("unknown runner argument --{}", name))?;
        let text = rest.next().ok_or_else(|| anyhow!("--{} needs a value", name))?;
        arguments.insert(name.to_string(), str_to_arg(text, spec.kind)?);
    }
    Ok(arguments)
}

/// Run a ticket in this process.
pub fn execute_ticket(ticket: &Ticket) -> Result<()> {
    let arguments = parse_script_arguments(&ticket.script)?;
    let config = RunnerConfig::from_arguments(&arguments)?;
    let mut runner = Runner::new(config)?;
    runner.set_progress(|done, total| tracing::debug!("toy {}/{}", done, total));
    runner.run()?;
    Ok(())
}
