//! Toy-data modes and the per-run toy-data generator.

use alea_core::{Dataset, Error, Result, StatisticalModel, ToydataFile, ValueMap};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where the datasets of a run come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToydataMode {
    /// Read stored toy data
    Read,
    /// Generate toy data, do not store it
    Generate,
    /// Generate toy data and store it after the last repetition
    GenerateAndWrite,
    /// No toy data; the model keeps the data it holds
    NoToydata,
}

impl ToydataMode {
    /// Configuration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ToydataMode::Read => "read",
            ToydataMode::Generate => "generate",
            ToydataMode::GenerateAndWrite => "generate_and_write",
            ToydataMode::NoToydata => "no_toydata",
        }
    }

    /// Whether this mode needs a toy-data file
    pub fn needs_file(&self) -> bool {
        matches!(self, ToydataMode::Read | ToydataMode::GenerateAndWrite)
    }
}

impl fmt::Display for ToydataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToydataMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(ToydataMode::Read),
            "generate" => Ok(ToydataMode::Generate),
            "generate_and_write" => Ok(ToydataMode::GenerateAndWrite),
            "no_toydata" => Ok(ToydataMode::NoToydata),
            other => Err(Error::Validation(format!("Unknown toydata mode: {}", other))),
        }
    }
}

/// Produces exactly `n_mc` datasets, one per call to [`ToydataGenerator::next`].
///
/// Toy `i` is drawn with an RNG seeded by `seed + i`, so single repetitions can be
/// reproduced. [`ToydataGenerator::finish`] consumes the generator and stores the
/// accumulated toy data in `generate_and_write` mode.
#[derive(Debug)]
pub struct ToydataGenerator {
    mode: ToydataMode,
    n_mc: usize,
    index: usize,
    path: Option<PathBuf>,
    generate_values: ValueMap,
    seed: u64,
    toydata: Vec<Dataset>,
}

impl ToydataGenerator {
    /// Set up a generator; `read` mode loads the stored toy data here.
    pub fn new(
        mode: ToydataMode,
        n_mc: usize,
        path: Option<PathBuf>,
        generate_values: ValueMap,
        seed: u64,
    ) -> Result<Self> {
        if mode.needs_file() && path.is_none() {
            return Err(Error::Validation(format!("toydata_mode {} needs a toydata_file", mode)));
        }
        let toydata = match (mode, &path) {
            (ToydataMode::Read, Some(path)) => {
                let mut stored = ToydataFile::read(path)?.toydata;
                if stored.len() < n_mc {
                    return Err(Error::InsufficientToydata { stored: stored.len(), n_mc });
                }
                if stored.len() > n_mc {
                    log::warn!(
                        "Number of stored toydata {} is larger than number of Monte Carlo {}.",
                        stored.len(),
                        n_mc
                    );
                    stored.truncate(n_mc);
                }
                stored
            }
            _ => Vec::with_capacity(if mode == ToydataMode::GenerateAndWrite { n_mc } else { 0 }),
        };
        Ok(Self { mode, n_mc, index: 0, path, generate_values, seed, toydata })
    }

    /// Toy-data mode
    pub fn mode(&self) -> ToydataMode {
        self.mode
    }

    /// Number of datasets produced so far
    pub fn produced(&self) -> usize {
        self.index
    }

    /// Dataset of the next repetition (`None` in `no_toydata` mode).
    pub fn next(&mut self, model: &dyn StatisticalModel) -> Result<Option<Dataset>> {
        if self.index >= self.n_mc {
            return Err(Error::Validation(format!(
                "toydata generator already produced all {} datasets",
                self.n_mc
            )));
        }
        let i = self.index;
        self.index += 1;
        match self.mode {
            ToydataMode::Read => Ok(Some(self.toydata[i].clone())),
            ToydataMode::NoToydata => Ok(None),
            ToydataMode::Generate | ToydataMode::GenerateAndWrite => {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                let data = model.generate_data(&self.generate_values, &mut rng)?;
                if self.mode == ToydataMode::GenerateAndWrite {
                    self.toydata.push(data.clone());
                }
                Ok(Some(data))
            }
        }
    }

    /// Finish the pass; stores the toy data in `generate_and_write` mode.
    pub fn finish(self, model: &dyn StatisticalModel) -> Result<()> {
        if self.index != self.n_mc {
            return Err(Error::Validation(format!(
                "toydata generator finished after {} of {} datasets",
                self.index, self.n_mc
            )));
        }
        if let (ToydataMode::GenerateAndWrite, Some(path)) = (self.mode, &self.path) {
            let mut metadata = serde_json::Map::new();
            let generate_values = serde_json::to_value(&self.generate_values)?;
            metadata.insert("generate_values".to_string(), generate_values);
            model.store_data(path, self.toydata, None, metadata)?;
        }
        Ok(())
    }
}
