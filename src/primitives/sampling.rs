use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};

use crate::error::DealEngineError;
use crate::DealEngineResult;

/// Probability distribution specification for sampled inputs.
/// Sampling works in f64; decimal precision applies to deterministic
/// scenario math only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DistributionSpec {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

fn sample_one(rng: &mut StdRng, spec: &DistributionSpec) -> DealEngineResult<f64> {
    match spec {
        DistributionSpec::Normal { mean, std_dev } => {
            let n = Normal::new(*mean, *std_dev).map_err(|e| DealEngineError::InvalidAssumption {
                field: "normal".into(),
                reason: e.to_string(),
            })?;
            Ok(rng.sample(n))
        }
        DistributionSpec::LogNormal { mu, sigma } => {
            let ln = LogNormal::new(*mu, *sigma).map_err(|e| DealEngineError::InvalidAssumption {
                field: "lognormal".into(),
                reason: e.to_string(),
            })?;
            Ok(rng.sample(ln))
        }
        DistributionSpec::Triangular { min, mode, max } => {
            let t =
                Triangular::new(*min, *max, *mode).map_err(|e| DealEngineError::InvalidAssumption {
                    field: "triangular".into(),
                    reason: e.to_string(),
                })?;
            Ok(rng.sample(t))
        }
        DistributionSpec::Uniform { min, max } => {
            let u = Uniform::new(*min, *max).map_err(|e| DealEngineError::InvalidAssumption {
                field: "uniform".into(),
                reason: e.to_string(),
            })?;
            Ok(rng.sample(u))
        }
    }
}

/// A finite, seeded, restartable stream of samples.
///
/// Restarting with the same seed reproduces the identical sequence, which
/// keeps the acceptance scorer's sampled mode testable.
pub struct SampleStream {
    spec: DistributionSpec,
    n: usize,
    seed: u64,
    rng: StdRng,
    emitted: usize,
}

impl SampleStream {
    pub fn new(spec: DistributionSpec, n: usize, seed: u64) -> Self {
        SampleStream {
            spec,
            n,
            seed,
            rng: StdRng::seed_from_u64(seed),
            emitted: 0,
        }
    }

    /// Rewind to the start of the same sequence.
    pub fn restart(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.emitted = 0;
    }

    pub fn remaining(&self) -> usize {
        self.n - self.emitted
    }
}

impl Iterator for SampleStream {
    type Item = DealEngineResult<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.emitted >= self.n {
            return None;
        }
        self.emitted += 1;
        Some(sample_one(&mut self.rng, &self.spec))
    }
}
