//! Deterministic stand-in data for when every other tier is empty.
//!
//! Every generator seeds its RNG from the SHA-256 of the cache key, so the same
//! key always yields the same value and nothing needs to be stored.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use cardiovar_core::{DataKind, SourceKey};

/// Synthetic-data seam used by the source chain.
pub trait SyntheticSource: Send + Sync {
    fn generate(&self, kind: DataKind, key: &SourceKey) -> Option<Value>;
}

impl<F> SyntheticSource for F
where
    F: Fn(DataKind, &SourceKey) -> Option<Value> + Send + Sync,
{
    fn generate(&self, kind: DataKind, key: &SourceKey) -> Option<Value> {
        self(kind, key)
    }
}

/// RNG seeded from the SHA-256 digest of `seed`.
pub fn seeded_rng(seed: &str) -> StdRng {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    StdRng::from_seed(bytes)
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1].
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Rare-variant allele frequency, uniform in `[low, high)`.
#[derive(Debug, Clone, Copy)]
pub struct AlleleFrequencySynth {
    pub low: f64,
    pub high: f64,
}

impl Default for AlleleFrequencySynth {
    fn default() -> Self {
        Self { low: 1e-5, high: 1e-4 }
    }
}

impl SyntheticSource for AlleleFrequencySynth {
    fn generate(&self, kind: DataKind, key: &SourceKey) -> Option<Value> {
        let mut rng = seeded_rng(&key.cache_key(kind));
        Some(Value::from(rng.gen_range(self.low..self.high)))
    }
}

/// Per-base conservation scores for a region: `N(mean, sd)` noise with a
/// conserved block of `core_width` bases around the midpoint.
#[derive(Debug, Clone, Copy)]
pub struct ConservationSynth {
    pub mean: f64,
    pub sd: f64,
    pub core_boost: f64,
    pub core_width: u64,
    pub max_len: u64,
}

impl Default for ConservationSynth {
    fn default() -> Self {
        Self {
            mean: 0.5,
            sd: 1.0,
            core_boost: 2.0,
            core_width: 20,
            max_len: 1_000_000,
        }
    }
}

impl SyntheticSource for ConservationSynth {
    fn generate(&self, kind: DataKind, key: &SourceKey) -> Option<Value> {
        let start = key.part_u64(1).ok()?;
        let end = key.part_u64(2).ok()?;
        let len = end.checked_sub(start).filter(|l| *l > 0 && *l <= self.max_len)?;

        let mut rng = seeded_rng(&key.cache_key(kind));
        let centre = len / 2;
        let half = self.core_width / 2;
        let core = centre.saturating_sub(half)..(centre + half).min(len);

        let scores = (0..len)
            .map(|i| {
                let mut score = self.mean + self.sd * standard_normal(&mut rng);
                if core.contains(&i) {
                    score += self.core_boost;
                }
                round(score, 3)
            })
            .collect::<Vec<_>>();
        Some(json!(scores))
    }
}

/// GTEx-style tissue profile; cardiac tissues dominate.
#[derive(Debug, Clone)]
pub struct TissueExpressionSynth {
    pub tissues: Vec<(&'static str, bool)>,
    /// TPM per unit of relative weight.
    pub scale: f64,
}

impl Default for TissueExpressionSynth {
    fn default() -> Self {
        Self {
            tissues: vec![
                ("Heart - Left Ventricle", true),
                ("Heart - Atrial Appendage", true),
                ("Artery - Aorta", true),
                ("Artery - Coronary", true),
                ("Muscle - Skeletal", false),
                ("Liver", false),
                ("Lung", false),
                ("Brain - Cortex", false),
                ("Whole Blood", false),
            ],
            scale: 100.0,
        }
    }
}

impl SyntheticSource for TissueExpressionSynth {
    fn generate(&self, kind: DataKind, key: &SourceKey) -> Option<Value> {
        let mut rng = seeded_rng(&key.cache_key(kind));
        let rows = self
            .tissues
            .iter()
            .map(|(tissue, cardiac)| {
                let weight = if *cardiac {
                    rng.gen_range(0.7..1.2)
                } else {
                    rng.gen_range(0.05..0.35)
                };
                json!({ "tissue": tissue, "tpm": round(weight * self.scale, 2) })
            })
            .collect::<Vec<_>>();
        Some(Value::Array(rows))
    }
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
