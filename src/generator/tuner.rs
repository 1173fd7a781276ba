//! Hyperparameter proposals around a known-good configuration

use crate::pipeline::{round_significant, HyperparameterRange, Hyperparameters, ParamValue};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

/// Fraction of a range used as the standard deviation of local moves
const PERTURBATION_SCALE: f64 = 0.1;

/// Proposes hyperparameter variants: either a fresh uniform sample or a
/// Gaussian step away from the incumbent.
#[derive(Debug, Clone)]
pub struct Tuner {
    exploration: f64,
}

impl Tuner {
    /// `exploration` is the probability of a fresh sample instead of a local move
    pub fn new(exploration: f64) -> Self {
        Self {
            exploration: exploration.clamp(0.0, 1.0),
        }
    }

    /// A variant of `incumbent` over `ranges`; keys without a range are copied unchanged
    pub fn propose(
        &self,
        incumbent: &Hyperparameters,
        ranges: &BTreeMap<String, HyperparameterRange>,
        rng: &mut impl Rng,
    ) -> Hyperparameters {
        let explore = rng.gen::<f64>() < self.exploration;
        let mut proposal = incumbent.clone();
        for (name, range) in ranges {
            let value = match incumbent.get(name) {
                Some(current) if !explore && range.contains(current) => perturb(current, range, rng),
                _ => range.sample(rng),
            };
            proposal.insert(name.clone(), value);
        }
        proposal
    }
}

fn gaussian(rng: &mut impl Rng, std_dev: f64) -> f64 {
    match Normal::new(0.0, std_dev) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}

fn perturb(current: &ParamValue, range: &HyperparameterRange, rng: &mut impl Rng) -> ParamValue {
    match (range, current) {
        (HyperparameterRange::Float { low, high, log_scale }, value) => {
            let v = value.as_f64().unwrap_or(*low);
            let moved = if *log_scale {
                let span = high.ln() - low.ln();
                (v.ln() + gaussian(rng, PERTURBATION_SCALE * span)).exp()
            } else {
                v + gaussian(rng, PERTURBATION_SCALE * (high - low))
            };
            ParamValue::Float(round_significant(moved).clamp(*low, *high))
        }
        (HyperparameterRange::Int { low, high }, ParamValue::Int(v)) => {
            let spread = PERTURBATION_SCALE * (high - low) as f64;
            let step = (gaussian(rng, spread).abs().round() as i64).max(1);
            let moved = if rng.gen_bool(0.5) { v + step } else { v - step };
            ParamValue::Int(moved.clamp(*low, *high))
        }
        _ => range.sample(rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::hyperparameters;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ranges() -> BTreeMap<String, HyperparameterRange> {
        [
            ("alpha".to_string(), HyperparameterRange::log_float(1e-4, 10.0)),
            ("depth".to_string(), HyperparameterRange::int(1, 12)),
            ("weights".to_string(), HyperparameterRange::categorical(["uniform", "distance"])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_proposals_stay_in_range() {
        let incumbent = hyperparameters([
            ("alpha", ParamValue::Float(9.9)),
            ("depth", ParamValue::Int(12)),
            ("weights", ParamValue::from("uniform")),
        ]);
        let ranges = ranges();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for exploration in [0.0, 0.5, 1.0] {
            let tuner = Tuner::new(exploration);
            for _ in 0..100 {
                let proposal = tuner.propose(&incumbent, &ranges, &mut rng);
                for (name, range) in &ranges {
                    assert!(range.contains(&proposal[name]), "{} = {:?}", name, proposal[name]);
                }
            }
        }
    }

    #[test]
    fn test_unranged_keys_are_kept() {
        let incumbent = hyperparameters([("alpha", ParamValue::Float(0.1)), ("fixed", ParamValue::Int(7))]);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let proposal = Tuner::new(0.0).propose(&incumbent, &ranges(), &mut rng);
        assert_eq!(proposal["fixed"], ParamValue::Int(7));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let incumbent = hyperparameters([("alpha", ParamValue::Float(0.1))]);
        let tuner = Tuner::new(0.2);
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..5)
                .map(|_| tuner.propose(&incumbent, &ranges(), &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_int_moves_at_least_one_step() {
        let range = HyperparameterRange::int(1, 30);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..50 {
            let moved = perturb(&ParamValue::Int(15), &range, &mut rng);
            assert_ne!(moved, ParamValue::Int(15));
        }
    }
}
