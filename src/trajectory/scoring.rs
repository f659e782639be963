use indexmap::IndexMap;
use serde::Serialize;

use super::source::TrajectorySample;
use crate::common::Axis;

/// Largest excursion seen on one axis
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AxisScore {
    pub axis: Axis,
    pub score: f64,
    /// `Name_C/SNR_C` of the cycle that produced the score
    pub worst_cycle: Option<String>,
    pub program: Option<String>,
}

/// Pluggable anomaly measure over the samples of one table
pub trait ViolationScorer: Send + Sync {
    /// One score per axis that has current readings
    fn score(&self, samples: &[TrajectorySample]) -> Vec<AxisScore>;
}

/// One program cycle: samples sharing `(Name_C, SNR_C)`, in recorded order
pub struct Cycle<'a> {
    pub name: &'a str,
    pub serial: &'a str,
    /// First non-empty `P_name` of the cycle
    pub program: &'a str,
    pub samples: Vec<&'a TrajectorySample>,
}

pub fn group_cycles(samples: &[TrajectorySample]) -> Vec<Cycle<'_>> {
    let mut cycles: IndexMap<(&str, &str), Cycle<'_>> = IndexMap::new();
    for sample in samples {
        let cycle = cycles
            .entry((sample.name.as_str(), sample.cycle.as_str()))
            .or_insert_with(|| Cycle {
                name: sample.name.as_str(),
                serial: sample.cycle.as_str(),
                program: "",
                samples: Vec::new(),
            });
        if cycle.program.is_empty() && !sample.path.is_empty() {
            cycle.program = sample.path.as_str();
        }
        cycle.samples.push(sample);
    }
    cycles.into_values().collect()
}

/// Keep the samples of cycles whose program contains one of `key_paths`
/// (case-insensitive). No key paths keeps everything.
pub fn filter_key_paths(samples: Vec<TrajectorySample>, key_paths: &[String]) -> Vec<TrajectorySample> {
    let keys: Vec<String> = key_paths
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return samples;
    }

    let matching: std::collections::HashSet<(String, String)> = group_cycles(&samples)
        .into_iter()
        .filter(|cycle| {
            let program = cycle.program.to_lowercase();
            keys.iter().any(|k| program.contains(k.as_str()))
        })
        .map(|cycle| (cycle.name.to_string(), cycle.serial.to_string()))
        .collect();

    samples
        .into_iter()
        .filter(|s| matching.contains(&(s.name.clone(), s.cycle.clone())))
        .collect()
}

pub const DEFAULT_MAX_LIMIT: f64 = 0.1;
pub const DEFAULT_MIN_LIMIT: f64 = -0.1;

/// Tolerance-band scorer.
///
/// Per cycle and axis: `HQ`/`LQ` are the highest and lowest current, the band
/// is the first recorded max/min current limit (non-positive max falls back
/// to 0.1, non-negative min to -0.1), and the excursion is how far `HQ`
/// exceeds the max or `LQ` undercuts the min, floored at zero. The axis score
/// is the largest excursion over all cycles.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToleranceBandScorer;

impl ToleranceBandScorer {
    fn cycle_excursion(cycle: &Cycle<'_>, idx: usize) -> Option<f64> {
        let currents = cycle.samples.iter().filter_map(|s| s.currents[idx]);
        let (hq, lq) = currents.fold(None, |acc: Option<(f64, f64)>, c| match acc {
            None => Some((c, c)),
            Some((hi, lo)) => Some((hi.max(c), lo.min(c))),
        })?;

        let max_limit = cycle
            .samples
            .iter()
            .find_map(|s| s.max_limits[idx])
            .filter(|v| *v > 0.0)
            .unwrap_or(DEFAULT_MAX_LIMIT);
        let min_limit = cycle
            .samples
            .iter()
            .find_map(|s| s.min_limits[idx])
            .filter(|v| *v < 0.0)
            .unwrap_or(DEFAULT_MIN_LIMIT);

        let above = (hq - max_limit).max(0.0);
        let below = (min_limit - lq).max(0.0);
        Some(above.max(below))
    }
}

impl ViolationScorer for ToleranceBandScorer {
    fn score(&self, samples: &[TrajectorySample]) -> Vec<AxisScore> {
        let cycles = group_cycles(samples);
        Axis::ALL
            .iter()
            .filter_map(|axis| {
                let idx = usize::from(axis.index() - 1);
                let mut best: Option<AxisScore> = None;
                for cycle in &cycles {
                    let Some(excursion) = Self::cycle_excursion(cycle, idx) else {
                        continue;
                    };
                    if best.as_ref().map_or(true, |b| excursion > b.score) {
                        best = Some(AxisScore {
                            axis: *axis,
                            score: excursion,
                            worst_cycle: Some(format!("{}/{}", cycle.name, cycle.serial)),
                            program: Some(cycle.program.to_string()).filter(|p| !p.is_empty()),
                        });
                    }
                }
                best
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(cycle: &str, path: &str, axis: Axis, current: f64, max: f64, min: f64) -> TrajectorySample {
        TrajectorySample::new(Utc::now(), "PRG", cycle, path).with_axis(axis, current, max, min)
    }

    #[test]
    fn test_excursion_above_and_below_band() {
        let samples = vec![
            sample("1", "R1/CO", Axis::A1, 2.4, 2.0, -2.0),
            sample("1", "", Axis::A1, -1.0, 9.0, -9.0),
            sample("2", "R1/CO", Axis::A1, -2.9, 2.0, -2.0),
        ];
        let scores = ToleranceBandScorer.score(&samples);
        assert_eq!(scores.len(), 1);
        let a1 = &scores[0];
        assert_eq!(a1.axis, Axis::A1);
        assert!((a1.score - 0.9).abs() < 1e-9);
        assert_eq!(a1.worst_cycle.as_deref(), Some("PRG/2"));
    }

    #[test]
    fn test_invalid_limits_fall_back_to_defaults() {
        let samples = vec![sample("1", "R1", Axis::A3, 0.5, 0.0, 0.3)];
        let scores = ToleranceBandScorer.score(&samples);
        assert!((scores[0].score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_within_band_scores_zero() {
        let samples = vec![sample("1", "R1", Axis::A2, 1.0, 2.0, -2.0)];
        let scores = ToleranceBandScorer.score(&samples);
        assert_eq!(scores[0].score, 0.0);
    }

    #[test]
    fn test_key_path_filter_uses_cycle_program() {
        let samples = vec![
            sample("1", "R1/CO_Pick", Axis::A1, 5.0, 2.0, -2.0),
            sample("1", "", Axis::A1, 5.0, 2.0, -2.0),
            sample("2", "R1/DO_Place", Axis::A1, 1.0, 2.0, -2.0),
        ];
        let kept = filter_key_paths(samples.clone(), &["co_pick".to_string()]);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.cycle == "1"));
        assert_eq!(filter_key_paths(samples, &[]).len(), 3);
    }
}
