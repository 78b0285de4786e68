// src/services/complexity.rs

// Probes run one at a time through the judge's synchronous endpoint;
// concurrent probes would contend for the same executor.

use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    error::AppError,
    judge::JudgeClient,
    models::{
        complexity::{
            Classification, ComplexityClass, ComplexityProbeSpec, ComplexityVerdict, FillPattern,
            ValueRange,
        },
        submission::CaseVerdict,
    },
};

/// Relative disagreement between the two step ratios above which timings
/// are considered noise.
pub const MAX_RATIO_DEVIATION: f64 = 0.4;

/// Upper (exclusive) bound of each bin over the average step ratio.
const BINS: [(f64, ComplexityClass); 6] = [
    (1.3, ComplexityClass::Logn),
    (1.8, ComplexityClass::N),
    (2.6, ComplexityClass::Nlogn),
    (4.5, ComplexityClass::N2),
    (7.5, ComplexityClass::N3),
    (f64::INFINITY, ComplexityClass::Exp),
];

/// Maps an average step ratio onto the first matching half-open bin.
pub fn bin_for_ratio(avg: f64) -> Classification {
    if avg.is_nan() || avg < 0.0 {
        return Classification::Unknown;
    }
    BINS.iter()
        .find(|(upper, _)| avg < *upper)
        .map(|(_, class)| Classification::Class(*class))
        .unwrap_or(Classification::Unknown)
}

/// Classifies two consecutive step ratios. Symmetric in `r1`/`r2`.
pub fn classify_ratios(r1: f64, r2: f64) -> Classification {
    let deviation = (r1 - r2).abs() / r1.max(r2);
    if deviation > MAX_RATIO_DEVIATION {
        return Classification::Unstable;
    }
    bin_for_ratio((r1 + r2) / 2.0)
}

/// Classifies probe timings. Only the first three are used.
pub fn classify(timings: &[f64]) -> Result<Classification, AppError> {
    if timings.len() < 3 {
        return Err(AppError::Validation(format!(
            "need at least 3 timings to classify, got {}",
            timings.len()
        )));
    }
    if let Some((i, t)) = timings
        .iter()
        .enumerate()
        .find(|(_, t)| !t.is_finite() || **t <= 0.0)
    {
        return Err(AppError::UnstableMeasurement(format!(
            "probe #{} reported an unusable elapsed time ({})",
            i + 1,
            t
        )));
    }

    let r1 = timings[1] / timings[0];
    let r2 = timings[2] / timings[1];
    Ok(classify_ratios(r1, r2))
}

/// A classification passes when it is no worse than `expected`.
pub fn passes(observed: Classification, expected: ComplexityClass) -> bool {
    match observed {
        Classification::Class(class) => class.ordinal() <= expected.ordinal(),
        Classification::Unstable | Classification::Unknown => false,
    }
}

/// Draws `size` values from `range` and arranges them per `fill`.
pub fn generate_values<R: Rng>(
    size: usize,
    range: ValueRange,
    fill: FillPattern,
    rng: &mut R,
) -> Vec<i64> {
    let mut values: Vec<i64> = (0..size)
        .map(|_| rng.gen_range(range.min..=range.max))
        .collect();

    match fill {
        FillPattern::Random => {}
        FillPattern::Sorted => values.sort_unstable(),
        FillPattern::Reverse => values.sort_unstable_by(|a, b| b.cmp(a)),
        FillPattern::Constant => {
            if let Some(&first) = values.first() {
                values.fill(first);
            }
        }
    }
    values
}

/// Serializes a probe as `"<size>\n<space-separated values>"`.
pub fn render_input(values: &[i64]) -> String {
    let body = values
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}\n{}", values.len(), body)
}

/// Runs the probe series against the judge.
#[derive(Clone)]
pub struct ComplexityClassifier {
    judge: Arc<dyn JudgeClient>,
}

impl ComplexityClassifier {
    pub fn new(judge: Arc<dyn JudgeClient>) -> Self {
        Self { judge }
    }

    /// Generates one input per probe size, runs them sequentially and
    /// compares the observed class with the expected one.
    pub async fn measure(
        &self,
        spec: &ComplexityProbeSpec,
        language_id: i32,
        code: &str,
    ) -> Result<ComplexityVerdict, AppError> {
        spec.validate()?;

        let inputs: Vec<String> = {
            let mut rng = StdRng::from_entropy();
            spec.sizes
                .iter()
                .map(|&size| {
                    render_input(&generate_values(size, spec.value_range, spec.fill, &mut rng))
                })
                .collect()
        };

        let mut timings = Vec::with_capacity(inputs.len());
        for (i, stdin) in inputs.iter().enumerate() {
            let run = self
                .judge
                .submit_synchronous(language_id, code, stdin)
                .await?;

            if !run.is_terminal() {
                return Err(AppError::ExternalService(format!(
                    "synchronous probe #{} came back unfinished (status {})",
                    i + 1,
                    run.status_id
                )));
            }
            if run.verdict() == CaseVerdict::TimeLimitExceeded {
                // Too slow to measure; the growth is beyond any class we can bin.
                tracing::warn!(
                    probe = i + 1,
                    size = spec.sizes[i],
                    "Complexity probe hit the time limit"
                );
                return Ok(ComplexityVerdict {
                    observed: None,
                    expected: spec.expected,
                    passed: false,
                    timings,
                });
            }
            if run.verdict() != CaseVerdict::Accepted {
                return Err(AppError::UnstableMeasurement(format!(
                    "probe #{} (size {}) ended with {:?}",
                    i + 1,
                    spec.sizes[i],
                    run.verdict()
                )));
            }

            let elapsed = run.time_seconds.unwrap_or(0.0);
            tracing::debug!(
                probe = i + 1,
                size = spec.sizes[i],
                elapsed,
                "Complexity probe finished"
            );
            timings.push(elapsed);
        }

        let classification = classify(&timings)?;
        let observed = match classification {
            Classification::Class(class) => Some(class),
            Classification::Unstable => {
                tracing::warn!(?timings, "Complexity timings too noisy to classify");
                return Err(AppError::UnstableMeasurement(format!(
                    "step ratios disagree by more than {:.0}%",
                    MAX_RATIO_DEVIATION * 100.0
                )));
            }
            Classification::Unknown => None,
        };

        Ok(ComplexityVerdict {
            observed,
            expected: spec.expected,
            passed: passes(classification, spec.expected),
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_of(timings: &[f64]) -> Classification {
        classify(timings).unwrap()
    }

    #[test]
    fn test_linear_doubling_lands_in_nlogn() {
        // 1000, 2000, 4000 with 10, 20, 40 -> ratios 2, 2
        assert_eq!(
            class_of(&[10.0, 20.0, 40.0]),
            Classification::Class(ComplexityClass::Nlogn)
        );
    }

    #[test]
    fn test_tenfold_growth_is_exponential() {
        assert_eq!(
            class_of(&[10.0, 100.0, 1000.0]),
            Classification::Class(ComplexityClass::Exp)
        );
    }

    #[test]
    fn test_disagreeing_ratios_are_unstable() {
        // ratios 1.5 and 6.67, deviation ~0.775
        assert_eq!(class_of(&[10.0, 15.0, 100.0]), Classification::Unstable);
    }

    #[test]
    fn test_unstable_check_is_symmetric() {
        let pairs = [(1.5, 6.67), (2.0, 2.9), (2.0, 3.5), (1.0, 1.4), (4.0, 9.0)];
        for (a, b) in pairs {
            let ab = classify_ratios(a, b) == Classification::Unstable;
            let ba = classify_ratios(b, a) == Classification::Unstable;
            assert_eq!(ab, ba, "asymmetric for ({}, {})", a, b);
        }
    }

    #[test]
    fn test_bins_are_half_open() {
        assert_eq!(bin_for_ratio(0.0), Classification::Class(ComplexityClass::Logn));
        assert_eq!(bin_for_ratio(1.29), Classification::Class(ComplexityClass::Logn));
        assert_eq!(bin_for_ratio(1.3), Classification::Class(ComplexityClass::N));
        assert_eq!(bin_for_ratio(1.8), Classification::Class(ComplexityClass::Nlogn));
        assert_eq!(bin_for_ratio(2.6), Classification::Class(ComplexityClass::N2));
        assert_eq!(bin_for_ratio(4.5), Classification::Class(ComplexityClass::N3));
        assert_eq!(bin_for_ratio(7.5), Classification::Class(ComplexityClass::Exp));
        assert_eq!(bin_for_ratio(1e9), Classification::Class(ComplexityClass::Exp));
        assert_eq!(bin_for_ratio(-1.0), Classification::Unknown);
        assert_eq!(bin_for_ratio(f64::NAN), Classification::Unknown);
    }

    #[test]
    fn test_non_positive_or_non_finite_timings_fail() {
        assert!(matches!(
            classify(&[0.0, 1.0, 2.0]),
            Err(AppError::UnstableMeasurement(_))
        ));
        assert!(matches!(
            classify(&[1.0, -1.0, 2.0]),
            Err(AppError::UnstableMeasurement(_))
        ));
        assert!(matches!(
            classify(&[1.0, 2.0, f64::INFINITY]),
            Err(AppError::UnstableMeasurement(_))
        ));
        assert!(matches!(
            classify(&[1.0, 2.0, f64::NAN]),
            Err(AppError::UnstableMeasurement(_))
        ));
        assert!(matches!(classify(&[1.0, 2.0]), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_only_first_three_timings_count() {
        assert_eq!(
            class_of(&[10.0, 20.0, 40.0, 100_000.0]),
            Classification::Class(ComplexityClass::Nlogn)
        );
    }

    #[test]
    fn test_pass_compares_ordinals() {
        let nlogn = Classification::Class(ComplexityClass::Nlogn);
        assert!(passes(nlogn, ComplexityClass::Nlogn));
        assert!(passes(nlogn, ComplexityClass::N2));
        assert!(!passes(nlogn, ComplexityClass::N));
        assert!(!passes(Classification::Unknown, ComplexityClass::Exp));
        assert!(!passes(Classification::Unstable, ComplexityClass::Exp));
    }

    #[test]
    fn test_fill_patterns() {
        let range = ValueRange { min: -50, max: 50 };
        let mut rng = StdRng::seed_from_u64(7);

        let sorted = generate_values(200, range, FillPattern::Sorted, &mut rng);
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));

        let reverse = generate_values(200, range, FillPattern::Reverse, &mut rng);
        assert!(reverse.windows(2).all(|w| w[0] >= w[1]));

        let constant = generate_values(200, range, FillPattern::Constant, &mut rng);
        assert!(constant.iter().all(|v| *v == constant[0]));

        let random = generate_values(200, range, FillPattern::Random, &mut rng);
        assert_eq!(random.len(), 200);
        assert!(random.iter().all(|v| (-50..=50).contains(v)));
    }

    #[test]
    fn test_render_input_format() {
        assert_eq!(render_input(&[3, 1, 2]), "3\n3 1 2");
        assert_eq!(render_input(&[]), "0\n");
    }
}
