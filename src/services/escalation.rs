use std::future::Future;

use crate::{error::AppResult, models::Track};

/// Outcome of a threshold escalation
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub candidates: Vec<Track>,
    /// Threshold that produced `candidates`; `None` when no attempt ran
    pub threshold: Option<f64>,
    /// Whether `candidates` reached the required count
    pub satisfied: bool,
    pub attempts: usize,
}

/// Retries a scored query with progressively looser similarity thresholds
///
/// Thresholds are tried in order and the first result holding at least `required`
/// candidates wins. Otherwise the result of the last threshold is returned. The number
/// of attempts can never exceed the number of thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEscalator {
    thresholds: &'static [f64],
}

impl ThresholdEscalator {
    pub const fn new(thresholds: &'static [f64]) -> Self {
        Self { thresholds }
    }

    pub async fn run<F, Fut>(&self, required: usize, mut query: F) -> AppResult<Escalation>
    where
        F: FnMut(f64) -> Fut,
        Fut: Future<Output = AppResult<Vec<Track>>>,
    {
        debug_assert!(
            self.thresholds.windows(2).all(|w| w[0] < w[1]),
            "thresholds must be strictly increasing"
        );

        let mut escalation = Escalation {
            candidates: Vec::new(),
            threshold: None,
            satisfied: false,
            attempts: 0,
        };

        for &threshold in self.thresholds {
            let candidates = query(threshold).await?;
            escalation.attempts += 1;

            tracing::debug!(
                threshold,
                found = candidates.len(),
                required,
                attempt = escalation.attempts,
                "Threshold escalation attempt"
            );

            escalation.satisfied = candidates.len() >= required;
            escalation.candidates = candidates;
            escalation.threshold = Some(threshold);

            if escalation.satisfied {
                break;
            }
        }

        Ok(escalation)
    }
}
