//! Classification metrics accumulated over an epoch.
//!
//! - `Accuracy`: correct / total
//! - `WeightedAccuracy`: mean per-class recall over the classes seen,
//!   used for node tasks where one class dominates

use std::fmt;

/// Streaming metric over host predictions
pub trait Metric: fmt::Debug + Send {
    /// Accumulate one batch and return the batch value
    fn update(&mut self, predictions: &[u32], targets: &[u32]) -> f64;

    /// Value over everything since the last reset
    fn compute(&self) -> f64;

    fn reset(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for Accuracy {
    fn update(&mut self, predictions: &[u32], targets: &[u32]) -> f64 {
        let correct = predictions.iter().zip(targets).filter(|(p, t)| p == t).count();
        let total = predictions.len().min(targets.len());
        self.correct += correct;
        self.total += total;
        ratio(correct, total)
    }

    fn compute(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-class recall averaged over classes that occur in the targets.
#[derive(Debug, Clone)]
pub struct WeightedAccuracy {
    correct: Vec<usize>,
    total: Vec<usize>,
}

impl WeightedAccuracy {
    pub fn new(num_classes: usize) -> Self {
        Self {
            correct: vec![0; num_classes],
            total: vec![0; num_classes],
        }
    }

    fn balanced(correct: &[usize], total: &[usize]) -> f64 {
        let recalls: Vec<f64> = correct
            .iter()
            .zip(total)
            .filter(|(_, &t)| t > 0)
            .map(|(&c, &t)| c as f64 / t as f64)
            .collect();
        if recalls.is_empty() {
            0.0
        } else {
            recalls.iter().sum::<f64>() / recalls.len() as f64
        }
    }
}

impl Metric for WeightedAccuracy {
    fn update(&mut self, predictions: &[u32], targets: &[u32]) -> f64 {
        let k = self.total.len();
        let mut correct = vec![0usize; k];
        let mut total = vec![0usize; k];
        for (&p, &t) in predictions.iter().zip(targets) {
            let t = t as usize;
            if t >= k {
                continue;
            }
            total[t] += 1;
            if p as usize == t {
                correct[t] += 1;
            }
        }
        for c in 0..k {
            self.correct[c] += correct[c];
            self.total[c] += total[c];
        }
        Self::balanced(&correct, &total)
    }

    fn compute(&self) -> f64 {
        Self::balanced(&self.correct, &self.total)
    }

    fn reset(&mut self) {
        self.correct.iter_mut().for_each(|c| *c = 0);
        self.total.iter_mut().for_each(|t| *t = 0);
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Validation,
    Test,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Train, Phase::Validation, Phase::Test];

    pub fn prefix(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Validation => "val",
            Phase::Test => "test",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Epoch-level numbers for one phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub phase: Phase,
    /// Mean step loss
    pub loss: f64,
    pub accuracy: f64,
    pub steps: usize,
}

/// Loss and metric accumulator of one phase
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: Phase,
    metric: Box<dyn Metric>,
    loss_sum: f64,
    steps: usize,
}

impl PhaseTracker {
    pub(crate) fn new(phase: Phase, metric: Box<dyn Metric>) -> Self {
        Self {
            phase,
            metric,
            loss_sum: 0.0,
            steps: 0,
        }
    }

    pub(crate) fn record(&mut self, loss: f64, predictions: &[u32], targets: &[u32]) -> f64 {
        self.loss_sum += loss;
        self.steps += 1;
        self.metric.update(predictions, targets)
    }

    /// Summarise and reset
    pub(crate) fn finish(&mut self) -> EpochSummary {
        let summary = EpochSummary {
            phase: self.phase,
            loss: if self.steps == 0 { 0.0 } else { self.loss_sum / self.steps as f64 },
            accuracy: self.metric.compute(),
            steps: self.steps,
        };
        self.metric.reset();
        self.loss_sum = 0.0;
        self.steps = 0;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_accumulates() {
        let mut acc = Accuracy::new();
        assert_eq!(acc.update(&[1, 0, 1, 1], &[1, 0, 0, 1]), 0.75);
        assert_eq!(acc.update(&[0, 0], &[1, 1]), 0.0);
        assert!((acc.compute() - 0.5).abs() < 1e-12);
        acc.reset();
        assert_eq!(acc.compute(), 0.0);
    }

    #[test]
    fn test_weighted_accuracy_balances_classes() {
        let mut acc = WeightedAccuracy::new(3);
        // class 0: 8/9 right, class 1: 0/1 right, class 2 absent
        let targets = [0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let predictions = [0, 0, 0, 0, 0, 0, 0, 0, 1, 0];
        let batch = acc.update(&predictions, &targets);
        assert!((batch - (8.0 / 9.0) / 2.0).abs() < 1e-12);

        let mut plain = Accuracy::new();
        assert!((plain.update(&predictions, &targets) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_tracker_finish_resets() {
        let mut tracker = PhaseTracker::new(Phase::Validation, Box::new(Accuracy::new()));
        tracker.record(1.0, &[1], &[1]);
        tracker.record(3.0, &[0], &[1]);
        let summary = tracker.finish();
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.loss, 2.0);
        assert_eq!(summary.accuracy, 0.5);
        assert_eq!(tracker.finish().steps, 0);
    }
}
