//! Learning-rate decay when the monitored loss stops improving.

use log::info;

use crate::config::ModelConfig;

/// Halves the learning rate once the loss has failed to improve for more
/// than `patience` consecutive epochs, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    lr: f64,
    factor: f64,
    patience: usize,
    min_lr: f64,
    /// Relative improvement a loss must make over the best one
    threshold: f64,
    best: f64,
    bad_epochs: usize,
}

impl PlateauScheduler {
    pub fn new(lr: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            lr,
            factor: 0.5,
            patience,
            min_lr,
            threshold: 1e-4,
            best: f64::INFINITY,
            bad_epochs: 0,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.lr, config.lr_patience, config.min_lr)
    }

    pub fn learning_rate(&self) -> f64 {
        self.lr
    }

    /// Record one epoch's loss and return the learning rate to use next
    pub fn step(&mut self, loss: f64) -> f64 {
        if loss < self.best * (1.0 - self.threshold) {
            self.best = loss;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.patience {
            let reduced = (self.lr * self.factor).max(self.min_lr);
            if reduced < self.lr {
                info!("loss plateaued at {:.4}, learning rate {:.2e} -> {:.2e}", self.best, self.lr, reduced);
                self.lr = reduced;
            }
            self.bad_epochs = 0;
        }
        self.lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halves_after_patience_runs_out() {
        let mut scheduler = PlateauScheduler::new(0.01, 2, 1e-5);
        let rates: Vec<f64> = [1.0, 0.9, 0.95, 0.95, 0.95].iter().map(|&l| scheduler.step(l)).collect();
        assert_eq!(rates, vec![0.01, 0.01, 0.01, 0.01, 0.005]);

        // the counter restarts after a reduction
        assert_eq!(scheduler.step(0.95), 0.005);
        assert_eq!(scheduler.step(0.8), 0.005);
    }

    #[test]
    fn test_never_goes_below_min_lr() {
        let mut scheduler = PlateauScheduler::new(1e-4, 0, 3e-5);
        for _ in 0..10 {
            scheduler.step(1.0);
        }
        assert_eq!(scheduler.learning_rate(), 3e-5);
    }

    #[test]
    fn test_tiny_improvements_count_as_plateau() {
        let mut scheduler = PlateauScheduler::new(0.1, 0, 0.0);
        scheduler.step(1.0);
        assert_eq!(scheduler.step(0.99999), 0.05);
    }
}
