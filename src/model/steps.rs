//! Training, validation and test steps shared by every classifier.
//!
//! A model only supplies `forward_t`; the `StepRecorder` it owns checks
//! the batch labels against the task, evaluates the task loss and feeds
//! the per-phase accumulators that `end_epoch` logs and resets.

use std::fmt;

use candle_core::{DType, Tensor};
use log::{debug, info};

use super::metrics::{Accuracy, EpochSummary, Metric, Phase, PhaseTracker, WeightedAccuracy};
use super::task::{predictions, LossFn, Task};
use crate::error::{Result, TopoError};
use crate::graph::BatchedGraph;

/// Loss of one step plus its host-side numbers
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Scalar loss tensor; still attached to the graph for backprop
    pub loss: Tensor,
    pub loss_value: f64,
    /// Metric on this batch alone
    pub accuracy: f64,
}

/// Task-bound loss and the epoch accumulators of every phase
pub struct StepRecorder {
    task: Task,
    loss: LossFn,
    trackers: Vec<PhaseTracker>,
}

impl fmt::Debug for StepRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRecorder")
            .field("task", &self.task)
            .field("trackers", &self.trackers)
            .finish_non_exhaustive()
    }
}

impl StepRecorder {
    pub fn new(task: Task, num_classes: usize) -> Self {
        let metric = || -> Box<dyn Metric> {
            match task {
                Task::GraphClassification => Box::new(Accuracy::new()),
                Task::NodeClassification => Box::new(WeightedAccuracy::new(num_classes)),
            }
        };
        Self {
            task,
            loss: task.loss(),
            trackers: Phase::ALL
                .iter()
                .map(|&phase| PhaseTracker::new(phase, metric()))
                .collect(),
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Labels of `batch`, checked against the task
    pub fn targets(&self, phase: Phase, batch: &BatchedGraph) -> Result<Tensor> {
        let targets = batch
            .labels()
            .ok_or_else(|| TopoError::invalid_batch(format!("{} batch carries no labels", phase)))?;
        if batch.label_level() != self.task.label_level() {
            return Err(TopoError::invalid_batch(format!(
                "{} batch carries {} labels but {} needs {} labels",
                phase,
                batch.label_level(),
                self.task,
                self.task.label_level()
            )));
        }
        let expected = self.task.expected_labels(batch);
        if targets.dims1()? != expected {
            return Err(TopoError::shape(
                format!("{} labels for {}", phase, self.task),
                expected,
                targets.dims1()?,
            ));
        }
        Ok(targets.clone())
    }

    /// Loss and metric of one batch's logits
    pub fn record(&mut self, phase: Phase, logits: &Tensor, targets: &Tensor) -> Result<StepOutput> {
        let loss = (self.loss)(logits, targets)?;
        let loss_value = loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;

        let predicted = predictions(logits)?;
        let truth = targets.to_vec1::<u32>()?;
        let accuracy = self.tracker(phase).record(loss_value, &predicted, &truth);

        debug!("{}_loss = {:.4}, {}_acc = {:.4}", phase, loss_value, phase, accuracy);
        Ok(StepOutput {
            loss,
            loss_value,
            accuracy,
        })
    }

    fn tracker(&mut self, phase: Phase) -> &mut PhaseTracker {
        let idx = Phase::ALL.iter().position(|&p| p == phase).unwrap_or(0);
        &mut self.trackers[idx]
    }

    /// Log and reset the epoch accumulators of `phase`
    pub fn end_epoch(&mut self, phase: Phase) -> EpochSummary {
        let summary = self.tracker(phase).finish();
        info!(
            "{}_loss = {:.4}, {}_acc = {:.4} over {} steps",
            phase, summary.loss, phase, summary.accuracy, summary.steps
        );
        summary
    }
}

/// A graph or node classifier driven step by step.
pub trait Classifier: fmt::Debug {
    /// Logits [B, K] for graph tasks, [N, K] for node tasks
    fn forward_t(&self, batch: &BatchedGraph, train: bool) -> Result<Tensor>;

    fn recorder(&mut self) -> &mut StepRecorder;

    fn forward(&self, batch: &BatchedGraph) -> Result<Tensor> {
        self.forward_t(batch, false)
    }

    fn training_step(&mut self, batch: &BatchedGraph) -> Result<StepOutput> {
        self.step(Phase::Train, batch)
    }

    fn validation_step(&mut self, batch: &BatchedGraph) -> Result<StepOutput> {
        self.step(Phase::Validation, batch)
    }

    fn test_step(&mut self, batch: &BatchedGraph) -> Result<StepOutput> {
        self.step(Phase::Test, batch)
    }

    fn step(&mut self, phase: Phase, batch: &BatchedGraph) -> Result<StepOutput> {
        let targets = self.recorder().targets(phase, batch)?;
        let logits = self.forward_t(batch, phase == Phase::Train)?;
        self.recorder().record(phase, &logits, &targets)
    }

    fn end_epoch(&mut self, phase: Phase) -> EpochSummary {
        self.recorder().end_epoch(phase)
    }
}
