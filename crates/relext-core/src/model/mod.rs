//! Model capability consumed by the epoch loop.
//!
//! The loop only needs predictions, a correct-count and, when training,
//! the loss of the step. How those are computed is up to the
//! implementation; [`cnn::CnnModel`] is the candle-backed one.

pub mod cnn;

pub use cnn::{CnnConfig, CnnModel, SharedParams};

use crate::batch::BatchInputs;
use crate::error::{RelextError, Result};

/// Outputs of one model invocation on a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub predictions: Vec<u32>,
    /// Number of predictions equal to the batch labels.
    pub correct: usize,
    /// Training loss, `None` for inference.
    pub loss: Option<f32>,
}

impl StepOutput {
    pub fn new(predictions: Vec<u32>, labels: &[u32], loss: Option<f32>) -> Self {
        let correct = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();
        Self {
            predictions,
            correct,
            loss,
        }
    }
}

/// A relation classifier the epoch loop can drive.
pub trait RelationModel {
    /// Predict labels for a batch without updating parameters.
    fn predict(&self, inputs: &BatchInputs) -> Result<StepOutput>;

    /// Run one optimization step and report the batch's predictions and loss.
    fn train_step(&mut self, inputs: &BatchInputs) -> Result<StepOutput> {
        let _ = inputs;
        Err(RelextError::ModelInvocation(
            "model does not support training".into(),
        ))
    }
}
