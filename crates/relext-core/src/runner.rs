//! # Epoch Runner
//!
//! Drives one pass over a batch iterator, feeding each batch to a
//! [`RelationModel`] and accumulating accuracy and macro-F1.

use std::time::Instant;

use tracing::info;

use crate::batch::Batch;
use crate::error::Result;
use crate::metrics::{EpochMetrics, macro_f1};
use crate::model::RelationModel;

/// Training steps between progress lines.
pub const PROGRESS_INTERVAL: usize = 10;

/// Whether a pass updates parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Runs single epochs.
#[derive(Debug, Clone)]
pub struct EpochRunner {
    batch_size: usize,
    verbose: bool,
}

impl EpochRunner {
    /// `batch_size` is the nominal size used in the accuracy denominator.
    pub fn new(batch_size: usize, verbose: bool) -> Self {
        Self {
            batch_size,
            verbose,
        }
    }

    /// Run one pass. A failing batch aborts the pass and its error is
    /// returned as is.
    ///
    /// Accuracy is `correct / (steps * batch_size)`; see
    /// [`EpochMetrics::accuracy`]. An empty iterator yields all-zero metrics.
    pub fn run<'a, M, I>(&self, model: &mut M, batches: I, mode: Mode) -> Result<EpochMetrics>
    where
        M: RelationModel + ?Sized,
        I: IntoIterator<Item = Batch<'a>>,
    {
        let start = Instant::now();
        let mut step = 0usize;
        let mut correct = 0usize;
        let mut samples = 0usize;
        let mut f1_sum = 0.0f64;

        for batch in batches {
            step += 1;
            let inputs = batch.inputs();

            let out = match mode {
                Mode::Train => model.train_step(&inputs)?,
                Mode::Eval => model.predict(&inputs)?,
            };

            correct += out.correct;
            samples += inputs.batch_size;
            f1_sum += macro_f1(&inputs.label, &out.predictions);

            if mode == Mode::Train && self.verbose && step % PROGRESS_INTERVAL == 0 {
                info!(
                    "  step: {} acc: {:.2}% loss: {:.2} time: {:.2}",
                    step,
                    self.accuracy(correct, step) * 100.0,
                    out.loss.unwrap_or(f32::NAN),
                    start.elapsed().as_secs_f64()
                );
            }
        }

        if step == 0 {
            return Ok(EpochMetrics::default());
        }

        Ok(EpochMetrics {
            accuracy: self.accuracy(correct, step),
            f1: f1_sum / step as f64,
            steps: step,
            samples,
            correct,
        })
    }

    fn accuracy(&self, correct: usize, steps: usize) -> f64 {
        let denom = steps * self.batch_size;
        if denom == 0 {
            0.0
        } else {
            correct as f64 / denom as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::batch::{BatchInputs, BatchIter};
    use crate::error::RelextError;
    use crate::model::StepOutput;
    use crate::vectorize::{Dataset, Record};

    /// Predicts the label of every record correctly except relation 1.
    #[derive(Default)]
    struct Scripted {
        train_calls: usize,
        fail_at: Option<usize>,
    }

    impl Scripted {
        fn answer(&self, inputs: &BatchInputs) -> Vec<u32> {
            inputs
                .label
                .iter()
                .map(|&l| if l == 1 { 0 } else { l })
                .collect()
        }
    }

    impl RelationModel for Scripted {
        fn predict(&self, inputs: &BatchInputs) -> Result<StepOutput> {
            Ok(StepOutput::new(self.answer(inputs), &inputs.label, None))
        }

        fn train_step(&mut self, inputs: &BatchInputs) -> Result<StepOutput> {
            self.train_calls += 1;
            if self.fail_at == Some(self.train_calls) {
                return Err(RelextError::ModelInvocation("boom".into()));
            }
            Ok(StepOutput::new(self.answer(inputs), &inputs.label, Some(1.0)))
        }
    }

    fn dataset(labels: &[u32]) -> Dataset {
        let records = labels
            .iter()
            .map(|&relation| Record {
                sentence_ids: vec![2],
                relation,
                e1: 0,
                e2: 0,
                dist1: vec![1],
                dist2: vec![1],
            })
            .collect();
        Dataset::new(records, 1)
    }

    #[test]
    fn test_empty_iterator_returns_zero_metrics() {
        let data = dataset(&[]);
        let runner = EpochRunner::new(4, true);
        let mut model = Scripted::default();

        let m = runner
            .run(&mut model, BatchIter::sequential(&data, 4), Mode::Train)
            .unwrap();
        assert_eq!(m, EpochMetrics::default());
        assert_eq!(model.train_calls, 0);
    }

    #[test]
    fn test_accuracy_uses_nominal_batch_size() {
        // 5 records, batch 2 -> 3 steps, denominator 6
        let data = dataset(&[0, 2, 3, 0, 2]);
        let runner = EpochRunner::new(2, false);
        let mut model = Scripted::default();

        let m = runner
            .run(&mut model, BatchIter::sequential(&data, 2), Mode::Eval)
            .unwrap();
        assert_eq!(m.steps, 3);
        assert_eq!(m.samples, 5);
        assert_eq!(m.correct, 5);
        assert!((m.accuracy - 5.0 / 6.0).abs() < 1e-9);
        assert!((m.exact_accuracy() - 1.0).abs() < 1e-9);
        assert!((m.f1 - 1.0).abs() < 1e-9);
        assert_eq!(model.train_calls, 0);
    }

    #[test]
    fn test_train_mode_calls_train_step() {
        let data = dataset(&[1; 25]);
        let runner = EpochRunner::new(1, true);
        let mut model = Scripted::default();

        let m = runner
            .run(&mut model, BatchIter::sequential(&data, 1), Mode::Train)
            .unwrap();
        assert_eq!(model.train_calls, 25);
        assert_eq!(m.correct, 0);
        assert_eq!(m.accuracy, 0.0);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run 25 single-record steps and return the progress lines logged.
    fn progress_lines(mode: Mode, verbose: bool) -> Vec<String> {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let data = dataset(&[0; 25]);
        let runner = EpochRunner::new(1, verbose);
        let mut model = Scripted::default();
        tracing::subscriber::with_default(subscriber, || {
            runner
                .run(&mut model, BatchIter::sequential(&data, 1), mode)
                .unwrap();
        });

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        text.lines()
            .filter(|l| l.contains("step: ") && l.contains(" acc: "))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_progress_logged_every_interval_in_training() {
        let lines = progress_lines(Mode::Train, true);
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].contains("step: 10 acc: 100.00%"));
        assert!(lines[1].contains("step: 20 acc: 100.00%"));
        assert!(lines[1].contains("loss: 1.00"));
    }

    #[test]
    fn test_no_progress_in_eval_or_quiet_mode() {
        assert!(progress_lines(Mode::Eval, true).is_empty());
        assert!(progress_lines(Mode::Train, false).is_empty());
    }

    #[test]
    fn test_model_failure_propagates() {
        let data = dataset(&[0; 6]);
        let runner = EpochRunner::new(2, false);
        let mut model = Scripted {
            fail_at: Some(2),
            ..Default::default()
        };

        let err = runner
            .run(&mut model, BatchIter::sequential(&data, 2), Mode::Train)
            .unwrap_err();
        assert!(matches!(err, RelextError::ModelInvocation(_)));
        assert_eq!(model.train_calls, 2);
    }
}
