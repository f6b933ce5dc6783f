use std::fmt;

/// Running totals over an evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvalAccumulator {
    loss_sum: f64,
    correct: usize,
    samples: usize,
    batches: usize,
}

impl EvalAccumulator {
    /// Add one batch given its mean loss, number of correct predictions, and size.
    pub fn update(&mut self, mean_loss: f32, correct: usize, batch_len: usize) {
        self.loss_sum += f64::from(mean_loss) * batch_len as f64;
        self.correct += correct.min(batch_len);
        self.samples += batch_len;
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn finish(&self) -> EvalSummary {
        if self.samples == 0 {
            return EvalSummary::default();
        }
        let n = self.samples as f64;
        EvalSummary {
            accuracy: self.correct as f64 / n,
            loss: self.loss_sum / n,
            samples: self.samples,
        }
    }
}

/// Sample-weighted mean loss and accuracy in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalSummary {
    pub accuracy: f64,
    pub loss: f64,
    pub samples: usize,
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Classification Accuracy : {:.4}", self.accuracy * 100.0)?;
        write!(f, "Classification loss: {:.4}", self.loss)
    }
}
