use crate::constants::scheduler::{EPS, MIN_LR, THRESHOLD};

/// Reduce-on-plateau learning rate policy for a metric that should decrease.
///
/// An epoch counts as an improvement when the metric beats the best value seen
/// by more than a relative `threshold`. Once more than `patience` consecutive
/// epochs fail to improve, the rate is multiplied by `factor` and the count
/// starts over.
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
	factor: f64,
	patience: usize,
	threshold: f64,
	min_lr: f64,
	eps: f64,
	best: f64,
	num_bad_epochs: usize,
}

impl PlateauScheduler {
	pub fn new(factor: f64, patience: usize) -> Self {
		PlateauScheduler {
			factor,
			patience,
			threshold: THRESHOLD,
			min_lr: MIN_LR,
			eps: EPS,
			best: f64::INFINITY,
			num_bad_epochs: 0,
		}
	}

	pub fn best(&self) -> f64 {
		self.best
	}

	pub fn num_bad_epochs(&self) -> usize {
		self.num_bad_epochs
	}

	fn is_better(&self, metric: f64) -> bool {
		metric < self.best * (1.0 - self.threshold)
	}

	/// Feeds one epoch's metric. Returns the new rate when it was reduced.
	pub fn step(&mut self, metric: f64, current_lr: f64) -> Option<f64> {
		if self.is_better(metric) {
			self.best = metric;
			self.num_bad_epochs = 0;
		} else {
			self.num_bad_epochs += 1;
		}

		if self.num_bad_epochs <= self.patience {
			return None;
		}

		self.num_bad_epochs = 0;
		let new_lr = (current_lr * self.factor).max(self.min_lr);
		if current_lr - new_lr > self.eps {
			Some(new_lr)
		} else {
			None
		}
	}
}
