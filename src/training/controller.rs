use std::path::{Path, PathBuf};

use crate::config::ModelParams;
use crate::constants::file;
use crate::error::Result;
use crate::model::Denoiser;
use crate::optim::Optimizer;
use crate::training::checkpoint::CheckpointManager;
use crate::training::history::RunHistory;
use crate::training::scheduler::PlateauScheduler;

/// Everything the run accumulates across epochs.
#[derive(Debug, Clone)]
pub struct TrainingState {
	pub history: RunHistory,
	/// Lowest validation loss seen so far.
	pub best_val_loss: f64,
	pub scheduler: PlateauScheduler,
}

impl TrainingState {
	pub fn new(model: ModelParams, scheduler: PlateauScheduler) -> Self {
		TrainingState {
			history: RunHistory::new(model),
			best_val_loss: f64::INFINITY,
			scheduler,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
	pub train_loss: f64,
	pub val_loss: f64,
	pub val_psnr: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
	/// A new best model was written this epoch.
	pub improved: bool,
	/// Rate in effect for the next epoch.
	pub learning_rate: f64,
	pub lr_reduced: bool,
}

/// Post-epoch bookkeeping: history, best model, learning rate schedule.
pub struct Controller {
	output_dir: PathBuf,
	checkpoints: CheckpointManager,
}

impl Controller {
	pub fn new(output_dir: impl AsRef<Path>) -> Self {
		let output_dir = output_dir.as_ref().to_path_buf();
		Controller {
			checkpoints: CheckpointManager::new(&output_dir),
			output_dir,
		}
	}

	pub fn history_path(&self) -> PathBuf {
		self.output_dir.join(file::INITIAL_HISTORY)
	}

	pub fn best_history_path(&self) -> PathBuf {
		self.output_dir.join(file::BEST_HISTORY)
	}

	pub fn final_history_path(&self) -> PathBuf {
		self.output_dir.join(file::FINAL_HISTORY)
	}

	pub fn checkpoints(&self) -> &CheckpointManager {
		&self.checkpoints
	}

	/// Persists the empty history so the file exists before the first epoch.
	pub fn begin(&self, state: &TrainingState) -> Result<()> {
		state.history.save(self.history_path())
	}

	pub fn step<M, O>(
		&self,
		state: &mut TrainingState,
		model: &M,
		optimizer: &mut O,
		summary: EpochSummary,
	) -> Result<StepOutcome>
	where
		M: Denoiser,
		O: Optimizer,
	{
		// The best snapshot is taken before this epoch is recorded. Ties keep
		// the earlier model.
		let improved = summary.val_loss < state.best_val_loss;
		if improved {
			self.checkpoints.save_best(model)?;
			state.history.save(self.best_history_path())?;
			state.best_val_loss = summary.val_loss;
			tracing::info!(val_loss = summary.val_loss, "New best model saved");
		}

		state
			.history
			.record(summary.train_loss, summary.val_loss, summary.val_psnr);
		state.history.save(self.history_path())?;

		let reduced = state.scheduler.step(summary.val_loss, optimizer.learning_rate());
		if let Some(rate) = reduced {
			tracing::info!(
				from = optimizer.learning_rate(),
				to = rate,
				"Validation loss plateaued, reducing learning rate"
			);
			optimizer.set_learning_rate(rate);
		}

		Ok(StepOutcome {
			improved,
			learning_rate: optimizer.learning_rate(),
			lr_reduced: reduced.is_some(),
		})
	}

	/// Writes the final checkpoint and history unconditionally.
	pub fn finish<M: Denoiser>(&self, state: &TrainingState, model: &M) -> Result<()> {
		self.checkpoints.save_final(model)?;
		state.history.save(self.final_history_path())
	}
}
