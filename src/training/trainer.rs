use std::sync::Arc;
use std::time::Instant;

use ndarray::Array4;

use crate::config::{ModelParams, NetworkConfig, TrainingConfig};
use crate::constants::training::IMAGE_SAMPLE_INTERVAL;
use crate::error::{DenoiseError, Result};
use crate::model::Denoiser;
use crate::noise::NoiseSynthesizer;
use crate::optim::Optimizer;
use crate::sink::{make_grid, MetricsSink};
use crate::store::{PatchStore, StoreOptions};
use crate::training::controller::{Controller, EpochSummary, TrainingState};
use crate::training::data_loader::{build_pool, DataLoader};
use crate::training::epoch::{eval_epoch, train_epoch, VisualSample};
use crate::training::scheduler::PlateauScheduler;
use crate::validation::{ensure_output_dir, validate_store_path};

/// Owns the data side of a run: stores, loaders, noise and output locations.
#[derive(Debug)]
pub struct Trainer {
	config: TrainingConfig,
	train_loader: DataLoader,
	val_loader: DataLoader,
	noise: NoiseSynthesizer,
	patch_shape: (usize, usize, usize),
}

impl Trainer {
	pub fn new(config: TrainingConfig) -> Result<Self> {
		config.validate()?;
		let train_path = validate_store_path(&config.train_set)?;
		let val_path = validate_store_path(&config.val_set)?;
		ensure_output_dir(&config.log_dir)?;
		ensure_output_dir(&config.model_dir)?;

		let train_store = PatchStore::open(
			&train_path,
			StoreOptions {
				seed: config.seed,
				cache: config.cache,
			},
		)?;
		let val_store = PatchStore::open(
			&val_path,
			StoreOptions {
				seed: config.seed.map(|s| s.wrapping_add(1)),
				cache: config.cache,
			},
		)?;
		for store in &[&train_store, &val_store] {
			if store.is_empty() {
				return Err(DenoiseError::EmptyStore(store.path().to_path_buf()));
			}
		}

		let patch_shape = train_store.shape()?;
		let val_shape = val_store.shape()?;
		if patch_shape != val_shape {
			return Err(DenoiseError::ShapeMismatch(format!(
				"training patches are {:?} but validation patches are {:?}",
				patch_shape, val_shape
			)));
		}
		tracing::info!(
			train = train_store.len(),
			val = val_store.len(),
			shape = ?patch_shape,
			"Opened patch stores"
		);

		let pool = build_pool(config.workers)?;
		let train_loader = DataLoader::new(Arc::new(train_store), config.batch_size, Arc::clone(&pool));
		let val_loader = DataLoader::new(Arc::new(val_store), config.batch_size, pool);
		let noise = NoiseSynthesizer::new(config.noise_level, config.seed.map(|s| s.wrapping_add(2)))?;

		Ok(Trainer {
			config,
			train_loader,
			val_loader,
			noise,
			patch_shape,
		})
	}

	pub fn config(&self) -> &TrainingConfig {
		&self.config
	}

	/// (channels, height, width) shared by every patch of both stores.
	pub fn patch_shape(&self) -> (usize, usize, usize) {
		self.patch_shape
	}

	pub fn model_params(&self, network: &NetworkConfig) -> ModelParams {
		let (c, h, _) = self.patch_shape;
		network.model_params(c, h)
	}

	/// Trains for the configured number of epochs and returns the final state.
	/// The first store, model or checkpoint failure ends the run; sink failures
	/// are only logged.
	pub fn run<M, O>(&mut self, model: &mut M, optimizer: &mut O, sink: &mut dyn MetricsSink) -> Result<TrainingState>
	where
		M: Denoiser,
		O: Optimizer,
	{
		let params = model.model_params();
		if params.num_channels != self.patch_shape.0 {
			return Err(DenoiseError::ShapeMismatch(format!(
				"model expects {} channels but patches have {}",
				params.num_channels, self.patch_shape.0
			)));
		}

		let controller = Controller::new(&self.config.log_dir);
		let scheduler = PlateauScheduler::new(self.config.lr_factor, self.config.patience);
		let mut state = TrainingState::new(params, scheduler);
		controller.begin(&state)?;

		let epochs = self.config.epochs;
		for epoch in 1..=epochs {
			let index = epoch - 1;
			let _span = tracing::info_span!("epoch", epoch).entered();
			let started = Instant::now();
			tracing::info!(epoch, epochs, learning_rate = optimizer.learning_rate(), "Starting epoch");

			let train_loss = train_epoch(model, optimizer, &self.train_loader, &mut self.noise)?;
			let eval = eval_epoch(&*model, &self.val_loader, &mut self.noise)?;

			let summary = EpochSummary {
				train_loss,
				val_loss: eval.loss,
				val_psnr: eval.psnr,
			};
			let outcome = controller.step(&mut state, &*model, optimizer, summary)?;

			report(sink.add_scalar("loss", train_loss, index), "loss");
			report(sink.add_scalar("val", eval.loss, index), "val");
			report(sink.add_scalar("PSNR", eval.psnr, index), "PSNR");
			if index % IMAGE_SAMPLE_INTERVAL == 0 {
				if let Some(sample) = &eval.sample {
					emit_grids(sink, sample, index);
				}
			}

			tracing::info!(
				epoch,
				train_loss,
				val_loss = eval.loss,
				psnr = eval.psnr,
				best = outcome.improved,
				elapsed_secs = started.elapsed().as_secs_f64(),
				"Epoch complete"
			);
		}

		controller.finish(&state, &*model)?;
		tracing::info!(best_val_loss = state.best_val_loss, "Training finished");
		Ok(state)
	}
}

fn report(result: Result<()>, tag: &str) {
	if let Err(err) = result {
		tracing::warn!(tag, error = %err, "Metrics sink rejected event");
	}
}

fn emit_grids(sink: &mut dyn MetricsSink, sample: &VisualSample, step: usize) {
	let grids: [(&str, &Array4<f32>); 3] = [
		("clean images", &sample.clean),
		("noisy images", &sample.noisy),
		("denoised images", &sample.denoised),
	];
	for (tag, batch) in grids.iter() {
		let result = make_grid(batch.view()).and_then(|grid| sink.add_image(tag, &grid, step));
		report(result, tag);
	}
}
