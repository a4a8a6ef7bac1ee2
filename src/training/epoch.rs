//! One pass over a data loader, in training or evaluation mode.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array4, Axis, Zip};

use crate::error::{DenoiseError, Result};
use crate::model::Denoiser;
use crate::noise::NoiseSynthesizer;
use crate::optim::Optimizer;
use crate::psnr::batch_psnr;
use crate::training::data_loader::DataLoader;

/// Clean, corrupted and reconstructed images of one validation batch.
#[derive(Debug, Clone)]
pub struct VisualSample {
	pub clean: Array4<f32>,
	pub noisy: Array4<f32>,
	pub denoised: Array4<f32>,
}

#[derive(Debug, Clone)]
pub struct EvalOutcome {
	pub loss: f64,
	pub psnr: f64,
	/// Taken from the last batch of the pass.
	pub sample: Option<VisualSample>,
}

fn check_same_shape(predicted: &Array4<f32>, noise: &Array4<f32>) -> Result<()> {
	if predicted.shape() != noise.shape() {
		return Err(DenoiseError::ShapeMismatch(format!(
			"prediction {:?} vs noise {:?}",
			predicted.shape(),
			noise.shape()
		)));
	}
	Ok(())
}

/// Sum of squared errors divided by the number of examples in the batch.
///
/// Not a per-element mean, so the loss scales with the patch size.
pub fn residual_loss(predicted: &Array4<f32>, noise: &Array4<f32>) -> Result<f64> {
	check_same_shape(predicted, noise)?;
	let batch = predicted.len_of(Axis(0)).max(1) as f64;
	let mut sum = 0.0f64;
	Zip::from(predicted).and(noise).for_each(|&p, &n| {
		let diff = p as f64 - n as f64;
		sum += diff * diff;
	});
	Ok(sum / batch)
}

/// Gradient of `residual_loss` with respect to the prediction.
pub fn residual_loss_grad(predicted: &Array4<f32>, noise: &Array4<f32>) -> Result<Array4<f32>> {
	check_same_shape(predicted, noise)?;
	let scale = 2.0 / predicted.len_of(Axis(0)).max(1) as f32;
	let mut grad = predicted - noise;
	grad.mapv_inplace(|d| d * scale);
	Ok(grad)
}

fn progress_bar(len: usize, label: &'static str) -> ProgressBar {
	let bar = ProgressBar::new(len as u64);
	bar.set_style(
		ProgressStyle::with_template("{msg:>10} [{bar:40}] {pos}/{len} batches ({eta})")
			.unwrap_or_else(|_| ProgressStyle::default_bar())
			.progress_chars("=> "),
	);
	bar.set_message(label);
	bar
}

/// Runs one optimisation pass and returns the mean batch loss.
pub fn train_epoch<M, O>(
	model: &mut M,
	optimizer: &mut O,
	loader: &DataLoader,
	noise: &mut NoiseSynthesizer,
) -> Result<f64>
where
	M: Denoiser,
	O: Optimizer,
{
	let bar = progress_bar(loader.num_batches(), "train");
	let mut total_loss = 0.0;
	let mut steps = 0usize;

	for clean in loader.batches() {
		let clean = clean?;
		let residual = noise.sample(clean.raw_dim());
		let noisy = &clean + &residual;

		let (predicted, trace) = model.forward_traced(&noisy)?;
		let loss = residual_loss(&predicted, &residual)?;
		let grad = residual_loss_grad(&predicted, &residual)?;

		let grads = model.backward(trace, &grad)?;
		optimizer.step(model.parameters_mut(), &grads)?;

		total_loss += loss;
		steps += 1;
		bar.inc(1);
		tracing::trace!(step = steps, loss, "Training batch");
	}
	bar.finish_and_clear();

	if steps == 0 {
		return Err(DenoiseError::EmptyStore(loader.store().path().to_path_buf()));
	}
	Ok(total_loss / steps as f64)
}

/// Runs one evaluation pass without touching parameters and returns mean
/// loss and mean PSNR of the clamped reconstructions.
pub fn eval_epoch<M>(model: &M, loader: &DataLoader, noise: &mut NoiseSynthesizer) -> Result<EvalOutcome>
where
	M: Denoiser,
{
	let bar = progress_bar(loader.num_batches(), "validate");
	let mut total_loss = 0.0;
	let mut total_psnr = 0.0;
	let mut steps = 0usize;
	let mut last = None;

	for clean in loader.batches() {
		let clean = clean?;
		let residual = noise.sample(clean.raw_dim());
		let noisy = &clean + &residual;

		let predicted = model.forward(&noisy)?;
		total_loss += residual_loss(&predicted, &residual)?;

		let mut denoised = &noisy - &predicted;
		denoised.mapv_inplace(|v| v.max(0.0).min(1.0));
		total_psnr += batch_psnr(clean.view(), denoised.view())?;

		steps += 1;
		bar.inc(1);
		last = Some(VisualSample {
			clean,
			noisy,
			denoised,
		});
	}
	bar.finish_and_clear();

	if steps == 0 {
		return Err(DenoiseError::EmptyStore(loader.store().path().to_path_buf()));
	}
	Ok(EvalOutcome {
		loss: total_loss / steps as f64,
		psnr: total_psnr / steps as f64,
		sample: last,
	})
}
