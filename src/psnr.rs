use ndarray::{ArrayView3, ArrayView4, Zip};

use crate::constants::psnr::{DATA_RANGE, PSNR_CAP_DB};
use crate::error::{DenoiseError, Result};

/// Mean squared error between two equally shaped images, accumulated in f64.
fn mean_squared_error(reference: ArrayView3<f32>, candidate: ArrayView3<f32>) -> f64 {
	let mut err = 0.0f64;
	Zip::from(&reference).and(&candidate).for_each(|&r, &c| {
		let diff = r as f64 - c as f64;
		err += diff * diff;
	});
	err / reference.len().max(1) as f64
}

/// PSNR of a single C×H×W image against a reference, with a data range of 1.0.
///
/// Identical images have an infinite PSNR; `PSNR_CAP_DB` is reported instead.
pub fn psnr(reference: ArrayView3<f32>, candidate: ArrayView3<f32>) -> Result<f64> {
	if reference.shape() != candidate.shape() {
		return Err(DenoiseError::ShapeMismatch(format!(
			"reference image {:?} vs candidate image {:?}",
			reference.shape(),
			candidate.shape()
		)));
	}
	let mse = mean_squared_error(reference, candidate);
	if mse == 0.0 {
		return Ok(PSNR_CAP_DB);
	}
	Ok((10.0 * (DATA_RANGE * DATA_RANGE / mse).log10()).min(PSNR_CAP_DB))
}

/// Per-image PSNR averaged over an N×C×H×W batch.
pub fn batch_psnr(reference: ArrayView4<f32>, candidate: ArrayView4<f32>) -> Result<f64> {
	if reference.len_of(ndarray::Axis(0)) != candidate.len_of(ndarray::Axis(0)) {
		return Err(DenoiseError::ShapeMismatch(format!(
			"reference batch of {} images vs candidate batch of {}",
			reference.len_of(ndarray::Axis(0)),
			candidate.len_of(ndarray::Axis(0))
		)));
	}
	let count = reference.len_of(ndarray::Axis(0));
	if count == 0 {
		return Err(DenoiseError::ShapeMismatch("cannot score an empty batch".into()));
	}

	let mut total = 0.0;
	for (r, c) in reference.outer_iter().zip(candidate.outer_iter()) {
		total += psnr(r, c)?;
	}
	Ok(total / count as f64)
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::{Array3, Array4};

	#[test]
	fn half_intensity_error() {
		let a = Array3::<f32>::zeros((1, 2, 2));
		let b = Array3::<f32>::from_elem((1, 2, 2), 0.5);
		// mse = 0.25, 10 * log10(4)
		let expected = 10.0 * 4.0f64.log10();
		assert!((psnr(a.view(), b.view()).unwrap() - expected).abs() < 1e-9);
	}

	#[test]
	fn averages_per_image_not_per_pixel() {
		let reference = Array4::<f32>::zeros((2, 1, 2, 2));
		let mut candidate = Array4::<f32>::zeros((2, 1, 2, 2));
		candidate.slice_mut(ndarray::s![1, .., .., ..]).fill(1.0);
		// image 0 identical (capped), image 1 maximally wrong (0 dB)
		let value = batch_psnr(reference.view(), candidate.view()).unwrap();
		assert!((value - PSNR_CAP_DB / 2.0).abs() < 1e-9);
	}

	#[test]
	fn mismatched_images_are_rejected() {
		let a = Array3::<f32>::zeros((1, 2, 2));
		let b = Array3::<f32>::zeros((1, 3, 2));
		assert!(matches!(psnr(a.view(), b.view()), Err(DenoiseError::ShapeMismatch(_))));
	}
}
