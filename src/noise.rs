use ndarray::{Array4, Ix4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::constants::training::NOISE_SCALE;
use crate::error::{DenoiseError, Result};

/// Draws additive white Gaussian noise on the normalized [0, 1] intensity scale.
#[derive(Debug)]
pub struct NoiseSynthesizer {
	sigma: f32,
	normal: Normal<f32>,
	rng: StdRng,
}

impl NoiseSynthesizer {
	/// `noise_level` is a standard deviation on the [0, 255] scale.
	pub fn new(noise_level: f64, seed: Option<u64>) -> Result<Self> {
		if !(noise_level >= 0.0 && noise_level.is_finite()) {
			return Err(DenoiseError::InvalidParameter(format!(
				"Noise level ({}) must be a non-negative number",
				noise_level
			)));
		}
		let sigma = (noise_level / NOISE_SCALE) as f32;
		let normal = Normal::new(0.0, sigma).map_err(|e| DenoiseError::InvalidParameter(e.to_string()))?;
		let rng = match seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};
		Ok(NoiseSynthesizer { sigma, normal, rng })
	}

	pub fn sigma(&self) -> f32 {
		self.sigma
	}

	/// A fresh noise tensor of the given batch shape.
	pub fn sample(&mut self, shape: Ix4) -> Array4<f32> {
		if self.sigma == 0.0 {
			return Array4::zeros(shape);
		}
		let normal = &self.normal;
		let rng = &mut self.rng;
		Array4::from_shape_simple_fn(shape, || normal.sample(&mut *rng))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::Dim;

	#[test]
	fn matches_requested_shape() {
		let mut noise = NoiseSynthesizer::new(25.0, Some(1)).unwrap();
		let sample = noise.sample(Dim([2, 3, 5, 7]));
		assert_eq!(sample.shape(), &[2, 3, 5, 7]);
	}

	#[test]
	fn zero_level_gives_zero_noise() {
		let mut noise = NoiseSynthesizer::new(0.0, None).unwrap();
		assert!(noise.sample(Dim([4, 1, 8, 8])).iter().all(|&v| v == 0.0));
	}

	#[test]
	fn converges_to_zero_mean_and_sigma() {
		let mut noise = NoiseSynthesizer::new(25.0, Some(7)).unwrap();
		let sample = noise.sample(Dim([16, 1, 64, 64]));
		let n = sample.len() as f64;
		let mean = sample.iter().map(|&v| v as f64).sum::<f64>() / n;
		let var = sample.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
		let sigma = 25.0 / 255.0;

		assert!(mean.abs() < 0.005, "mean {} too far from 0", mean);
		assert!((var.sqrt() - sigma).abs() < 0.005, "std {} too far from {}", var.sqrt(), sigma);
	}

	#[test]
	fn draws_differ_between_calls() {
		let mut noise = NoiseSynthesizer::new(10.0, Some(3)).unwrap();
		let a = noise.sample(Dim([1, 1, 4, 4]));
		let b = noise.sample(Dim([1, 1, 4, 4]));
		assert_ne!(a, b);
	}

	#[test]
	fn rejects_negative_level() {
		assert!(NoiseSynthesizer::new(-1.0, None).is_err());
	}
}
