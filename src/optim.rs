use ndarray::{ArrayD, Zip};

use crate::constants::training::{ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON};
use crate::error::{DenoiseError, Result};

/// Applies one update to a parameter set from its gradients.
pub trait Optimizer {
	fn step(&mut self, params: &mut [ArrayD<f32>], grads: &[ArrayD<f32>]) -> Result<()>;

	fn learning_rate(&self) -> f64;

	fn set_learning_rate(&mut self, rate: f64);
}

/// Adam with bias correction. Moment buffers are allocated on the first step.
#[derive(Debug, Clone)]
pub struct Adam {
	rate: f64,
	beta1: f64,
	beta2: f64,
	epsilon: f64,
	step: u64,
	first_moments: Vec<ArrayD<f32>>,
	second_moments: Vec<ArrayD<f32>>,
}

impl Adam {
	pub fn new(rate: f64) -> Self {
		Adam {
			rate,
			beta1: ADAM_BETA1,
			beta2: ADAM_BETA2,
			epsilon: ADAM_EPSILON,
			step: 0,
			first_moments: Vec::new(),
			second_moments: Vec::new(),
		}
	}

	pub fn steps_taken(&self) -> u64 {
		self.step
	}
}

impl Optimizer for Adam {
	fn step(&mut self, params: &mut [ArrayD<f32>], grads: &[ArrayD<f32>]) -> Result<()> {
		if params.len() != grads.len() {
			return Err(DenoiseError::ShapeMismatch(format!(
				"{} parameters but {} gradients",
				params.len(),
				grads.len()
			)));
		}
		for (i, (p, g)) in params.iter().zip(grads).enumerate() {
			if p.shape() != g.shape() {
				return Err(DenoiseError::ShapeMismatch(format!(
					"parameter {} is {:?}, gradient is {:?}",
					i,
					p.shape(),
					g.shape()
				)));
			}
		}

		if self.first_moments.is_empty() {
			self.first_moments = params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect();
			self.second_moments = params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect();
		}

		self.step += 1;
		let t = self.step as i32;
		let correction1 = 1.0 - self.beta1.powi(t);
		let correction2 = 1.0 - self.beta2.powi(t);
		let step_size = (self.rate / correction1) as f32;
		let correction2_sqrt = correction2.sqrt() as f32;
		let (beta1, beta2, epsilon) = (self.beta1 as f32, self.beta2 as f32, self.epsilon as f32);

		for (((p, g), m), v) in params
			.iter_mut()
			.zip(grads)
			.zip(self.first_moments.iter_mut())
			.zip(self.second_moments.iter_mut())
		{
			Zip::from(p).and(g).and(m).and(v).for_each(|p, &g, m, v| {
				*m = beta1 * *m + (1.0 - beta1) * g;
				*v = beta2 * *v + (1.0 - beta2) * g * g;
				*p -= step_size * *m / (v.sqrt() / correction2_sqrt + epsilon);
			});
		}
		Ok(())
	}

	fn learning_rate(&self) -> f64 {
		self.rate
	}

	fn set_learning_rate(&mut self, rate: f64) {
		self.rate = rate;
	}
}
