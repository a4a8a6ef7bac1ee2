//! The denoising network seam and the bundled CPU DnCNN implementation.

use ndarray::parallel::prelude::*;
use ndarray::{s, Array1, Array4, ArrayD, ArrayView1, ArrayView4, Axis, Ix1, Ix4, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::config::ModelParams;
use crate::constants::network::KAIMING_GAIN;
use crate::error::{DenoiseError, Result};
use crate::training::checkpoint::ModelCheckpoint;

/// A network that maps a corrupted N×C×H×W batch to a predicted noise residual
/// of the same shape.
///
/// Training goes through `forward_traced` followed by `backward`; evaluation
/// only ever calls `forward`, which takes `&self` and cannot change parameters.
pub trait Denoiser {
	/// Whatever the network needs to keep from the forward pass to compute
	/// gradients.
	type Trace;

	fn model_params(&self) -> ModelParams;

	fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

	fn forward_traced(&self, input: &Array4<f32>) -> Result<(Array4<f32>, Self::Trace)>;

	/// Gradients of the loss for every entry of `parameters()`, in the same
	/// order, given the gradient of the loss with respect to the output.
	fn backward(&self, trace: Self::Trace, output_grad: &Array4<f32>) -> Result<Vec<ArrayD<f32>>>;

	fn parameters(&self) -> &[ArrayD<f32>];

	fn parameters_mut(&mut self) -> &mut [ArrayD<f32>];
}

/// Plain DnCNN stack: `num_layers` "same" convolutions with a ReLU after every
/// layer but the last. The first layer maps `num_channels` to `num_filters`
/// and the last maps back; a single layer maps channels to channels.
///
/// Parameters are stored as `[w0, b0, w1, b1, ...]` with weights shaped
/// `[out, in, k, k]`.
#[derive(Debug, Clone)]
pub struct DnCnn {
	params: ModelParams,
	parameters: Vec<ArrayD<f32>>,
}

pub struct DnCnnTrace {
	/// Input to every layer, the first being the network input.
	inputs: Vec<Array4<f32>>,
}

fn layer_channels(params: &ModelParams) -> Vec<(usize, usize)> {
	let c = params.num_channels;
	let f = params.num_filters;
	match params.num_layers {
		0 => Vec::new(),
		1 => vec![(c, c)],
		n => {
			let mut layers = vec![(c, f)];
			layers.extend(std::iter::repeat((f, f)).take(n - 2));
			layers.push((f, c));
			layers
		}
	}
}

fn validate_params(params: &ModelParams) -> Result<()> {
	if params.num_channels == 0 || params.num_layers == 0 || params.num_filters == 0 {
		return Err(DenoiseError::InvalidParameter(format!(
			"Degenerate network description: {:?}",
			params
		)));
	}
	if params.kernel_size % 2 == 0 {
		return Err(DenoiseError::InvalidParameter(format!(
			"Filter size ({}) must be odd",
			params.kernel_size
		)));
	}
	if params.stride != 1 {
		return Err(DenoiseError::InvalidParameter(format!(
			"Stride ({}) must be 1 for a residual denoiser",
			params.stride
		)));
	}
	Ok(())
}

impl DnCnn {
	/// Kaiming-normal weights and zero biases.
	pub fn new(params: ModelParams, seed: Option<u64>) -> Result<Self> {
		validate_params(&params)?;
		let mut rng = match seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};

		let k = params.kernel_size;
		let mut parameters = Vec::new();
		for (cin, cout) in layer_channels(&params) {
			let fan_in = (cin * k * k) as f32;
			let normal = Normal::new(0.0, (KAIMING_GAIN / fan_in).sqrt())
				.map_err(|e| DenoiseError::InvalidParameter(e.to_string()))?;
			let weight = Array4::from_shape_simple_fn((cout, cin, k, k), || normal.sample(&mut rng));
			parameters.push(weight.into_dyn());
			parameters.push(Array1::<f32>::zeros(cout).into_dyn());
		}

		Ok(DnCnn { params, parameters })
	}

	/// Rebuilds a network from a saved checkpoint, checking every parameter
	/// shape against the stored hyperparameters.
	pub fn from_checkpoint(checkpoint: ModelCheckpoint) -> Result<Self> {
		let params = checkpoint.model;
		validate_params(&params)?;

		let layers = layer_channels(&params);
		if checkpoint.parameters.len() != layers.len() * 2 {
			return Err(DenoiseError::ShapeMismatch(format!(
				"checkpoint holds {} tensors, a {}-layer network needs {}",
				checkpoint.parameters.len(),
				params.num_layers,
				layers.len() * 2
			)));
		}
		let k = params.kernel_size;
		for (i, (cin, cout)) in layers.into_iter().enumerate() {
			let weight = &checkpoint.parameters[2 * i];
			let bias = &checkpoint.parameters[2 * i + 1];
			if weight.shape() != [cout, cin, k, k] || bias.shape() != [cout] {
				return Err(DenoiseError::ShapeMismatch(format!(
					"layer {} has weight {:?} and bias {:?}",
					i,
					weight.shape(),
					bias.shape()
				)));
			}
		}

		Ok(DnCnn {
			params,
			parameters: checkpoint.parameters,
		})
	}

	fn num_layers(&self) -> usize {
		self.parameters.len() / 2
	}

	fn layer(&self, index: usize) -> Result<(ArrayView4<f32>, ArrayView1<f32>)> {
		let weight = self.parameters[2 * index].view().into_dimensionality::<Ix4>()?;
		let bias = self.parameters[2 * index + 1].view().into_dimensionality::<Ix1>()?;
		Ok((weight, bias))
	}

	fn run(&self, input: &Array4<f32>, keep_inputs: bool) -> Result<(Array4<f32>, Vec<Array4<f32>>)> {
		let channels = input.len_of(Axis(1));
		if channels != self.params.num_channels {
			return Err(DenoiseError::ShapeMismatch(format!(
				"network expects {} channels, batch has {}",
				self.params.num_channels, channels
			)));
		}

		let layers = self.num_layers();
		let mut inputs = Vec::with_capacity(if keep_inputs { layers } else { 0 });
		let mut x = input.clone();
		for index in 0..layers {
			let (weight, bias) = self.layer(index)?;
			let mut y = conv2d(x.view(), weight, bias);
			if index + 1 < layers {
				y.mapv_inplace(|v| v.max(0.0));
			}
			let previous = std::mem::replace(&mut x, y);
			if keep_inputs {
				inputs.push(previous);
			}
		}
		Ok((x, inputs))
	}
}

impl Denoiser for DnCnn {
	type Trace = DnCnnTrace;

	fn model_params(&self) -> ModelParams {
		self.params
	}

	fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
		self.run(input, false).map(|(output, _)| output)
	}

	fn forward_traced(&self, input: &Array4<f32>) -> Result<(Array4<f32>, DnCnnTrace)> {
		let (output, inputs) = self.run(input, true)?;
		Ok((output, DnCnnTrace { inputs }))
	}

	fn backward(&self, trace: DnCnnTrace, output_grad: &Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
		let layers = self.num_layers();
		if trace.inputs.len() != layers {
			return Err(DenoiseError::ShapeMismatch(format!(
				"trace holds {} layer inputs, network has {} layers",
				trace.inputs.len(),
				layers
			)));
		}
		if output_grad.dim() != trace.inputs[0].dim() {
			return Err(DenoiseError::ShapeMismatch(format!(
				"output gradient {:?} does not match input {:?}",
				output_grad.shape(),
				trace.inputs[0].shape()
			)));
		}

		let mut grads: Vec<ArrayD<f32>> = self.parameters.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect();
		let mut grad = output_grad.clone();
		for index in (0..layers).rev() {
			if index + 1 < layers {
				// ReLU mask: the next layer's input is this layer's activation.
				Zip::from(&mut grad)
					.and(&trace.inputs[index + 1])
					.for_each(|g, &a| {
						if a <= 0.0 {
							*g = 0.0;
						}
					});
			}
			let (weight, _) = self.layer(index)?;
			let (grad_weight, grad_bias, grad_input) =
				conv2d_backward(trace.inputs[index].view(), weight, grad.view(), index > 0);
			grads[2 * index] = grad_weight.into_dyn();
			grads[2 * index + 1] = grad_bias.into_dyn();
			if let Some(grad_input) = grad_input {
				grad = grad_input;
			}
		}
		Ok(grads)
	}

	fn parameters(&self) -> &[ArrayD<f32>] {
		&self.parameters
	}

	fn parameters_mut(&mut self) -> &mut [ArrayD<f32>] {
		&mut self.parameters
	}
}

fn pad(input: ArrayView4<f32>, p: usize) -> Array4<f32> {
	if p == 0 {
		return input.to_owned();
	}
	let (n, c, h, w) = input.dim();
	let mut padded = Array4::zeros((n, c, h + 2 * p, w + 2 * p));
	padded.slice_mut(s![.., .., p..p + h, p..p + w]).assign(&input);
	padded
}

/// Stride-1 convolution with zero padding that preserves H and W.
fn conv2d(input: ArrayView4<f32>, weight: ArrayView4<f32>, bias: ArrayView1<f32>) -> Array4<f32> {
	let (n, cin, h, w) = input.dim();
	let (cout, _, k, _) = weight.dim();
	let padded = pad(input, k / 2);
	debug_assert_eq!(padded.len_of(Axis(0)), n);
	let mut output = Array4::zeros((n, cout, h, w));

	output
		.axis_iter_mut(Axis(0))
		.into_par_iter()
		.zip(padded.axis_iter(Axis(0)).into_par_iter())
		.for_each(|(mut out, x)| {
			for oc in 0..cout {
				let mut plane = out.index_axis_mut(Axis(0), oc);
				plane.fill(bias[oc]);
				for ic in 0..cin {
					let channel = x.index_axis(Axis(0), ic);
					for ky in 0..k {
						for kx in 0..k {
							let wv = weight[[oc, ic, ky, kx]];
							if wv != 0.0 {
								plane.scaled_add(wv, &channel.slice(s![ky..ky + h, kx..kx + w]));
							}
						}
					}
				}
			}
		});
	output
}

/// Returns (weight gradient, bias gradient, input gradient if requested).
fn conv2d_backward(
	input: ArrayView4<f32>,
	weight: ArrayView4<f32>,
	grad_output: ArrayView4<f32>,
	want_input_grad: bool,
) -> (Array4<f32>, Array1<f32>, Option<Array4<f32>>) {
	let (n, cin, h, w) = input.dim();
	let (cout, _, k, _) = weight.dim();
	let p = k / 2;
	let padded = pad(input, p);

	let grad_bias = grad_output.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0));

	let mut grad_weight = Array4::<f32>::zeros((cout, cin, k, k));
	grad_weight
		.axis_iter_mut(Axis(0))
		.into_par_iter()
		.enumerate()
		.for_each(|(oc, mut gw)| {
			for b in 0..n {
				let g = grad_output.slice(s![b, oc, .., ..]);
				for ic in 0..cin {
					for ky in 0..k {
						for kx in 0..k {
							let window = padded.slice(s![b, ic, ky..ky + h, kx..kx + w]);
							let mut acc = 0.0f32;
							Zip::from(&g).and(&window).for_each(|&a, &x| acc += a * x);
							gw[[ic, ky, kx]] += acc;
						}
					}
				}
			}
		});

	let grad_input = if want_input_grad {
		let mut grad_padded = Array4::<f32>::zeros(padded.raw_dim());
		grad_padded
			.axis_iter_mut(Axis(0))
			.into_par_iter()
			.zip(grad_output.axis_iter(Axis(0)).into_par_iter())
			.for_each(|(mut gx, g)| {
				for oc in 0..cout {
					let g_plane = g.index_axis(Axis(0), oc);
					for ic in 0..cin {
						for ky in 0..k {
							for kx in 0..k {
								let wv = weight[[oc, ic, ky, kx]];
								if wv != 0.0 {
									gx.slice_mut(s![ic, ky..ky + h, kx..kx + w]).scaled_add(wv, &g_plane);
								}
							}
						}
					}
				}
			});
		Some(grad_padded.slice(s![.., .., p..p + h, p..p + w]).to_owned())
	} else {
		None
	};

	(grad_weight, grad_bias, grad_input)
}
