use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DenoiseError {
	#[error("Patch store not found: {}", .0.display())]
	StoreNotFound(PathBuf),

	#[error("Patch store is empty: {}", .0.display())]
	EmptyStore(PathBuf),

	#[error("Corrupt patch store: {0}")]
	CorruptStore(String),

	#[error("Index {index} out of range for store of {len} patches")]
	IndexOutOfRange { index: usize, len: usize },

	#[error("Shape mismatch: {0}")]
	ShapeMismatch(String),

	#[error("Resource exhausted: {0}")]
	ResourceExhaustion(String),

	#[error("Invalid parameter: {0}")]
	InvalidParameter(String),

	#[error("Parse error: {0}")]
	Parse(String),

	#[error("Serialization error: {0}")]
	Serialization(String),

	#[error("Metrics sink error: {0}")]
	Sink(String),

	#[error("IO error: {0}")]
	Io(#[from] io::Error),

	#[error("Image processing error: {0}")]
	Image(#[from] image::ImageError),
}

impl From<bincode::Error> for DenoiseError {
	fn from(err: bincode::Error) -> Self {
		DenoiseError::Serialization(err.to_string())
	}
}

impl From<serde_pickle::Error> for DenoiseError {
	fn from(err: serde_pickle::Error) -> Self {
		DenoiseError::Serialization(err.to_string())
	}
}

impl From<ndarray::ShapeError> for DenoiseError {
	fn from(err: ndarray::ShapeError) -> Self {
		DenoiseError::ShapeMismatch(err.to_string())
	}
}

impl From<std::collections::TryReserveError> for DenoiseError {
	fn from(err: std::collections::TryReserveError) -> Self {
		DenoiseError::ResourceExhaustion(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, DenoiseError>;
