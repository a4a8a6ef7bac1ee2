use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ndarray::{stack, Array3, Array4, Axis};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::constants::io::PREFETCH_DEPTH;
use crate::error::{DenoiseError, Result};
use crate::store::PatchStore;

/// Builds the loader thread pool. `None` uses every available core.
pub fn build_pool(workers: Option<usize>) -> Result<Arc<ThreadPool>> {
	let threads = workers.unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
	rayon::ThreadPoolBuilder::new()
		.num_threads(threads)
		.thread_name(|i| format!("patch-loader-{}", i))
		.build()
		.map(Arc::new)
		.map_err(|e| DenoiseError::ResourceExhaustion(format!("could not start loader threads: {}", e)))
}

/// Cuts a store into consecutive batches in accessor order. The final batch
/// holds the remainder and may be smaller than `batch_size`.
#[derive(Debug)]
pub struct DataLoader {
	store: Arc<PatchStore>,
	batch_size: usize,
	pool: Arc<ThreadPool>,
}

impl DataLoader {
	pub fn new(store: Arc<PatchStore>, batch_size: usize, pool: Arc<ThreadPool>) -> Self {
		DataLoader {
			store,
			batch_size: batch_size.max(1),
			pool,
		}
	}

	pub fn store(&self) -> &PatchStore {
		&self.store
	}

	pub fn num_batches(&self) -> usize {
		(self.store.len() + self.batch_size - 1) / self.batch_size
	}

	/// Starts a producer thread that prefetches up to `PREFETCH_DEPTH` batches.
	pub fn batches(&self) -> Batches {
		let (sender, receiver) = sync_channel(PREFETCH_DEPTH);
		let store = Arc::clone(&self.store);
		let pool = Arc::clone(&self.pool);
		let batch_size = self.batch_size;

		let handle = thread::spawn(move || {
			let len = store.len();
			for start in (0..len).step_by(batch_size) {
				let end = (start + batch_size).min(len);
				let batch = load_batch(&store, &pool, start, end);
				let failed = batch.is_err();
				if sender.send(batch).is_err() || failed {
					break;
				}
			}
		});

		Batches {
			receiver: Some(receiver),
			handle: Some(handle),
		}
	}
}

fn load_batch(store: &PatchStore, pool: &ThreadPool, start: usize, end: usize) -> Result<Array4<f32>> {
	let patches: Vec<Array3<f32>> = pool.install(|| {
		(start..end)
			.into_par_iter()
			.map(|i| store.get(i))
			.collect::<Result<Vec<_>>>()
	})?;
	let views: Vec<_> = patches.iter().map(|p| p.view()).collect();
	Ok(stack(Axis(0), &views)?)
}

/// Batches of one pass over the store, in order.
pub struct Batches {
	receiver: Option<Receiver<Result<Array4<f32>>>>,
	handle: Option<JoinHandle<()>>,
}

impl Iterator for Batches {
	type Item = Result<Array4<f32>>;

	fn next(&mut self) -> Option<Self::Item> {
		self.receiver.as_ref().and_then(|r| r.recv().ok())
	}
}

impl Drop for Batches {
	fn drop(&mut self) {
		// Closing the channel first unblocks a producer waiting on a full queue.
		self.receiver.take();
		if let Some(handle) = self.handle.take() {
			if handle.join().is_err() {
				tracing::warn!("Batch loader thread panicked");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{PatchStoreWriter, StoreOptions};
	use tempfile::TempDir;

	fn loader(dir: &TempDir, count: usize, batch_size: usize, workers: usize) -> DataLoader {
		let path = dir.path().join("loader.dnps");
		let mut writer = PatchStoreWriter::create(&path);
		for i in 0..count {
			writer
				.insert(format!("{:04}", i), Array3::from_elem((1, 2, 2), i as f32).view())
				.unwrap();
		}
		writer.finish().unwrap();
		let store = PatchStore::open(&path, StoreOptions { seed: Some(9), cache: false }).unwrap();
		DataLoader::new(Arc::new(store), batch_size, build_pool(Some(workers)).unwrap())
	}

	#[test]
	fn keeps_accessor_order_with_partial_tail() {
		let dir = TempDir::new().unwrap();
		let loader = loader(&dir, 7, 3, 4);
		assert_eq!(loader.num_batches(), 3);

		let expected: Vec<f32> = (0..7).map(|i| loader.store().get(i).unwrap()[[0, 0, 0]]).collect();
		let batches: Vec<Array4<f32>> = loader.batches().collect::<Result<_>>().unwrap();
		let sizes: Vec<usize> = batches.iter().map(|b| b.len_of(Axis(0))).collect();
		assert_eq!(sizes, vec![3, 3, 1]);

		let seen: Vec<f32> = batches.iter().flat_map(|b| b.outer_iter().map(|p| p[[0, 0, 0]]).collect::<Vec<_>>()).collect();
		assert_eq!(seen, expected);
	}

	#[test]
	fn batches_share_one_shape() {
		let dir = TempDir::new().unwrap();
		let loader = loader(&dir, 5, 2, 2);
		for batch in loader.batches() {
			let batch = batch.unwrap();
			assert_eq!(&batch.shape()[1..], &[1, 2, 2]);
		}
	}

	#[test]
	fn dropping_mid_pass_stops_the_producer() {
		let dir = TempDir::new().unwrap();
		let loader = loader(&dir, 50, 1, 1);
		let mut batches = loader.batches();
		assert!(batches.next().is_some());
		drop(batches);
	}

	#[test]
	fn load_failures_end_the_pass() {
		let dir = TempDir::new().unwrap();
		let loader = loader(&dir, 4, 2, 1);
		std::fs::remove_file(dir.path().join("loader.dnps")).unwrap();
		let results: Vec<Result<Array4<f32>>> = loader.batches().collect();
		assert_eq!(results.len(), 1);
		assert!(results[0].is_err());
	}
}
