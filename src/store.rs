//! Keyed patch store and the shuffled accessor used by the data loader.
//!
//! A store file holds an 8 byte magic, a little endian `u32` format version,
//! a little endian `u64` index length, the bincode encoded index, and then the
//! raw little endian `f32` values of every patch in channel-major order.

use std::collections::HashSet;
use std::convert::TryFrom;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dashmap::DashMap;
use ndarray::{Array3, ArrayView3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_derive::{Deserialize, Serialize};

use crate::constants::io::{STORE_MAGIC, STORE_VERSION};
use crate::error::{DenoiseError, Result};

const HEADER_LEN: u64 = 8 + 4 + 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
	key: String,
	shape: [usize; 3],
	/// Byte offset relative to the start of the data section.
	offset: u64,
}

impl IndexEntry {
	fn element_count(&self) -> usize {
		self.shape.iter().product()
	}

	/// End of the patch's bytes within the data section, `None` on overflow.
	fn checked_end(&self) -> Option<u64> {
		let count = self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
		let bytes = u64::try_from(count).ok()?.checked_mul(4)?;
		self.offset.checked_add(bytes)
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
	/// Fixes the key permutation. `None` seeds from OS entropy.
	pub seed: Option<u64>,
	/// Keep decoded patches in memory after their first read.
	pub cache: bool,
}

/// Read-only, shuffled view over a patch store file.
///
/// The key order is shuffled once in `open` and stays fixed for the lifetime
/// of the accessor. Patches are read from disk on every `get` unless caching
/// was requested.
#[derive(Debug)]
pub struct PatchStore {
	path: PathBuf,
	entries: Vec<IndexEntry>,
	data_start: u64,
	cache: Option<DashMap<usize, Array3<f32>>>,
}

impl PatchStore {
	pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
		let path = path.as_ref();
		if !path.exists() {
			return Err(DenoiseError::StoreNotFound(path.to_path_buf()));
		}

		let file_len = fs::metadata(path)?.len();
		let mut reader = BufReader::new(File::open(path)?);

		let mut magic = [0u8; 8];
		reader
			.read_exact(&mut magic)
			.map_err(|_| DenoiseError::CorruptStore(format!("{} is too short", path.display())))?;
		if &magic != STORE_MAGIC {
			return Err(DenoiseError::CorruptStore(format!(
				"{} is not a patch store",
				path.display()
			)));
		}

		let version = reader.read_u32::<LittleEndian>()?;
		if version != STORE_VERSION {
			return Err(DenoiseError::CorruptStore(format!(
				"unsupported store version {} (expected {})",
				version, STORE_VERSION
			)));
		}

		let index_len = reader.read_u64::<LittleEndian>()?;
		let data_start = match HEADER_LEN.checked_add(index_len) {
			Some(end) if end <= file_len => end,
			_ => {
				return Err(DenoiseError::CorruptStore(format!(
					"index of {} bytes does not fit in {}",
					index_len,
					path.display()
				)))
			}
		};
		let mut index_bytes = vec![0u8; index_len as usize];
		reader.read_exact(&mut index_bytes)?;
		let mut entries: Vec<IndexEntry> = bincode::deserialize(&index_bytes)
			.map_err(|e| DenoiseError::CorruptStore(format!("unreadable index: {}", e)))?;

		let data_len = file_len - data_start;
		for entry in &entries {
			if entry.checked_end().map_or(true, |end| end > data_len) {
				return Err(DenoiseError::CorruptStore(format!(
					"patch '{}' extends past the end of the file",
					entry.key
				)));
			}
		}

		// Sorting first makes a fixed seed reproducible regardless of
		// insertion order.
		entries.sort_by(|a, b| a.key.cmp(&b.key));
		let mut rng = match options.seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};
		entries.shuffle(&mut rng);

		tracing::debug!(
			path = %path.display(),
			patches = entries.len(),
			cache = options.cache,
			"Opened patch store"
		);

		Ok(PatchStore {
			path: path.to_path_buf(),
			entries,
			data_start,
			cache: if options.cache { Some(DashMap::new()) } else { None },
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Keys in shuffled order.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(|e| e.key.as_str())
	}

	/// Shape of the first patch in shuffled order, representative of all patches.
	pub fn shape(&self) -> Result<(usize, usize, usize)> {
		let entry = self
			.entries
			.first()
			.ok_or(DenoiseError::IndexOutOfRange { index: 0, len: 0 })?;
		Ok((entry.shape[0], entry.shape[1], entry.shape[2]))
	}

	pub fn get(&self, index: usize) -> Result<Array3<f32>> {
		let entry = self.entries.get(index).ok_or(DenoiseError::IndexOutOfRange {
			index,
			len: self.entries.len(),
		})?;

		if let Some(cache) = &self.cache {
			if let Some(patch) = cache.get(&index) {
				return Ok(patch.value().clone());
			}
		}

		let patch = self.read_patch(entry)?;
		if let Some(cache) = &self.cache {
			cache.insert(index, patch.clone());
		}
		Ok(patch)
	}

	fn read_patch(&self, entry: &IndexEntry) -> Result<Array3<f32>> {
		let mut reader = BufReader::new(File::open(&self.path)?);
		reader.seek(SeekFrom::Start(self.data_start + entry.offset))?;

		let count = entry.element_count();
		let mut values = Vec::new();
		values.try_reserve_exact(count)?;
		values.resize(count, 0.0f32);
		reader.read_f32_into::<LittleEndian>(&mut values)?;

		let [c, h, w] = entry.shape;
		Ok(Array3::from_shape_vec((c, h, w), values)?)
	}
}

/// Builds a patch store file. All patches must share one shape.
pub struct PatchStoreWriter {
	path: PathBuf,
	entries: Vec<IndexEntry>,
	keys: HashSet<String>,
	data: Vec<u8>,
}

impl PatchStoreWriter {
	pub fn create(path: impl AsRef<Path>) -> Self {
		PatchStoreWriter {
			path: path.as_ref().to_path_buf(),
			entries: Vec::new(),
			keys: HashSet::new(),
			data: Vec::new(),
		}
	}

	pub fn insert(&mut self, key: impl Into<String>, patch: ArrayView3<f32>) -> Result<()> {
		let key = key.into();
		if self.keys.contains(&key) {
			return Err(DenoiseError::InvalidParameter(format!("Duplicate patch key '{}'", key)));
		}

		let (c, h, w) = patch.dim();
		let shape = [c, h, w];
		if let Some(first) = self.entries.first() {
			if first.shape != shape {
				return Err(DenoiseError::ShapeMismatch(format!(
					"patch '{}' has shape {:?}, store holds {:?}",
					key, shape, first.shape
				)));
			}
		}

		let offset = self.data.len() as u64;
		for &value in patch.iter() {
			self.data.write_f32::<LittleEndian>(value)?;
		}
		self.keys.insert(key.clone());
		self.entries.push(IndexEntry { key, shape, offset });
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn finish(self) -> Result<()> {
		let index = bincode::serialize(&self.entries)?;

		let mut writer = BufWriter::new(File::create(&self.path)?);
		writer.write_all(STORE_MAGIC)?;
		writer.write_u32::<LittleEndian>(STORE_VERSION)?;
		writer.write_u64::<LittleEndian>(index.len() as u64)?;
		writer.write_all(&index)?;
		writer.write_all(&self.data)?;
		writer.flush()?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn write_store(dir: &TempDir, count: usize) -> PathBuf {
		let path = dir.path().join("patches.dnps");
		let mut writer = PatchStoreWriter::create(&path);
		for i in 0..count {
			let patch = Array3::from_elem((1, 4, 4), i as f32);
			writer.insert(format!("patch_{:03}", i), patch.view()).unwrap();
		}
		writer.finish().unwrap();
		path
	}

	#[test]
	fn missing_store_is_reported() {
		let dir = TempDir::new().unwrap();
		let result = PatchStore::open(dir.path().join("absent.dnps"), StoreOptions::default());
		assert!(matches!(result, Err(DenoiseError::StoreNotFound(_))));
	}

	#[test]
	fn round_trips_every_patch() {
		let dir = TempDir::new().unwrap();
		let path = write_store(&dir, 6);
		let store = PatchStore::open(&path, StoreOptions { seed: Some(3), cache: false }).unwrap();

		assert_eq!(store.len(), 6);
		assert_eq!(store.shape().unwrap(), (1, 4, 4));

		let mut seen: Vec<f32> = (0..store.len()).map(|i| store.get(i).unwrap()[[0, 0, 0]]).collect();
		seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
		assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
	}

	#[test]
	fn patch_matches_its_shuffled_key() {
		let dir = TempDir::new().unwrap();
		let path = write_store(&dir, 5);
		let store = PatchStore::open(&path, StoreOptions { seed: Some(11), cache: false }).unwrap();

		for (i, key) in store.keys().enumerate() {
			let expected: f32 = key.trim_start_matches("patch_").parse::<usize>().unwrap() as f32;
			assert!(store.get(i).unwrap().iter().all(|&v| v == expected));
		}
	}

	#[test]
	fn fixed_seed_gives_stable_order() {
		let dir = TempDir::new().unwrap();
		let path = write_store(&dir, 20);
		let a = PatchStore::open(&path, StoreOptions { seed: Some(42), cache: false }).unwrap();
		let b = PatchStore::open(&path, StoreOptions { seed: Some(42), cache: true }).unwrap();
		assert!(a.keys().eq(b.keys()));
	}

	#[test]
	fn out_of_range_index_fails() {
		let dir = TempDir::new().unwrap();
		let path = write_store(&dir, 2);
		let store = PatchStore::open(&path, StoreOptions::default()).unwrap();
		match store.get(2) {
			Err(DenoiseError::IndexOutOfRange { index, len }) => {
				assert_eq!(index, 2);
				assert_eq!(len, 2);
			}
			other => panic!("expected IndexOutOfRange, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn cached_reads_survive_file_removal() {
		let dir = TempDir::new().unwrap();
		let path = write_store(&dir, 3);
		let store = PatchStore::open(&path, StoreOptions { seed: Some(1), cache: true }).unwrap();
		let first = store.get(0).unwrap();
		fs::remove_file(&path).unwrap();
		assert_eq!(store.get(0).unwrap(), first);
		assert!(store.get(1).is_err());
	}

	#[test]
	fn empty_store_has_no_shape() {
		let dir = TempDir::new().unwrap();
		let path = write_store(&dir, 0);
		let store = PatchStore::open(&path, StoreOptions::default()).unwrap();
		assert!(store.is_empty());
		assert!(matches!(store.shape(), Err(DenoiseError::IndexOutOfRange { .. })));
	}

	#[test]
	fn rejects_foreign_files() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("not_a_store.dnps");
		fs::write(&path, b"definitely not a patch store").unwrap();
		let result = PatchStore::open(&path, StoreOptions::default());
		assert!(matches!(result, Err(DenoiseError::CorruptStore(_))));
	}

	fn write_raw_header(path: &Path, index_len: u64, index: &[u8]) {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(STORE_MAGIC);
		bytes.write_u32::<LittleEndian>(STORE_VERSION).unwrap();
		bytes.write_u64::<LittleEndian>(index_len).unwrap();
		bytes.extend_from_slice(index);
		fs::write(path, bytes).unwrap();
	}

	#[test]
	fn oversized_index_length_is_corrupt() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("huge_index.dnps");
		write_raw_header(&path, u64::MAX, &[]);
		let result = PatchStore::open(&path, StoreOptions::default());
		assert!(matches!(result, Err(DenoiseError::CorruptStore(_))));
	}

	#[test]
	fn overflowing_patch_extent_is_corrupt() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("huge_patch.dnps");
		let entries = vec![IndexEntry {
			key: "a".to_string(),
			shape: [usize::MAX, 2, 1],
			offset: u64::MAX - 1,
		}];
		let index = bincode::serialize(&entries).unwrap();
		write_raw_header(&path, index.len() as u64, &index);
		let result = PatchStore::open(&path, StoreOptions::default());
		assert!(matches!(result, Err(DenoiseError::CorruptStore(_))));
	}

	#[test]
	fn writer_enforces_uniform_shape_and_unique_keys() {
		let dir = TempDir::new().unwrap();
		let mut writer = PatchStoreWriter::create(dir.path().join("s.dnps"));
		writer.insert("a", Array3::<f32>::zeros((1, 4, 4)).view()).unwrap();

		let dup = writer.insert("a", Array3::<f32>::zeros((1, 4, 4)).view());
		assert!(matches!(dup, Err(DenoiseError::InvalidParameter(_))));

		let odd = writer.insert("b", Array3::<f32>::zeros((3, 4, 4)).view());
		assert!(matches!(odd, Err(DenoiseError::ShapeMismatch(_))));
		assert_eq!(writer.len(), 1);
	}
}
