//! Sinks: the terminal operators of a pipeline. Each owns the external
//! resource it writes to instead of a downstream operator link — a sink is
//! always the last stage of a compiled pipeline.
//!
//! `InsertIntoOp` and `CollectOp` hold a [`Weak`] reference to the stream
//! manager that owns the pipeline they live in; a strong `Rc` back-edge
//! here would keep the manager (and therefore this very pipeline) alive
//! forever. If the manager has already been dropped a sink push becomes a
//! no-op rather than a panic — there is nothing left to deliver to.

use crate::err::Error;
use crate::stream::StreamManager;
use crate::value::Value;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

fn upgrade(manager: &Weak<RefCell<StreamManager>>) -> Option<Rc<RefCell<StreamManager>>> {
	manager.upgrade()
}

pub struct InsertIntoOp {
	pub target: String,
	manager: Weak<RefCell<StreamManager>>,
}

impl InsertIntoOp {
	pub fn new(target: String, manager: Weak<RefCell<StreamManager>>) -> Self {
		Self {
			target,
			manager,
		}
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		let manager = upgrade(&self.manager).ok_or_else(|| Error::ExecutionFailed("stream manager no longer exists".to_string()))?;
		StreamManager::insert(&manager, &self.target, record).await
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
		let manager = upgrade(&self.manager).ok_or_else(|| Error::ExecutionFailed("stream manager no longer exists".to_string()))?;
		StreamManager::flush_stream(&manager, &self.target).await
	}

	pub fn cancel(&mut self) {}
}

/// A terminal debug sink: republishes every record it sees to `_log` as an
/// `info` entry instead of writing anywhere external.
pub struct CollectOp {
	manager: Weak<RefCell<StreamManager>>,
}

impl CollectOp {
	pub fn new(manager: Weak<RefCell<StreamManager>>) -> Self {
		Self {
			manager,
		}
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		if let Some(manager) = upgrade(&self.manager) {
			StreamManager::log_info(&manager, "COLLECT", record.to_json_string()).await;
		}
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
		Ok(())
	}

	pub fn cancel(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileMode {
	Append,
	Overwrite,
}

#[derive(Clone, Debug)]
pub struct WriteToFileOptions {
	pub mode: FileMode,
	pub buffer_size_bytes: usize,
	pub fsync_every: Option<Duration>,
}

impl Default for WriteToFileOptions {
	fn default() -> Self {
		Self {
			mode: FileMode::Append,
			buffer_size_bytes: 1_000_000,
			fsync_every: None,
		}
	}
}

/// NDJSON file writer. Buffers lines until `buffer_size_bytes` or
/// `fsync_every` elapses, then writes and fsyncs in one go. The file is
/// opened synchronously at construction, the one point at which a sink is
/// allowed to fail its flow's creation outright (an unwritable path under
/// `overwrite` can never be retried into existence).
pub struct WriteToFileOp {
	path: PathBuf,
	options: WriteToFileOptions,
	file: std::fs::File,
	buffer: Vec<u8>,
	last_fsync: Instant,
	log: Weak<RefCell<StreamManager>>,
	last_error: Option<Error>,
}

impl WriteToFileOp {
	pub fn new(path: PathBuf, options: WriteToFileOptions, log: Weak<RefCell<StreamManager>>) -> Result<Self, Error> {
		let mut open = std::fs::OpenOptions::new();
		open.create(true).write(true);
		match options.mode {
			FileMode::Append => {
				open.append(true);
			}
			FileMode::Overwrite => {
				open.truncate(true);
			}
		}
		let file = open.open(&path).map_err(|e| Error::CommandFailed(format!("cannot open {} for write_to_file: {e}", path.display())))?;
		Ok(Self {
			path,
			options,
			file,
			buffer: Vec::new(),
			last_fsync: Instant::now(),
			log,
			last_error: None,
		})
	}

	async fn report(&self, message: String) {
		if let Some(manager) = upgrade(&self.log) {
			StreamManager::log_error(&manager, "EXECUTION_FAILED", message).await;
		}
	}

	fn due_for_fsync(&self) -> bool {
		match self.options.fsync_every {
			Some(d) => self.last_fsync.elapsed() >= d,
			None => false,
		}
	}

	async fn drain(&mut self) -> Result<(), Error> {
		if self.buffer.is_empty() {
			return Ok(());
		}
		let chunk = std::mem::take(&mut self.buffer);
		let cloned = self.file.try_clone().map_err(|e| Error::ExecutionFailed(format!("write_to_file {}: {e}", self.path.display())))?;
		let mut handle = tokio::fs::File::from_std(cloned);
		handle.write_all(&chunk).await.map_err(|e| Error::ExecutionFailed(format!("write_to_file write failed: {e}")))?;
		handle.flush().await.map_err(|e| Error::ExecutionFailed(format!("write_to_file flush failed: {e}")))?;
		handle.sync_all().await.map_err(|e| Error::ExecutionFailed(format!("write_to_file fsync failed: {e}")))?;
		self.last_fsync = Instant::now();
		Ok(())
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		let mut line = record.to_json_string();
		line.push('\n');
		self.buffer.extend_from_slice(line.as_bytes());
		if self.buffer.len() >= self.options.buffer_size_bytes || self.due_for_fsync() {
			if let Err(e) = self.drain().await {
				self.report(e.to_string()).await;
				self.last_error = Some(e);
				self.buffer.clear();
			}
		}
		Ok(())
	}

	/// Drains the buffer and surfaces the most recently logged error, if
	/// any, even when this flush itself succeeds.
	pub async fn flush(&mut self) -> Result<(), Error> {
		let drained = self.drain().await;
		if let Err(e) = &drained {
			self.report(e.to_string()).await;
			self.last_error = Some(e.clone());
		}
		match drained {
			Err(e) => Err(e),
			Ok(()) => match self.last_error.take() {
				Some(prev) => Err(prev),
				None => Ok(()),
			},
		}
	}

	pub fn cancel(&mut self) {
		let _ = self.file.sync_all();
	}
}

enum AssertOrSaveMode {
	Save {
		pending: Vec<Value>,
	},
	Assert {
		expected: Vec<Value>,
		index: usize,
	},
}

/// Records a pipeline's output the first time it runs, then holds future
/// runs to that recording: if `path` does not exist yet every incoming
/// record (key-sorted) is buffered and saved as NDJSON on flush; if it
/// exists, each incoming record is compared, in arrival order, against the
/// expected record at the same position.
pub struct AssertOrSaveOp {
	path: PathBuf,
	mode: AssertOrSaveMode,
	log: Weak<RefCell<StreamManager>>,
}

impl AssertOrSaveOp {
	pub fn new(path: PathBuf, log: Weak<RefCell<StreamManager>>) -> Result<Self, Error> {
		let mode = if path.exists() {
			let contents = std::fs::read_to_string(&path).map_err(|e| Error::CommandFailed(format!("cannot read {}: {e}", path.display())))?;
			let mut expected = Vec::new();
			for line in contents.lines() {
				if line.trim().is_empty() {
					continue;
				}
				let value = Value::from_json_str(line).map_err(|e| Error::CommandFailed(format!("invalid NDJSON in {}: {e}", path.display())))?;
				expected.push(value.key_sorted());
			}
			AssertOrSaveMode::Assert {
				expected,
				index: 0,
			}
		} else {
			AssertOrSaveMode::Save {
				pending: Vec::new(),
			}
		};
		Ok(Self {
			path,
			mode,
			log,
		})
	}

	async fn report(&self, message: String) {
		if let Some(manager) = upgrade(&self.log) {
			StreamManager::log_warning(&manager, "ASSERT_MISMATCH", message).await;
		}
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		let sorted = record.key_sorted();
		match &mut self.mode {
			AssertOrSaveMode::Save {
				pending,
			} => pending.push(sorted),
			AssertOrSaveMode::Assert {
				expected,
				index,
			} => {
				match expected.get(*index) {
					Some(exp) if *exp == sorted => {}
					Some(exp) => {
						self.report(format!("record {index} did not match expected: got {}, want {}", sorted.to_json_string(), exp.to_json_string())).await;
					}
					None => {
						self.report(format!("unexpected record beyond expected length at index {index}: {}", sorted.to_json_string())).await;
					}
				}
				*index += 1;
			}
		}
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
		if let AssertOrSaveMode::Save {
			pending,
		} = &self.mode
		{
			let mut out = String::new();
			for record in pending {
				out.push_str(&record.to_json_string());
				out.push('\n');
			}
			tokio::fs::write(&self.path, out).await.map_err(|e| Error::ExecutionFailed(format!("failed to save expected output to {}: {e}", self.path.display())))?;
		}
		Ok(())
	}

	pub fn cancel(&mut self) {}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::value::Value;

	#[tokio::test]
	async fn insert_into_errors_once_the_manager_is_gone() {
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		let weak = Rc::downgrade(&manager);
		drop(manager);
		let mut op = InsertIntoOp::new("sales".to_string(), weak);
		let err = op.push(Value::Null).await.unwrap_err();
		assert_eq!(err.code(), "EXECUTION_FAILED");
	}

	#[tokio::test]
	async fn write_to_file_round_trips_ndjson() {
		let dir = temp_dir::TempDir::new().unwrap();
		let path = dir.path().join("out.ndjson");
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		let mut op = WriteToFileOp::new(path.clone(), WriteToFileOptions::default(), Rc::downgrade(&manager)).unwrap();
		op.push(serde_json::json!({"a": 1}).into()).await.unwrap();
		op.push(serde_json::json!({"a": 2}).into()).await.unwrap();
		op.flush().await.unwrap();
		let contents = std::fs::read_to_string(&path).unwrap();
		assert_eq!(contents.lines().count(), 2);
	}

	#[tokio::test]
	async fn assert_or_save_writes_expected_file_on_first_run() {
		let dir = temp_dir::TempDir::new().unwrap();
		let path = dir.path().join("expected.ndjson");
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		let mut op = AssertOrSaveOp::new(path.clone(), Rc::downgrade(&manager)).unwrap();
		op.push(serde_json::json!({"b": 1, "a": 2}).into()).await.unwrap();
		op.flush().await.unwrap();
		let contents = std::fs::read_to_string(&path).unwrap();
		assert_eq!(contents.trim(), r#"{"a":2,"b":1}"#);
	}

	#[tokio::test]
	async fn assert_or_save_reports_mismatches_to_log() {
		let dir = temp_dir::TempDir::new().unwrap();
		let path = dir.path().join("expected.ndjson");
		std::fs::write(&path, "{\"a\":1}\n").unwrap();
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		let mut op = AssertOrSaveOp::new(path, Rc::downgrade(&manager)).unwrap();
		op.push(serde_json::json!({"a": 2}).into()).await.unwrap();
		assert!(manager.borrow().stream_exists(crate::stream::LOG_STREAM));
	}
}
