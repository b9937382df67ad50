//! The stream manager: named in-memory record queues, their subscribers,
//! and the implicit `_log` diagnostics stream.
//!
//! Streams and their subscriber lists live behind one `Rc<RefCell<_>>` per
//! engine, shared with every sink operator that inserts into another
//! stream (`insert_into`, and the implicit `_log` writer used by sinks and
//! `sorter`). Sinks hold a [`Weak`] back-reference rather than a strong
//! one — the manager owns the pipelines that own the sinks, so a strong
//! cycle back from sink to manager would never be collected.
//!
//! `insert_into_stream` cannot simply iterate `&mut self.streams[name]
//! .subscribers` while invoking each subscriber, since a subscriber's
//! pipeline may itself insert into a stream (possibly this same one),
//! which would need a second `borrow_mut` of the manager while the first
//! is still live. Instead it *takes* the subscriber list out of the map,
//! drops the borrow, drives every subscriber, then puts the list back —
//! the same take-process-restore shape used for re-entrant single-threaded
//! event dispatch generally.

use crate::err::Error;
use crate::pipeline::Pipeline;
use crate::value::{Object, Value};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const LOG_STREAM: &str = "_log";

pub enum Subscriber {
	Pipeline(Pipeline),
	Callback(Box<dyn FnMut(&Value)>),
}

#[derive(Default)]
struct StreamEntry {
	subscribers: IndexMap<u64, Subscriber>,
	pending: u64,
}

#[derive(Default)]
pub struct StreamManager {
	streams: IndexMap<String, StreamEntry>,
	subscriber_owner: HashMap<u64, String>,
	next_subscriber_id: u64,
}

impl StreamManager {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn create_stream(&mut self, name: &str) -> Result<(), Error> {
		if self.streams.contains_key(name) {
			return Err(Error::StreamAlreadyExists(name.to_string()));
		}
		self.streams.insert(name.to_string(), StreamEntry::default());
		Ok(())
	}

	pub fn delete_stream(&mut self, name: &str) -> Result<(), Error> {
		let entry = self.streams.shift_remove(name).ok_or_else(|| Error::StreamNotFound(name.to_string()))?;
		for id in entry.subscribers.keys() {
			self.subscriber_owner.remove(id);
		}
		Ok(())
	}

	pub fn stream_exists(&self, name: &str) -> bool {
		self.streams.contains_key(name)
	}

	pub fn stream_names(&self) -> Vec<String> {
		self.streams.keys().cloned().collect()
	}

	pub fn subscriber_count(&self, name: &str) -> Option<usize> {
		self.streams.get(name).map(|e| e.subscribers.len())
	}

	fn ensure_stream(&mut self, name: &str) {
		self.streams.entry(name.to_string()).or_default();
	}

	pub fn subscribe_pipeline(&mut self, name: &str, pipeline: Pipeline) -> Result<u64, Error> {
		let entry = self.streams.get_mut(name).ok_or_else(|| Error::StreamNotFound(name.to_string()))?;
		let id = self.next_subscriber_id;
		self.next_subscriber_id += 1;
		entry.subscribers.insert(id, Subscriber::Pipeline(pipeline));
		self.subscriber_owner.insert(id, name.to_string());
		Ok(id)
	}

	pub fn subscribe_callback(&mut self, name: &str, callback: Box<dyn FnMut(&Value)>) -> Result<u64, Error> {
		let entry = self.streams.get_mut(name).ok_or_else(|| Error::StreamNotFound(name.to_string()))?;
		let id = self.next_subscriber_id;
		self.next_subscriber_id += 1;
		entry.subscribers.insert(id, Subscriber::Callback(callback));
		self.subscriber_owner.insert(id, name.to_string());
		Ok(id)
	}

	pub fn unsubscribe(&mut self, id: u64) -> Result<(), Error> {
		let name = self.subscriber_owner.remove(&id).ok_or_else(|| Error::CommandFailed(format!("no such subscription: {id}")))?;
		if let Some(entry) = self.streams.get_mut(&name) {
			if let Some(Subscriber::Pipeline(mut p)) = entry.subscribers.shift_remove(&id) {
				p.cancel();
			}
		}
		Ok(())
	}

	/// Inserts one record into `name`, handing it to every subscriber in
	/// declaration order. A subscriber pipeline's per-record execution
	/// error is logged to `_log` and does not stop delivery to the
	/// remaining subscribers (see [`crate::err`] propagation policy).
	pub async fn insert(manager: &Rc<RefCell<Self>>, name: &str, record: Value) -> Result<(), Error> {
		let mut subscribers = {
			let mut m = manager.borrow_mut();
			let entry = m.streams.get_mut(name).ok_or_else(|| Error::StreamNotFound(name.to_string()))?;
			entry.pending += 1;
			std::mem::take(&mut entry.subscribers)
		};
		for sub in subscribers.values_mut() {
			match sub {
				Subscriber::Pipeline(pipeline) => {
					if let Err(e) = pipeline.push(record.clone()).await {
						Self::log(manager, "error", e.code(), e.to_string(), None).await;
					}
				}
				Subscriber::Callback(cb) => cb(&record),
			}
		}
		{
			let mut m = manager.borrow_mut();
			if let Some(entry) = m.streams.get_mut(name) {
				for (id, sub) in subscribers {
					entry.subscribers.insert(id, sub);
				}
				entry.pending = entry.pending.saturating_sub(1);
			}
		}
		Ok(())
	}

	pub async fn insert_many(manager: &Rc<RefCell<Self>>, name: &str, records: Vec<Value>) -> Result<(), Error> {
		for record in records {
			Self::insert(manager, name, record).await?;
		}
		Ok(())
	}

	/// Flushes every subscriber pipeline of `name` and resolves once all
	/// of them report their pending work drained.
	pub async fn flush_stream(manager: &Rc<RefCell<Self>>, name: &str) -> Result<(), Error> {
		let mut subscribers = {
			let mut m = manager.borrow_mut();
			let entry = m.streams.get_mut(name).ok_or_else(|| Error::StreamNotFound(name.to_string()))?;
			std::mem::take(&mut entry.subscribers)
		};
		for sub in subscribers.values_mut() {
			if let Subscriber::Pipeline(pipeline) = sub {
				if let Err(e) = pipeline.flush().await {
					Self::log(manager, "error", e.code(), e.to_string(), None).await;
				}
			}
		}
		{
			let mut m = manager.borrow_mut();
			if let Some(entry) = m.streams.get_mut(name) {
				for (id, sub) in subscribers {
					entry.subscribers.insert(id, sub);
				}
			}
		}
		Ok(())
	}

	/// Publishes one structured diagnostic entry to `_log`, creating the
	/// stream on first use. Best-effort: failure to log is itself only
	/// traced, never propagated (logging must not be a new source of
	/// pipeline failure).
	pub async fn log(manager: &Rc<RefCell<Self>>, level: &str, code: &str, message: String, query: Option<String>) {
		{
			let mut m = manager.borrow_mut();
			m.ensure_stream(LOG_STREAM);
		}
		let record = log_record(level, code, message, query);
		if let Err(e) = Self::insert(manager, LOG_STREAM, record).await {
			tracing::warn!(error = %e, "failed to publish a _log entry");
		}
	}

	pub async fn log_error(manager: &Rc<RefCell<Self>>, code: &str, message: String) {
		Self::log(manager, "error", code, message, None).await;
	}

	pub async fn log_warning(manager: &Rc<RefCell<Self>>, code: &str, message: String) {
		Self::log(manager, "warning", code, message, None).await;
	}

	pub async fn log_info(manager: &Rc<RefCell<Self>>, code: &str, message: String) {
		Self::log(manager, "info", code, message, None).await;
	}
}

fn log_record(level: &str, code: &str, message: String, query: Option<String>) -> Value {
	let mut obj = Object::new();
	obj.insert("_id".to_string(), Value::Str(uuid::Uuid::new_v4().to_string()));
	obj.insert("timestamp".to_string(), Value::Str(chrono::Utc::now().to_rfc3339()));
	obj.insert("level".to_string(), Value::Str(level.to_string()));
	obj.insert("code".to_string(), Value::Str(code.to_string()));
	obj.insert("message".to_string(), Value::Str(message));
	if let Some(q) = query {
		obj.insert("query".to_string(), Value::Str(q));
	}
	Value::Object(obj)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::op::Operator;

	#[tokio::test]
	async fn insert_delivers_to_callback_subscribers_in_order() {
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		manager.borrow_mut().create_stream("sales").unwrap();
		let seen = Rc::new(RefCell::new(Vec::new()));
		let seen2 = seen.clone();
		manager
			.borrow_mut()
			.subscribe_callback(
				"sales",
				Box::new(move |v| {
					seen2.borrow_mut().push(v.clone());
				}),
			)
			.unwrap();
		StreamManager::insert(&manager, "sales", Value::Number(1.0)).await.unwrap();
		StreamManager::insert(&manager, "sales", Value::Number(2.0)).await.unwrap();
		assert_eq!(*seen.borrow(), vec![Value::Number(1.0), Value::Number(2.0)]);
	}

	#[tokio::test]
	async fn insert_into_missing_stream_is_an_error() {
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		let err = StreamManager::insert(&manager, "nope", Value::Null).await.unwrap_err();
		assert_eq!(err.code(), "STREAM_NOT_FOUND");
	}

	#[tokio::test]
	async fn log_lazily_creates_the_log_stream() {
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		assert!(!manager.borrow().stream_exists(LOG_STREAM));
		StreamManager::log_warning(&manager, "FUNCTION_EXECUTION_ERROR", "boom".to_string()).await;
		assert!(manager.borrow().stream_exists(LOG_STREAM));
	}

	#[tokio::test]
	async fn unsubscribe_cancels_a_pipeline_subscriber() {
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		manager.borrow_mut().create_stream("s").unwrap();
		let pipeline = Pipeline::new(None::<Operator>);
		let id = manager.borrow_mut().subscribe_pipeline("s", pipeline).unwrap();
		manager.borrow_mut().unsubscribe(id).unwrap();
		assert_eq!(manager.borrow().subscriber_count("s"), Some(0));
	}
}
