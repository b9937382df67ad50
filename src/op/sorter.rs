//! `sorter`: bounded out-of-order reordering with a watermark. Two
//! orderings share the same entries by id: a `BTreeMap` keyed by
//! extraction key (emission order) and a `VecDeque` of arrival order (age
//! eviction) — the same ordered-collector idiom the engine's other
//! accumulate-in-place state uses, applied to raw entries instead of
//! aggregators.

use super::{cancel_downstream, emit, flush_downstream, Operator};
use crate::dsl::ast::Expr;
use crate::dsl::eval::eval;
use crate::err::Error;
use crate::expr::EvalContext;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

struct OrderedKey(f64);

impl PartialEq for OrderedKey {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}
impl Eq for OrderedKey {}
impl PartialOrd for OrderedKey {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for OrderedKey {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.total_cmp(&other.0)
	}
}

struct Entry {
	id: u64,
	key: f64,
	record: Value,
	arrived: Instant,
}

pub struct SorterOp {
	pub key_extractor: Expr,
	pub max_buffer_size: usize,
	pub max_age_ms: f64,
	pub funcs: Rc<FunctionRegistry>,
	pub downstream: Option<Box<Operator>>,

	by_key: BTreeMap<OrderedKey, Vec<u64>>,
	by_arrival: VecDeque<u64>,
	entries: std::collections::HashMap<u64, Entry>,
	next_id: u64,
	watermark: f64,
	pub dropped_late: u64,
	warned_late: bool,
}

impl SorterOp {
	pub fn new(
		key_extractor: Expr,
		max_buffer_size: usize,
		max_age_ms: f64,
		funcs: Rc<FunctionRegistry>,
		downstream: Option<Box<Operator>>,
	) -> Self {
		Self {
			key_extractor,
			max_buffer_size,
			max_age_ms,
			funcs,
			downstream,
			by_key: BTreeMap::new(),
			by_arrival: VecDeque::new(),
			entries: std::collections::HashMap::new(),
			next_id: 0,
			watermark: f64::NEG_INFINITY,
			dropped_late: 0,
			warned_late: false,
		}
	}

	fn extract_key(&self, record: &Value) -> Result<f64, Error> {
		let extra = Object::new();
		let ctx = EvalContext::new(record, &extra);
		eval(&self.key_extractor, &ctx, &self.funcs)?
			.as_f64()
			.ok_or_else(|| Error::ExecutionFailed("sorter key expression did not produce a number".to_string()))
	}

	fn insert(&mut self, key: f64, record: Value) -> u64 {
		let id = self.next_id;
		self.next_id += 1;
		self.entries.insert(
			id,
			Entry {
				id,
				key,
				record,
				arrived: Instant::now(),
			},
		);
		self.by_key.entry(OrderedKey(key)).or_default().push(id);
		self.by_arrival.push_back(id);
		id
	}

	fn remove(&mut self, id: u64) -> Option<Entry> {
		let entry = self.entries.remove(&id)?;
		if let Some(bucket) = self.by_key.get_mut(&OrderedKey(entry.key)) {
			bucket.retain(|&x| x != id);
			if bucket.is_empty() {
				self.by_key.remove(&OrderedKey(entry.key));
			}
		}
		self.by_arrival.retain(|&x| x != id);
		Some(entry)
	}

	async fn evict_oldest_by_arrival(&mut self) -> Result<(), Error> {
		if let Some(&id) = self.by_arrival.front() {
			if let Some(entry) = self.remove(id) {
				self.watermark = self.watermark.max(entry.key);
				emit(&mut self.downstream, entry.record).await?;
			}
		}
		Ok(())
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		let key = self.extract_key(&record)?;
		if key < self.watermark {
			self.dropped_late += 1;
			if !self.warned_late {
				self.warned_late = true;
				tracing::warn!(key, watermark = self.watermark, "sorter dropped a late record");
			}
			return Ok(());
		}

		while let Some(&id) = self.by_arrival.front() {
			let age_ms = self.entries[&id].arrived.elapsed().as_secs_f64() * 1000.0;
			if age_ms > self.max_age_ms {
				self.evict_oldest_by_arrival().await?;
			} else {
				break;
			}
		}

		self.insert(key, record);

		while self.entries.len() >= self.max_buffer_size {
			self.evict_oldest_by_arrival().await?;
		}

		loop {
			let Some(&id) = self.by_arrival.front() else {
				break;
			};
			let age_ms = self.entries[&id].arrived.elapsed().as_secs_f64() * 1000.0;
			let buffer_ratio = self.entries.len() as f64 / self.max_buffer_size as f64;
			if age_ms > self.max_age_ms / 2.0 || buffer_ratio >= 0.8 {
				self.evict_oldest_by_arrival().await?;
			} else {
				break;
			}
		}
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
		let ids: Vec<u64> = self.by_key.values().flatten().copied().collect();
		for id in ids {
			if let Some(entry) = self.remove(id) {
				self.watermark = self.watermark.max(entry.key);
				emit(&mut self.downstream, entry.record).await?;
			}
		}
		flush_downstream(&mut self.downstream).await
	}

	pub fn cancel(&mut self) {
		cancel_downstream(&mut self.downstream);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::dsl::parser::parse_expr;

	fn op() -> SorterOp {
		SorterOp::new(parse_expr("key").unwrap(), 3, 1_000_000.0, Rc::new(FunctionRegistry::with_builtins()), None)
	}

	#[tokio::test]
	async fn flush_emits_in_key_order() {
		let mut op = op();
		for k in [5, 1, 3, 2, 4] {
			op.push(serde_json::json!({"key": k}).into()).await.unwrap();
		}
		op.flush().await.unwrap();
		assert_eq!(op.watermark, 5.0);
	}

	#[tokio::test]
	async fn bursty_arrival_never_exceeds_buffer_bound() {
		let mut op = op();
		for k in 0..50 {
			op.push(serde_json::json!({"key": k}).into()).await.unwrap();
			assert!(op.entries.len() <= op.max_buffer_size);
		}
	}
}
