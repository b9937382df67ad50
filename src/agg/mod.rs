//! The aggregator registry: name -> factory for an incremental aggregator
//! implementing `push`/`result`/`reset`/`clone`.
//!
//! Accumulate-in-place, read-out on demand, exposed as a small
//! object-safe trait rather than a hand-enumerated struct of optional
//! fields, since `summarize` needs an open set of aggregator kinds
//! (including user-extensible sketches).

pub mod tdigest;
pub mod uddsketch;

use crate::value::Value;
use std::collections::HashMap;

/// An incremental aggregator: folds a stream of (possibly per-call
/// multi-argument) pushes into a running state and can report, reset, or
/// clone that state at any time.
pub trait Aggregator: Send {
	/// Folds one call's worth of evaluated argument values. Non-numeric
	/// values are ignored by numeric aggregators rather than erroring.
	fn push(&mut self, args: &[Value]);

	/// The aggregator's current output. For sketches this is the
	/// serialized `{kind, ...}` form.
	fn result(&self) -> Value;

	/// Restores the aggregator to its initial (pre-any-push) state.
	fn reset(&mut self);

	/// An independent copy sharing no state with `self`.
	fn clone_box(&self) -> Box<dyn Aggregator>;
}

/// A per-engine, owned table of aggregator constructors. Not global/lazy
/// state: each [`crate::engine::Engine`] owns one.
pub struct AggregatorRegistry {
	factories: HashMap<String, fn(&[Value]) -> Box<dyn Aggregator>>,
}

impl AggregatorRegistry {
	pub fn with_builtins() -> Self {
		let mut factories: HashMap<String, fn(&[Value]) -> Box<dyn Aggregator>> = HashMap::new();
		factories.insert("count".into(), count::make);
		factories.insert("sum".into(), sum::make);
		factories.insert("tdigest".into(), make_tdigest);
		factories.insert("uddsketch".into(), make_uddsketch);
		Self {
			factories,
		}
	}

	/// Constructs a fresh aggregator instance for `name`, passing along any
	/// constructor-time configuration literals (e.g. `tdigest`'s
	/// `compression`) found after the per-record value argument.
	pub fn construct(&self, name: &str, config: &[Value]) -> Option<Box<dyn Aggregator>> {
		self.factories.get(name).map(|f| f(config))
	}

	pub fn contains(&self, name: &str) -> bool {
		self.factories.contains_key(name)
	}
}

fn make_tdigest(config: &[Value]) -> Box<dyn Aggregator> {
	let compression = config.first().and_then(Value::as_f64).unwrap_or(tdigest::DEFAULT_COMPRESSION);
	Box::new(TDigestAggregator(tdigest::TDigest::new(compression)))
}

fn make_uddsketch(config: &[Value]) -> Box<dyn Aggregator> {
	let alpha = config.first().and_then(Value::as_f64).unwrap_or(uddsketch::DEFAULT_ALPHA);
	Box::new(UddSketchAggregator(uddsketch::UddSketch::new(alpha)))
}

struct TDigestAggregator(tdigest::TDigest);

impl Aggregator for TDigestAggregator {
	fn push(&mut self, args: &[Value]) {
		if let Some(v) = args.first().and_then(Value::as_f64) {
			self.0.push(v);
		}
	}

	fn result(&self) -> Value {
		self.0.clone().export()
	}

	fn reset(&mut self) {
		self.0.reset();
	}

	fn clone_box(&self) -> Box<dyn Aggregator> {
		Box::new(TDigestAggregator(self.0.clone()))
	}
}

struct UddSketchAggregator(uddsketch::UddSketch);

impl Aggregator for UddSketchAggregator {
	fn push(&mut self, args: &[Value]) {
		if let Some(v) = args.first().and_then(Value::as_f64) {
			self.0.push(v);
		}
	}

	fn result(&self) -> Value {
		self.0.export()
	}

	fn reset(&mut self) {
		self.0.reset();
	}

	fn clone_box(&self) -> Box<dyn Aggregator> {
		Box::new(UddSketchAggregator(self.0.clone()))
	}
}

mod count {
	use super::*;

	#[derive(Clone, Default)]
	pub struct Count(u64);

	impl Aggregator for Count {
		fn push(&mut self, _args: &[Value]) {
			self.0 += 1;
		}

		fn result(&self) -> Value {
			Value::Number(self.0 as f64)
		}

		fn reset(&mut self) {
			self.0 = 0;
		}

		fn clone_box(&self) -> Box<dyn Aggregator> {
			Box::new(self.clone())
		}
	}

	pub fn make(_config: &[Value]) -> Box<dyn Aggregator> {
		Box::new(Count::default())
	}
}

mod sum {
	use super::*;

	#[derive(Clone, Default)]
	pub struct Sum(f64);

	impl Aggregator for Sum {
		fn push(&mut self, args: &[Value]) {
			if let Some(v) = args.first().and_then(Value::as_f64) {
				self.0 += v;
			}
		}

		fn result(&self) -> Value {
			Value::Number(self.0)
		}

		fn reset(&mut self) {
			self.0 = 0.0;
		}

		fn clone_box(&self) -> Box<dyn Aggregator> {
			Box::new(self.clone())
		}
	}

	pub fn make(_config: &[Value]) -> Box<dyn Aggregator> {
		Box::new(Sum::default())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn count_ignores_argument_value() {
		let reg = AggregatorRegistry::with_builtins();
		let mut c = reg.construct("count", &[]).unwrap();
		c.push(&[Value::Str("anything".into())]);
		c.push(&[Value::Null]);
		assert_eq!(c.result(), Value::Number(2.0));
	}

	#[test]
	fn sum_ignores_non_numbers() {
		let reg = AggregatorRegistry::with_builtins();
		let mut s = reg.construct("sum", &[]).unwrap();
		s.push(&[Value::Number(10.0)]);
		s.push(&[Value::Str("skip".into())]);
		s.push(&[Value::Number(5.0)]);
		assert_eq!(s.result(), Value::Number(15.0));
	}

	#[test]
	fn clone_is_independent() {
		let reg = AggregatorRegistry::with_builtins();
		let mut s = reg.construct("sum", &[]).unwrap();
		s.push(&[Value::Number(1.0)]);
		let mut cloned = s.clone_box();
		cloned.push(&[Value::Number(1.0)]);
		assert_eq!(s.result(), Value::Number(1.0));
		assert_eq!(cloned.result(), Value::Number(2.0));
	}

	#[test]
	fn reset_restores_initial_state() {
		let reg = AggregatorRegistry::with_builtins();
		let mut s = reg.construct("sum", &[]).unwrap();
		s.push(&[Value::Number(42.0)]);
		s.reset();
		assert_eq!(s.result(), Value::Number(0.0));
	}
}
