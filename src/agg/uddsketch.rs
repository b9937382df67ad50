//! UDDSketch (`uddsketch:v1`) — a uniformly-dense bucket sketch offering a
//! constant relative-error guarantee `alpha` across the whole quantile
//! range, unlike t-digest's position-dependent error. Values are mapped to
//! logarithmic buckets of growth factor `gamma = (1+alpha)/(1-alpha)`; the
//! bucket boundary for index `i` is `gamma^i`.
//!
//! The internal representation is free to diverge from t-digest's centroid
//! model as long as the exported form supports the same scalar-function
//! surface, so buckets (not centroids) are the natural fit here.

use crate::value::{Object, Value};
use std::collections::BTreeMap;

pub const DEFAULT_ALPHA: f64 = 0.01;

#[derive(Clone, Debug)]
pub struct UddSketch {
	alpha: f64,
	gamma: f64,
	/// bucket index -> count of values falling in it.
	buckets: BTreeMap<i64, u64>,
	count: u64,
	min: f64,
	max: f64,
	zero_count: u64,
}

impl UddSketch {
	pub fn new(alpha: f64) -> Self {
		let alpha = if alpha > 0.0 && alpha < 1.0 {
			alpha
		} else {
			DEFAULT_ALPHA
		};
		let gamma = (1.0 + alpha) / (1.0 - alpha);
		Self {
			alpha,
			gamma,
			buckets: BTreeMap::new(),
			count: 0,
			min: f64::INFINITY,
			max: f64::NEG_INFINITY,
			zero_count: 0,
		}
	}

	fn bucket_index(&self, value: f64) -> i64 {
		(value.abs().ln() / self.gamma.ln()).ceil() as i64
	}

	fn bucket_midpoint_value(&self, index: i64) -> f64 {
		let lo = self.gamma.powi((index - 1) as i32);
		let hi = self.gamma.powi(index as i32);
		2.0 * lo * hi / (lo + hi)
	}

	pub fn push(&mut self, value: f64) {
		if value.is_nan() {
			return;
		}
		self.count += 1;
		self.min = self.min.min(value);
		self.max = self.max.max(value);
		if value == 0.0 {
			self.zero_count += 1;
			return;
		}
		let idx = self.bucket_index(value);
		*self.buckets.entry(idx).or_insert(0) += 1;
	}

	pub fn reset(&mut self) {
		*self = Self::new(self.alpha);
	}

	pub fn export(&self) -> Value {
		let mut obj = Object::new();
		obj.insert("kind".into(), Value::Str("uddsketch:v1".into()));
		obj.insert("alpha".into(), Value::Number(self.alpha));
		obj.insert("count".into(), Value::Number(self.count as f64));
		obj.insert("min".into(), Value::Number(if self.count == 0 { f64::NAN } else { self.min }));
		obj.insert("max".into(), Value::Number(if self.count == 0 { f64::NAN } else { self.max }));
		obj.insert("zero_count".into(), Value::Number(self.zero_count as f64));
		let buckets = self
			.buckets
			.iter()
			.map(|(idx, count)| Value::Array(vec![Value::Number(*idx as f64), Value::Number(*count as f64)]))
			.collect();
		obj.insert("buckets".into(), Value::Array(buckets));
		Value::Object(obj)
	}
}

pub struct UddSketchView {
	pub alpha: f64,
	pub gamma: f64,
	pub count: f64,
	pub min: f64,
	pub max: f64,
	pub zero_count: f64,
	pub buckets: Vec<(i64, f64)>,
}

impl UddSketchView {
	pub fn from_value(v: &Value) -> Option<Self> {
		let obj = v.as_object()?;
		if obj.get("kind")?.as_str()? != "uddsketch:v1" {
			return None;
		}
		let alpha = obj.get("alpha")?.as_f64()?;
		let buckets = obj
			.get("buckets")?
			.as_array()?
			.iter()
			.filter_map(|b| {
				let pair = b.as_array()?;
				Some((pair.first()?.as_f64()? as i64, pair.get(1)?.as_f64()?))
			})
			.collect();
		Some(Self {
			alpha,
			gamma: (1.0 + alpha) / (1.0 - alpha),
			count: obj.get("count")?.as_f64()?,
			min: obj.get("min")?.as_f64()?,
			max: obj.get("max")?.as_f64()?,
			zero_count: obj.get("zero_count").and_then(Value::as_f64).unwrap_or(0.0),
			buckets,
		})
	}

	fn bucket_value(&self, index: i64) -> f64 {
		let lo = self.gamma.powi((index - 1) as i32);
		let hi = self.gamma.powi(index as i32);
		2.0 * lo * hi / (lo + hi)
	}

	pub fn quantile(&self, q: f64) -> f64 {
		if self.count == 0.0 {
			return f64::NAN;
		}
		if q <= 0.0 {
			return self.min;
		}
		if q >= 1.0 {
			return self.max;
		}
		let target = (q * self.count).ceil();
		let mut cumulative = self.zero_count;
		if cumulative as f64 >= target {
			return 0.0;
		}
		for (idx, count) in &self.buckets {
			cumulative += *count as u64;
			if cumulative as f64 >= target {
				return self.bucket_value(*idx);
			}
		}
		self.max
	}

	pub fn cdf(&self, x: f64) -> f64 {
		if self.count == 0.0 {
			return f64::NAN;
		}
		if x <= self.min {
			return 0.0;
		}
		if x >= self.max {
			return 1.0;
		}
		let mut cumulative = self.zero_count as f64;
		if x > 0.0 {
			for (idx, count) in &self.buckets {
				if self.bucket_value(*idx) > x {
					break;
				}
				cumulative += count;
			}
		}
		(cumulative / self.count).clamp(0.0, 1.0)
	}

	/// Relative error is constant in `q` for UDDSketch, unlike t-digest.
	pub fn error(&self, _q: f64) -> f64 {
		self.alpha
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn relative_error_is_constant() {
		let mut s = UddSketch::new(0.01);
		for i in 1..=1000 {
			s.push(i as f64);
		}
		let exported = s.export();
		let view = UddSketchView::from_value(&exported).unwrap();
		assert_eq!(view.error(0.1), view.error(0.9));
		let q90 = view.quantile(0.9);
		assert!((q90 - 900.0).abs() / 900.0 <= view.alpha * 2.0);
	}

	#[test]
	fn quantile_extremes() {
		let mut s = UddSketch::new(0.02);
		for i in 1..=50 {
			s.push(i as f64);
		}
		let exported = s.export();
		let view = UddSketchView::from_value(&exported).unwrap();
		assert_eq!(view.quantile(0.0), 1.0);
		assert_eq!(view.quantile(1.0), 50.0);
	}
}
