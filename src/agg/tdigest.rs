//! A t-digest (`tdigest:v1`) — a streaming quantile sketch built from an
//! ordered list of weighted centroids, compressed on insert with Dunning's
//! scale function so tail accuracy stays high under a bounded centroid
//! count.
//!
//! Exposes the same `push`/`result`/`reset`/`clone` incremental-aggregator
//! shape as the engine's other aggregators, adapted to a self-contained
//! sketch with its own serialized export instead of a single scalar
//! result.

use crate::value::{Object, Value};
use std::f64::consts::PI;

/// Default compression factor when none is supplied.
pub const DEFAULT_COMPRESSION: f64 = 100.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Centroid {
	pub mean: f64,
	pub weight: f64,
}

#[derive(Clone, Debug)]
pub struct TDigest {
	compression: f64,
	centroids: Vec<Centroid>,
	count: f64,
	min: f64,
	max: f64,
	/// Unsorted buffer of unit-weight centroids accumulated since the last
	/// compression pass.
	buffer: Vec<Centroid>,
}

impl TDigest {
	pub fn new(compression: f64) -> Self {
		let compression = if compression > 0.0 {
			compression
		} else {
			DEFAULT_COMPRESSION
		};
		Self {
			compression,
			centroids: Vec::new(),
			count: 0.0,
			min: f64::INFINITY,
			max: f64::NEG_INFINITY,
			buffer: Vec::new(),
		}
	}

	pub fn push(&mut self, value: f64) {
		if value.is_nan() {
			return;
		}
		self.count += 1.0;
		self.min = self.min.min(value);
		self.max = self.max.max(value);
		self.buffer.push(Centroid {
			mean: value,
			weight: 1.0,
		});
		// Compress once the working set exceeds 12x the compression factor.
		if self.centroids.len() + self.buffer.len() > (12.0 * self.compression) as usize {
			self.compress();
		}
	}

	pub fn reset(&mut self) {
		*self = Self::new(self.compression);
	}

	fn k_scale(&self, q: f64) -> f64 {
		(2.0 * q - 1.0).clamp(-1.0, 1.0).asin() * self.compression / PI
	}

	/// Sorts by mean and greedily merges adjacent centroids while the scale
	/// function width between the cumulative-q positions at their centers
	/// stays within 1.
	fn compress(&mut self) {
		let mut all: Vec<Centroid> = self.centroids.drain(..).chain(self.buffer.drain(..)).collect();
		if all.is_empty() {
			return;
		}
		all.sort_by(|a, b| a.mean.partial_cmp(&b.mean).unwrap());
		let total: f64 = all.iter().map(|c| c.weight).sum();

		let mut merged: Vec<Centroid> = Vec::with_capacity(all.len());
		let mut cumulative = 0.0;
		let mut iter = all.into_iter();
		let mut current = iter.next().unwrap();
		let mut current_q = (cumulative + current.weight / 2.0) / total;
		cumulative += current.weight;

		for next in iter {
			let next_q = (cumulative + next.weight / 2.0) / total;
			let width = self.k_scale(next_q) - self.k_scale(current_q);
			if width.abs() <= 1.0 {
				let merged_weight = current.weight + next.weight;
				current.mean = (current.mean * current.weight + next.mean * next.weight) / merged_weight;
				current.weight = merged_weight;
				current_q = (cumulative + next.weight / 2.0) / total;
			} else {
				merged.push(current);
				current = next.clone();
				current_q = next_q;
			}
			cumulative += next.weight;
		}
		merged.push(current);
		self.centroids = merged;
	}

	fn finalize(&mut self) {
		if !self.buffer.is_empty() {
			self.compress();
		}
	}

	pub fn export(&mut self) -> Value {
		self.finalize();
		let mut obj = Object::new();
		obj.insert("kind".into(), Value::Str("tdigest:v1".into()));
		obj.insert("compression".into(), Value::Number(self.compression));
		obj.insert("count".into(), Value::Number(self.count));
		obj.insert("min".into(), Value::Number(if self.count == 0.0 { f64::NAN } else { self.min }));
		obj.insert("max".into(), Value::Number(if self.count == 0.0 { f64::NAN } else { self.max }));
		let centroids = self
			.centroids
			.iter()
			.map(|c| Value::Array(vec![Value::Number(c.mean), Value::Number(c.weight)]))
			.collect();
		obj.insert("centroids".into(), Value::Array(centroids));
		Value::Object(obj)
	}
}

/// Parsed view over an exported `tdigest:v1` sketch, used by the
/// sketch-consuming scalar functions.
pub struct TDigestView {
	pub compression: f64,
	pub count: f64,
	pub min: f64,
	pub max: f64,
	pub centroids: Vec<Centroid>,
}

impl TDigestView {
	pub fn from_value(v: &Value) -> Option<Self> {
		let obj = v.as_object()?;
		if obj.get("kind")?.as_str()? != "tdigest:v1" {
			return None;
		}
		let centroids = obj
			.get("centroids")?
			.as_array()?
			.iter()
			.filter_map(|c| {
				let pair = c.as_array()?;
				Some(Centroid {
					mean: pair.first()?.as_f64()?,
					weight: pair.get(1)?.as_f64()?,
				})
			})
			.collect();
		Some(Self {
			compression: obj.get("compression")?.as_f64()?,
			count: obj.get("count")?.as_f64()?,
			min: obj.get("min")?.as_f64()?,
			max: obj.get("max")?.as_f64()?,
			centroids,
		})
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
		if self.centroids.is_empty() {
			return f64::NAN;
		}
		if self.centroids.len() == 1 {
			return self.centroids[0].mean;
		}

		let target = q * self.count;
		let mut cumulative = 0.0;
		for (i, c) in self.centroids.iter().enumerate() {
			let next_cumulative = cumulative + c.weight;
			if target <= next_cumulative || i == self.centroids.len() - 1 {
				// Blend linear/quadratic edge handling at the first and last
				// centroid intervals as a smoothing on the tails.
				if i == 0 {
					let delta = self.centroids[1].mean - c.mean;
					let fraction = if c.weight > 1.0 {
						(target - c.weight / 2.0) / (c.weight / 2.0)
					} else {
						(target - cumulative) / next_cumulative.max(f64::EPSILON)
					};
					return c.mean + fraction.max(0.0) * delta * 0.5;
				}
				if i == self.centroids.len() - 1 {
					let prev = &self.centroids[i - 1];
					let delta = c.mean - prev.mean;
					let fraction = (target - cumulative) / c.weight.max(f64::EPSILON);
					return c.mean - (1.0 - fraction.min(1.0)) * delta * 0.5;
				}
				let prev = &self.centroids[i - 1];
				let span = next_cumulative - cumulative;
				let fraction = if span > 0.0 {
					(target - cumulative) / span
				} else {
					0.0
				};
				return prev.mean + fraction * (c.mean - prev.mean);
			}
			cumulative = next_cumulative;
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
		let mut cumulative = 0.0;
		for (i, c) in self.centroids.iter().enumerate() {
			if x < c.mean {
				if i == 0 {
					return 0.0;
				}
				let prev = &self.centroids[i - 1];
				let span = c.mean - prev.mean;
				let fraction = if span > 0.0 {
					(x - prev.mean) / span
				} else {
					0.5
				};
				// Linearly split the straddling centroid's weight between
				// its left and right neighbours.
				return ((cumulative - prev.weight / 2.0) + fraction * (prev.weight / 2.0 + c.weight / 2.0))
					/ self.count;
			}
			cumulative += c.weight;
		}
		1.0
	}

	pub fn error(&self, q: f64) -> f64 {
		let q = q.clamp(1e-9, 1.0 - 1e-9);
		1.0 / (self.compression * q * (1.0 - q))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn quantile_extremes_match_min_max() {
		let mut d = TDigest::new(100.0);
		for i in 1..=100 {
			d.push(i as f64);
		}
		let exported = d.export();
		let view = TDigestView::from_value(&exported).unwrap();
		assert_eq!(view.quantile(0.0), 1.0);
		assert_eq!(view.quantile(1.0), 100.0);
		let median = view.quantile(0.5);
		let err = view.error(0.5);
		assert!((median - 50.5).abs() <= 50.0 * err, "median={median} err={err}");
	}

	#[test]
	fn count_equals_sum_of_weights() {
		let mut d = TDigest::new(50.0);
		for i in 0..500 {
			d.push(i as f64);
		}
		let exported = d.export();
		let view = TDigestView::from_value(&exported).unwrap();
		let total_weight: f64 = view.centroids.iter().map(|c| c.weight).sum();
		assert_eq!(total_weight, view.count);
	}

	#[test]
	fn cdf_at_bounds() {
		let mut d = TDigest::new(100.0);
		for i in 1..=10 {
			d.push(i as f64);
		}
		let exported = d.export();
		let view = TDigestView::from_value(&exported).unwrap();
		assert_eq!(view.cdf(0.0), 0.0);
		assert_eq!(view.cdf(11.0), 1.0);
	}
}
