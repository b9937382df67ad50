//! Sketch-consuming scalar functions: `quantile`, `percentile`, `median`,
//! `cdf`, `quantile_error`, `cdf_error`. Each dispatches on the sketch's
//! `kind` discriminant.

use crate::agg::tdigest::TDigestView;
use crate::agg::uddsketch::UddSketchView;
use crate::err::Error;
use crate::value::Value;

enum SketchView {
	TDigest(TDigestView),
	Udd(UddSketchView),
}

fn view_of(name: &str, sketch: &Value) -> Result<SketchView, Error> {
	if let Some(v) = TDigestView::from_value(sketch) {
		return Ok(SketchView::TDigest(v));
	}
	if let Some(v) = UddSketchView::from_value(sketch) {
		return Ok(SketchView::Udd(v));
	}
	Err(Error::FunctionExecutionError {
		name: name.to_string(),
		message: "argument is not a recognized sketch".to_string(),
	})
}

pub fn quantile(args: &[Value]) -> Result<Value, Error> {
	let sketch = args.first().ok_or_else(|| missing("quantile"))?;
	let q = args.get(1).and_then(Value::as_f64).ok_or_else(|| missing("quantile"))?;
	let result = match view_of("quantile", sketch)? {
		SketchView::TDigest(v) => v.quantile(q),
		SketchView::Udd(v) => v.quantile(q),
	};
	Ok(Value::Number(result))
}

pub fn percentile(args: &[Value]) -> Result<Value, Error> {
	let sketch = args.first().ok_or_else(|| missing("percentile"))?;
	let p = args.get(1).and_then(Value::as_f64).ok_or_else(|| missing("percentile"))?;
	quantile(&[sketch.clone(), Value::Number(p / 100.0)])
}

pub fn median(args: &[Value]) -> Result<Value, Error> {
	let sketch = args.first().ok_or_else(|| missing("median"))?;
	quantile(&[sketch.clone(), Value::Number(0.5)])
}

pub fn cdf(args: &[Value]) -> Result<Value, Error> {
	let sketch = args.first().ok_or_else(|| missing("cdf"))?;
	let x = args.get(1).and_then(Value::as_f64).ok_or_else(|| missing("cdf"))?;
	let result = match view_of("cdf", sketch)? {
		SketchView::TDigest(v) => v.cdf(x),
		SketchView::Udd(v) => v.cdf(x),
	};
	Ok(Value::Number(result))
}

pub fn quantile_error(args: &[Value]) -> Result<Value, Error> {
	let sketch = args.first().ok_or_else(|| missing("quantile_error"))?;
	let q = args.get(1).and_then(Value::as_f64).unwrap_or(0.5);
	let result = match view_of("quantile_error", sketch)? {
		SketchView::TDigest(v) => v.error(q),
		SketchView::Udd(v) => v.error(q),
	};
	Ok(Value::Number(result))
}

pub fn cdf_error(args: &[Value]) -> Result<Value, Error> {
	// The sketch types in this engine report a single, quantile-independent
	// (UDDSketch) or position-dependent (t-digest) error estimate; for CDF
	// queries we reuse the same estimate evaluated at the midpoint.
	quantile_error(&[args.first().cloned().unwrap_or(Value::Null), Value::Number(0.5)])
}

fn missing(name: &str) -> Error {
	Error::FunctionExecutionError {
		name: name.to_string(),
		message: "missing required argument".to_string(),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::agg::tdigest::TDigest;

	#[test]
	fn quantile_extremes_are_min_and_max() {
		let mut d = TDigest::new(100.0);
		for i in 1..=100 {
			d.push(i as f64);
		}
		let exported = d.export();
		assert_eq!(quantile(&[exported.clone(), Value::Number(0.0)]).unwrap(), Value::Number(1.0));
		assert_eq!(quantile(&[exported, Value::Number(1.0)]).unwrap(), Value::Number(100.0));
	}

	#[test]
	fn median_matches_quantile_half() {
		let mut d = TDigest::new(100.0);
		for i in 1..=100 {
			d.push(i as f64);
		}
		let exported = d.export();
		assert_eq!(median(&[exported.clone()]).unwrap(), quantile(&[exported, Value::Number(0.5)]).unwrap());
	}

	#[test]
	fn unrecognized_sketch_is_an_error() {
		assert!(quantile(&[Value::Null, Value::Number(0.5)]).is_err());
	}
}
