//! Arithmetic and comparison scalar functions.
//!
//! Numeric overflow follows the host's `f64` semantics (producing `inf`/
//! `NaN` rather than panicking); division and modulo by zero likewise
//! produce `inf`/`NaN` instead of a `function_execution_error`, since both
//! are well-defined double-precision results, not host-crashing ones.

use crate::err::Error;
use crate::value::Value;
use std::f64::consts::PI;

fn num(name: &str, args: &[Value], i: usize) -> Result<f64, Error> {
	args.get(i).and_then(Value::as_f64).ok_or_else(|| Error::FunctionExecutionError {
		name: name.to_string(),
		message: format!("expected a number argument at position {i}"),
	})
}

pub fn add(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("add", args, 0)? + num("add", args, 1)?))
}

pub fn sub(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("sub", args, 0)? - num("sub", args, 1)?))
}

pub fn mul(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("mul", args, 0)? * num("mul", args, 1)?))
}

pub fn div(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("div", args, 0)? / num("div", args, 1)?))
}

pub fn rem(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("mod", args, 0)? % num("mod", args, 1)?))
}

pub fn pow(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("pow", args, 0)?.powf(num("pow", args, 1)?)))
}

pub fn neg(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(-num("neg", args, 0)?))
}

pub fn abs(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("abs", args, 0)?.abs()))
}

pub fn exp(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("exp", args, 0)?.exp()))
}

pub fn pi(_args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(PI))
}

pub fn min(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("min", args, 0)?.min(num("min", args, 1)?)))
}

pub fn max(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Number(num("max", args, 0)?.max(num("max", args, 1)?)))
}

pub fn eq(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Bool(args.first() == args.get(1)))
}

pub fn ne(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Bool(args.first() != args.get(1)))
}

pub fn lt(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Bool(num("lt", args, 0)? < num("lt", args, 1)?))
}

pub fn le(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Bool(num("le", args, 0)? <= num("le", args, 1)?))
}

pub fn gt(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Bool(num("gt", args, 0)? > num("gt", args, 1)?))
}

pub fn ge(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Bool(num("ge", args, 0)? >= num("ge", args, 1)?))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn division_by_zero_is_infinity_not_an_error() {
		let v = div(&[Value::Number(1.0), Value::Number(0.0)]).unwrap();
		assert_eq!(v, Value::Number(f64::INFINITY));
	}

	#[test]
	fn equality_is_value_equality() {
		assert_eq!(eq(&[Value::Str("a".into()), Value::Str("a".into())]).unwrap(), Value::Bool(true));
		assert_eq!(eq(&[Value::Number(1.0), Value::Str("1".into())]).unwrap(), Value::Bool(false));
	}
}
