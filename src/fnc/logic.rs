//! Logical scalar functions. Operate on JS/JSON-style truthiness
//! ([`Value::is_truthy`]), matching the `||`/`&&`/`!` DSL operators they
//! back.

use crate::err::Error;
use crate::value::Value;

pub fn and(args: &[Value]) -> Result<Value, Error> {
	let lhs = args.first().map(Value::is_truthy).unwrap_or(false);
	if !lhs {
		return Ok(Value::Bool(false));
	}
	Ok(Value::Bool(args.get(1).map(Value::is_truthy).unwrap_or(false)))
}

pub fn or(args: &[Value]) -> Result<Value, Error> {
	let lhs = args.first().map(Value::is_truthy).unwrap_or(false);
	if lhs {
		return Ok(Value::Bool(true));
	}
	Ok(Value::Bool(args.get(1).map(Value::is_truthy).unwrap_or(false)))
}

pub fn not(args: &[Value]) -> Result<Value, Error> {
	Ok(Value::Bool(!args.first().map(Value::is_truthy).unwrap_or(false)))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn and_short_circuits_on_falsy_lhs() {
		assert_eq!(and(&[Value::Bool(false), Value::Null]).unwrap(), Value::Bool(false));
	}

	#[test]
	fn not_on_empty_string_is_true() {
		assert_eq!(not(&[Value::Str(String::new())]).unwrap(), Value::Bool(true));
	}
}
