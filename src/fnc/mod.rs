//! Executes scalar functions used from the pipeline DSL. Every built-in is
//! a plain pure `fn(&[Value]) -> Result<Value, Error>`; there is no shared
//! mutable state, so registration is just populating a lookup table once
//! at engine construction.
//!
//! The one exception is `lookup(name)`, which reads the engine's
//! [`crate::lookup::LookupTable`] — a single `Rc<RefCell<_>>` the registry
//! holds alongside its function table, rather than a second resolution
//! path threaded through every expression context (see DESIGN.md).

mod arithmetic;
mod logic;
mod sketch;

use crate::err::Error;
use crate::lookup::LookupTable;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ScalarFn = fn(&[Value]) -> Result<Value, Error>;

/// A per-engine, owned table of scalar functions, constructed once at
/// startup and passed by reference wherever a call needs resolving. No
/// ambient global state.
pub struct FunctionRegistry {
	functions: HashMap<&'static str, ScalarFn>,
	lookups: Rc<RefCell<LookupTable>>,
}

macro_rules! builtins {
	($($name:literal => $path:path),+ $(,)?) => {{
		let mut functions: HashMap<&'static str, ScalarFn> = HashMap::new();
		$(functions.insert($name, $path);)+
		functions
	}};
}

impl FunctionRegistry {
	pub fn with_builtins() -> Self {
		let functions = builtins! {
			"add" => arithmetic::add,
			"sub" => arithmetic::sub,
			"mul" => arithmetic::mul,
			"div" => arithmetic::div,
			"mod" => arithmetic::rem,
			"pow" => arithmetic::pow,
			"neg" => arithmetic::neg,
			"abs" => arithmetic::abs,
			"eq" => arithmetic::eq,
			"ne" => arithmetic::ne,
			"lt" => arithmetic::lt,
			"le" => arithmetic::le,
			"gt" => arithmetic::gt,
			"ge" => arithmetic::ge,
			"min" => arithmetic::min,
			"max" => arithmetic::max,
			"and" => logic::and,
			"or" => logic::or,
			"not" => logic::not,
			"exp" => arithmetic::exp,
			"pi" => arithmetic::pi,
			"quantile" => sketch::quantile,
			"percentile" => sketch::percentile,
			"median" => sketch::median,
			"cdf" => sketch::cdf,
			"quantile_error" => sketch::quantile_error,
			"cdf_error" => sketch::cdf_error,
		};
		Self {
			functions,
			lookups: Rc::new(RefCell::new(LookupTable::new())),
		}
	}

	/// Builds a registry sharing the given lookup table, so that
	/// `create/delete lookup` control-plane ops (which mutate the table
	/// through this same `Rc`) are visible to subsequent `lookup(name)`
	/// calls made from any compiled pipeline.
	pub fn with_lookups(lookups: Rc<RefCell<LookupTable>>) -> Self {
		let mut registry = Self::with_builtins();
		registry.lookups = lookups;
		registry
	}

	pub fn contains(&self, name: &str) -> bool {
		name == "lookup" || self.functions.contains_key(name)
	}

	/// Runs `name` over already-evaluated `args`, translating a missing
	/// function into `FUNCTION_NOT_FOUND` and any in-function failure into
	/// `FUNCTION_EXECUTION_ERROR` (the function itself only ever returns
	/// the latter).
	pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
		if name == "lookup" {
			return self.call_lookup(args);
		}
		let f = self.functions.get(name).ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
		f(args)
	}

	fn call_lookup(&self, args: &[Value]) -> Result<Value, Error> {
		let name = args.first().and_then(Value::as_str).ok_or_else(|| Error::FunctionExecutionError {
			name: "lookup".to_string(),
			message: "expected a lookup name string argument".to_string(),
		})?;
		self.lookups.borrow().get(name).cloned().ok_or_else(|| Error::LookupNotFound(name.to_string()))
	}
}

impl Default for FunctionRegistry {
	fn default() -> Self {
		Self::with_builtins()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn unknown_function_is_reported() {
		let reg = FunctionRegistry::with_builtins();
		let err = reg.call("nope", &[]).unwrap_err();
		assert_eq!(err.code(), "FUNCTION_NOT_FOUND");
	}

	#[test]
	fn arithmetic_round_trip() {
		let reg = FunctionRegistry::with_builtins();
		let v = reg.call("add", &[Value::Number(1.0), Value::Number(2.0)]).unwrap();
		assert_eq!(v, Value::Number(3.0));
	}

	#[test]
	fn lookup_reads_the_shared_table() {
		let lookups = Rc::new(RefCell::new(LookupTable::new()));
		lookups.borrow_mut().create("limit", Value::Number(10.0), false).unwrap();
		let reg = FunctionRegistry::with_lookups(lookups.clone());
		assert_eq!(reg.call("lookup", &[Value::Str("limit".into())]).unwrap(), Value::Number(10.0));
		lookups.borrow_mut().create("limit", Value::Number(20.0), true).unwrap();
		assert_eq!(reg.call("lookup", &[Value::Str("limit".into())]).unwrap(), Value::Number(20.0));
		assert_eq!(reg.call("lookup", &[Value::Str("nope".into())]).unwrap_err().code(), "LOOKUP_NOT_FOUND");
	}
}
