//! Named, immutable-per-read constant values consulted during expression
//! evaluation (e.g. a shared configuration value or reference table too
//! small to warrant its own stream). Lookups are mutable only through the
//! control-plane `create|delete lookup` operations; an update only takes
//! effect for evaluations that start after it lands.

use crate::err::Error;
use crate::value::{Object, Value};
use std::collections::HashMap;

#[derive(Default)]
pub struct LookupTable {
	entries: HashMap<String, Value>,
}

impl LookupTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn create(&mut self, name: &str, value: Value, replace: bool) -> Result<(), Error> {
		if !replace && self.entries.contains_key(name) {
			return Err(Error::LookupNameConflict(name.to_string()));
		}
		self.entries.insert(name.to_string(), value);
		Ok(())
	}

	pub fn delete(&mut self, name: &str) -> Result<(), Error> {
		self.entries.remove(name).ok_or_else(|| Error::LookupNotFound(name.to_string())).map(|_| ())
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.entries.get(name)
	}

	pub fn names(&self) -> Vec<String> {
		self.entries.keys().cloned().collect()
	}

	/// Snapshots the whole table into an object, for merging into an
	/// expression-evaluation context.
	pub fn as_object(&self) -> Object {
		self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn create_without_replace_rejects_duplicate() {
		let mut t = LookupTable::new();
		t.create("limit", Value::Number(10.0), false).unwrap();
		let err = t.create("limit", Value::Number(20.0), false).unwrap_err();
		assert_eq!(err.code(), "LOOKUP_NAME_CONFLICT");
	}

	#[test]
	fn delete_missing_is_an_error() {
		let mut t = LookupTable::new();
		assert_eq!(t.delete("nope").unwrap_err().code(), "LOOKUP_NOT_FOUND");
	}
}
