//! The dynamic value type flowing through streams, expressions and sinks.
//!
//! A JSON-like record: `null`, `bool`, `number` (host double), `string`,
//! `array` and `map`. Maps preserve insertion order
//! (`IndexMap`) because `select`'s `...*` spread and key order are
//! observable, not merely cosmetic.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number as JsonNumber;
use std::fmt;

/// An ordered JSON-like object. Insertion order is preserved.
pub type Object = IndexMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	Str(String),
	Array(Vec<Value>),
	Object(Object),
}

impl Default for Value {
	fn default() -> Self {
		Value::Null
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Number(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Number(v as f64)
	}
}

impl From<usize> for Value {
	fn from(v: usize) -> Self {
		Value::Number(v as f64)
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Str(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Str(v.to_owned())
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Value::Array(v)
	}
}

impl From<Object> for Value {
	fn from(v: Object) -> Self {
		Value::Object(v)
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_json_string())
	}
}

impl Value {
	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn is_number(&self) -> bool {
		matches!(self, Value::Number(_))
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&Object> {
		match self {
			Value::Object(o) => Some(o),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(a) => Some(a),
			_ => None,
		}
	}

	/// JS/JSON-style truthiness: `null`, `false`, `0`, `""` and empty
	/// collections are falsy; everything else is truthy.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Null => false,
			Value::Bool(b) => *b,
			Value::Number(n) => *n != 0.0 && !n.is_nan(),
			Value::Str(s) => !s.is_empty(),
			Value::Array(a) => !a.is_empty(),
			Value::Object(o) => !o.is_empty(),
		}
	}

	/// Safe, undefined-proof traversal of a dot-path (`"payload.ts"`) over
	/// nested objects/arrays. Missing keys or indices, or traversing through
	/// a non-container, yield `Value::Null` rather than erroring.
	pub fn safe_get(&self, path: &str) -> Value {
		let mut cur = self;
		for seg in path.split('.') {
			match cur {
				Value::Object(o) => match o.get(seg) {
					Some(v) => cur = v,
					None => return Value::Null,
				},
				Value::Array(a) => match seg.parse::<usize>().ok().and_then(|i| a.get(i)) {
					Some(v) => cur = v,
					None => return Value::Null,
				},
				_ => return Value::Null,
			}
		}
		cur.clone()
	}

	/// Sets a (possibly nested) dot-path on an object, creating intermediate
	/// objects as needed. No-ops if any intermediate segment is a
	/// non-object value.
	pub fn set_path(&mut self, path: &str, value: Value) {
		let mut segs = path.split('.').peekable();
		let mut cur = self;
		loop {
			let seg = match segs.next() {
				Some(s) => s,
				None => return,
			};
			if !matches!(cur, Value::Object(_)) {
				*cur = Value::Object(Object::new());
			}
			let Value::Object(o) = cur else {
				unreachable!()
			};
			if segs.peek().is_none() {
				o.insert(seg.to_owned(), value);
				return;
			}
			cur = o.entry(seg.to_owned()).or_insert_with(|| Value::Object(Object::new()));
		}
	}

	/// Removes a top-level key; used by `select`'s `-field` exclusion.
	pub fn remove_key(&mut self, key: &str) {
		if let Value::Object(o) = self {
			o.shift_remove(key);
		}
	}

	/// Recursively sorts object keys; used by `assert_or_save_expected` to
	/// make comparisons order-independent.
	pub fn key_sorted(&self) -> Value {
		match self {
			Value::Object(o) => {
				let mut entries: Vec<(String, Value)> =
					o.iter().map(|(k, v)| (k.clone(), v.key_sorted())).collect();
				entries.sort_by(|a, b| a.0.cmp(&b.0));
				Value::Object(entries.into_iter().collect())
			}
			Value::Array(a) => Value::Array(a.iter().map(Value::key_sorted).collect()),
			other => other.clone(),
		}
	}

	pub fn to_json_string(&self) -> String {
		serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
	}

	pub fn from_json_str(s: &str) -> Result<Value, serde_json::Error> {
		serde_json::from_str(s)
	}
}

impl From<serde_json::Value> for Value {
	fn from(v: serde_json::Value) -> Self {
		match v {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => Value::Number(json_number_to_f64(&n)),
			serde_json::Value::String(s) => Value::Str(s),
			serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
			serde_json::Value::Object(o) => {
				Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
			}
		}
	}
}

fn json_number_to_f64(n: &JsonNumber) -> f64 {
	n.as_f64().unwrap_or(f64::NAN)
}

/// Total ordering over values used by `min`/`max`/`sorter`/t-digest
/// centroid sorting. Numbers compare numerically; mixed types fall back to
/// a stable, arbitrary-but-total ordering by type tag then rendered form so
/// `BTreeMap<Value, _>` keys behave predictably.
impl Eq for Value {}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		use std::cmp::Ordering;
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
			(Value::Str(a), Value::Str(b)) => a.cmp(b),
			(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
			(Value::Null, Value::Null) => Ordering::Equal,
			_ => tag_rank(self).cmp(&tag_rank(other)),
		}
	}
}

fn tag_rank(v: &Value) -> u8 {
	match v {
		Value::Null => 0,
		Value::Bool(_) => 1,
		Value::Number(_) => 2,
		Value::Str(_) => 3,
		Value::Array(_) => 4,
		Value::Object(_) => 5,
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn safe_get_nested() {
		let v: Value = serde_json::json!({"payload": {"ts": 42}}).into();
		assert_eq!(v.safe_get("payload.ts"), Value::Number(42.0));
		assert_eq!(v.safe_get("payload.missing"), Value::Null);
		assert_eq!(v.safe_get("missing.deeper"), Value::Null);
	}

	#[test]
	fn truthiness() {
		assert!(!Value::Null.is_truthy());
		assert!(!Value::Number(0.0).is_truthy());
		assert!(Value::Number(1.0).is_truthy());
		assert!(!Value::Str(String::new()).is_truthy());
		assert!(Value::Str("x".into()).is_truthy());
	}

	#[test]
	fn key_sorted_is_order_independent() {
		let mut a = Object::new();
		a.insert("b".into(), Value::Number(1.0));
		a.insert("a".into(), Value::Number(2.0));
		let mut b = Object::new();
		b.insert("a".into(), Value::Number(2.0));
		b.insert("b".into(), Value::Number(1.0));
		assert_eq!(Value::Object(a).key_sorted(), Value::Object(b).key_sorted());
	}
}
