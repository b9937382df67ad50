//! The aggregation expression tree: small trees composing scalar and
//! aggregate calls over a per-record context, with safe field access. Used
//! both for plain `map`/`select`/`filter` projections (no `Aggregation`
//! nodes ever appear there) and for `summarize`'s aggregation object
//! template (which typically does contain them).
//!
//! A single enum with one dispatch point replaces the deep per-kind
//! inheritance a naive port would reach for; a wrapped aggregator's
//! current value is read without disturbing its running state, so a
//! scalar function composed over it sees the live intermediate result.

use crate::agg::{Aggregator, AggregatorRegistry};
use crate::err::Error;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};

/// Everything an expression needs to evaluate one record: the record
/// itself, the enclosing group key (if any), the current window
/// descriptor slot (if any, keyed by the window variable name), and the
/// lookup table.
pub struct EvalContext<'a> {
	pub record: &'a Value,
	pub extra: &'a Object,
}

impl<'a> EvalContext<'a> {
	pub fn new(record: &'a Value, extra: &'a Object) -> Self {
		Self {
			record,
			extra,
		}
	}

	pub fn resolve_path(&self, path: &str) -> Value {
		if let Some((head, rest)) = path.split_once('.') {
			if let Some(v) = self.extra.get(head) {
				return v.safe_get(rest);
			}
		} else if let Some(v) = self.extra.get(path) {
			return v.clone();
		}
		self.record.safe_get(path)
	}
}

/// A node in the aggregation expression tree: a safe field access, a
/// constant, a scalar function call over child nodes, or a named
/// aggregator fed by child nodes on every push. `Literal` carries no
/// state to push/reset and exists only to hold constant call arguments
/// (e.g. the `0.5` in `quantile(sketch, 0.5)`).
pub enum AggregationNode {
	SafeGet {
		path: String,
		current: Value,
	},
	Literal {
		value: Value,
	},
	Scalar {
		name: String,
		children: Vec<AggregationNode>,
		current: Value,
	},
	Aggregation {
		name: String,
		children: Vec<AggregationNode>,
		wrapped: Box<dyn Aggregator>,
	},
}

impl AggregationNode {
	pub fn safe_get(path: impl Into<String>) -> Self {
		AggregationNode::SafeGet {
			path: path.into(),
			current: Value::Null,
		}
	}

	pub fn literal(value: Value) -> Self {
		AggregationNode::Literal {
			value,
		}
	}

	pub fn scalar(name: impl Into<String>, children: Vec<AggregationNode>) -> Self {
		AggregationNode::Scalar {
			name: name.into(),
			children,
			current: Value::Null,
		}
	}

	pub fn aggregation(
		registry: &AggregatorRegistry,
		name: &str,
		children: Vec<AggregationNode>,
		config: &[Value],
	) -> Result<Self, Error> {
		let wrapped = registry
			.construct(name, config)
			.ok_or_else(|| Error::FunctionNotFound(format!("aggregator `{name}`")))?;
		Ok(AggregationNode::Aggregation {
			name: name.to_string(),
			children,
			wrapped,
		})
	}

	/// Folds one record through the subtree, updating any stored scalar
	/// results and feeding any wrapped aggregators.
	pub fn push(&mut self, ctx: &EvalContext<'_>, funcs: &FunctionRegistry) -> Result<(), Error> {
		match self {
			AggregationNode::SafeGet {
				path,
				current,
			} => {
				*current = ctx.resolve_path(path);
			}
			AggregationNode::Literal {
				..
			} => {}
			AggregationNode::Scalar {
				name,
				children,
				current,
			} => {
				for child in children.iter_mut() {
					child.push(ctx, funcs)?;
				}
				let args: Vec<Value> = children.iter().map(AggregationNode::result).collect();
				*current = funcs.call(name, &args)?;
			}
			AggregationNode::Aggregation {
				children,
				wrapped,
				..
			} => {
				for child in children.iter_mut() {
					child.push(ctx, funcs)?;
				}
				let args: Vec<Value> = children.iter().map(AggregationNode::result).collect();
				wrapped.push(&args);
			}
		}
		Ok(())
	}

	/// The subtree's current result: the stored value for `SafeGet`/
	/// `Scalar`/`Literal`, or the wrapped aggregator's live result for
	/// `Aggregation` — read without disturbing the aggregator's state, so
	/// a scalar function composed over an aggregation sees its
	/// intermediate value.
	pub fn result(&self) -> Value {
		match self {
			AggregationNode::SafeGet {
				current,
				..
			}
			| AggregationNode::Scalar {
				current,
				..
			} => current.clone(),
			AggregationNode::Literal {
				value,
			} => value.clone(),
			AggregationNode::Aggregation {
				wrapped,
				..
			} => wrapped.result(),
		}
	}

	/// Returns the subtree to its initial state.
	pub fn reset(&mut self) {
		match self {
			AggregationNode::SafeGet {
				current,
				..
			}
			| AggregationNode::Scalar {
				current,
				..
			} => *current = Value::Null,
			AggregationNode::Literal {
				..
			} => {}
			AggregationNode::Aggregation {
				children,
				wrapped,
				..
			} => {
				wrapped.reset();
				for child in children.iter_mut() {
					child.reset();
				}
			}
		}
	}

	/// An independent copy with the same shape and initial state.
	pub fn clone_node(&self) -> AggregationNode {
		match self {
			AggregationNode::SafeGet {
				path,
				..
			} => AggregationNode::SafeGet {
				path: path.clone(),
				current: Value::Null,
			},
			AggregationNode::Literal {
				value,
			} => AggregationNode::Literal {
				value: value.clone(),
			},
			AggregationNode::Scalar {
				name,
				children,
				..
			} => AggregationNode::Scalar {
				name: name.clone(),
				children: children.iter().map(AggregationNode::clone_node).collect(),
				current: Value::Null,
			},
			AggregationNode::Aggregation {
				name,
				children,
				wrapped,
			} => {
				let mut cloned_wrapped = wrapped.clone_box();
				cloned_wrapped.reset();
				AggregationNode::Aggregation {
					name: name.clone(),
					children: children.iter().map(AggregationNode::clone_node).collect(),
					wrapped: cloned_wrapped,
				}
			}
		}
	}

	/// `true` if this is (or wraps) an aggregation whose wrapped value may
	/// change on push; used by `summarize`'s "value changed" tracking and
	/// `emit_on_update`.
	pub fn is_aggregate(&self) -> bool {
		matches!(self, AggregationNode::Aggregation { .. })
			|| matches!(self, AggregationNode::Scalar { children, .. } if children.iter().any(Self::is_aggregate))
	}
}

/// A named set of aggregation nodes (the object literal following
/// `summarize { ... }`, or a plain projection for `map`/`select`).
pub struct AggregationTemplate {
	pub fields: Vec<(String, AggregationNode)>,
}

impl AggregationTemplate {
	pub fn new(fields: Vec<(String, AggregationNode)>) -> Self {
		Self {
			fields,
		}
	}

	pub fn clone_template(&self) -> AggregationTemplate {
		AggregationTemplate {
			fields: self.fields.iter().map(|(k, v)| (k.clone(), v.clone_node())).collect(),
		}
	}

	pub fn push(&mut self, ctx: &EvalContext<'_>, funcs: &FunctionRegistry) -> Result<(), Error> {
		for (_, node) in self.fields.iter_mut() {
			node.push(ctx, funcs)?;
		}
		Ok(())
	}

	pub fn materialize(&self) -> Object {
		self.fields.iter().map(|(k, v)| (k.clone(), v.result())).collect()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn ctx_for(record: &Value) -> (Object, FunctionRegistry) {
		(Object::new(), FunctionRegistry::with_builtins())
	}

	#[test]
	fn clone_and_original_agree_after_same_pushes() {
		let reg = AggregatorRegistry::with_builtins();
		let mut node =
			AggregationNode::aggregation(&reg, "sum", vec![AggregationNode::safe_get("amount")], &[]).unwrap();
		let mut cloned = node.clone_node();
		let funcs = FunctionRegistry::with_builtins();
		for v in [1.0, 2.0, 3.0] {
			let record: Value = serde_json::json!({"amount": v}).into();
			let extra = Object::new();
			let ctx = EvalContext::new(&record, &extra);
			node.push(&ctx, &funcs).unwrap();
			cloned.push(&ctx, &funcs).unwrap();
		}
		assert_eq!(node.result(), cloned.result());
		assert_eq!(node.result(), Value::Number(6.0));
	}

	#[test]
	fn reset_clears_wrapped_aggregator() {
		let reg = AggregatorRegistry::with_builtins();
		let mut node =
			AggregationNode::aggregation(&reg, "count", vec![AggregationNode::literal(Value::Null)], &[]).unwrap();
		let funcs = FunctionRegistry::with_builtins();
		let record = Value::Null;
		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);
		node.push(&ctx, &funcs).unwrap();
		node.push(&ctx, &funcs).unwrap();
		assert_eq!(node.result(), Value::Number(2.0));
		node.reset();
		assert_eq!(node.result(), Value::Number(0.0));
	}

	#[test]
	fn scalar_over_aggregation_sees_intermediate_value() {
		let reg = AggregatorRegistry::with_builtins();
		let agg = AggregationNode::aggregation(&reg, "sum", vec![AggregationNode::safe_get("x")], &[]).unwrap();
		let mut node = AggregationNode::scalar("abs", vec![agg]);
		let funcs = FunctionRegistry::with_builtins();
		let record: Value = serde_json::json!({"x": -5}).into();
		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);
		node.push(&ctx, &funcs).unwrap();
		assert_eq!(node.result(), Value::Number(5.0));
	}
}
