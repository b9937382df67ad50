//! Stateless expression evaluation: `(expr, record-context) -> Value`,
//! recomputed fresh on every call. Used everywhere an expression does not
//! need to retain state across records (`filter`, `select`, `scan`
//! conditions/assignments, window value-extractors, emit predicates). The
//! one place state *does* persist across records — `summarize`'s
//! aggregation template — builds [`crate::expr::AggregationNode`] trees
//! instead; see [`crate::dsl::transpile::build_aggregation_node`].

use super::ast::{BinaryOp, Expr, ObjectItem, UnaryOp};
use crate::err::Error;
use crate::expr::EvalContext;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};

/// Evaluates an expression that is not allowed to depend on a record —
/// a lookup's value, an `insert` literal, a window/emit constructor
/// argument. Used wherever the grammar accepts a full expression but the
/// call site has no record to evaluate it against.
pub fn eval_const(expr: &Expr, funcs: &FunctionRegistry) -> Result<Value, Error> {
	let record = Value::Null;
	let extra = Object::new();
	let ctx = EvalContext::new(&record, &extra);
	eval(expr, &ctx, funcs)
}

pub fn eval(expr: &Expr, ctx: &EvalContext<'_>, funcs: &FunctionRegistry) -> Result<Value, Error> {
	Ok(match expr {
		Expr::Null => Value::Null,
		Expr::Bool(b) => Value::Bool(*b),
		Expr::Number(n) => Value::Number(*n),
		Expr::Duration(d) => Value::Number(*d),
		Expr::Str(s) => Value::Str(s.clone()),
		Expr::Path(path) => ctx.resolve_path(path),
		Expr::Array(items) => {
			let mut out = Vec::with_capacity(items.len());
			for item in items {
				out.push(eval(item, ctx, funcs)?);
			}
			Value::Array(out)
		}
		Expr::Object(items) => Value::Object(eval_object(items, ctx, funcs)?),
		Expr::Unary {
			op,
			expr,
		} => {
			let v = eval(expr, ctx, funcs)?;
			match op {
				UnaryOp::Neg => funcs.call("neg", &[v])?,
				UnaryOp::Not => funcs.call("not", &[v])?,
			}
		}
		Expr::Binary {
			op: BinaryOp::And,
			lhs,
			rhs,
		} => {
			let l = eval(lhs, ctx, funcs)?;
			if !l.is_truthy() {
				Value::Bool(false)
			} else {
				Value::Bool(eval(rhs, ctx, funcs)?.is_truthy())
			}
		}
		Expr::Binary {
			op: BinaryOp::Or,
			lhs,
			rhs,
		} => {
			let l = eval(lhs, ctx, funcs)?;
			if l.is_truthy() {
				Value::Bool(true)
			} else {
				Value::Bool(eval(rhs, ctx, funcs)?.is_truthy())
			}
		}
		Expr::Binary {
			op,
			lhs,
			rhs,
		} => {
			let l = eval(lhs, ctx, funcs)?;
			let r = eval(rhs, ctx, funcs)?;
			funcs.call(binary_fn_name(*op), &[l, r])?
		}
		Expr::Call {
			name,
			args,
		} => {
			let mut evaluated = Vec::with_capacity(args.len());
			for a in args {
				evaluated.push(eval(a, ctx, funcs)?);
			}
			funcs.call(name, &evaluated)?
		}
		Expr::Index {
			target,
			index,
		} => {
			let t = eval(target, ctx, funcs)?;
			let i = eval(index, ctx, funcs)?;
			index_value(&t, &i)
		}
	})
}

fn index_value(target: &Value, index: &Value) -> Value {
	match (target, index) {
		(Value::Array(items), Value::Number(n)) => {
			if *n >= 0.0 {
				items.get(*n as usize).cloned().unwrap_or(Value::Null)
			} else {
				Value::Null
			}
		}
		(Value::Object(_), Value::Str(key)) => target.safe_get(key),
		_ => Value::Null,
	}
}

pub(crate) fn binary_fn_name(op: BinaryOp) -> &'static str {
	match op {
		BinaryOp::Add => "add",
		BinaryOp::Sub => "sub",
		BinaryOp::Mul => "mul",
		BinaryOp::Div => "div",
		BinaryOp::Mod => "mod",
		BinaryOp::Eq => "eq",
		BinaryOp::Ne => "ne",
		BinaryOp::Lt => "lt",
		BinaryOp::Le => "le",
		BinaryOp::Gt => "gt",
		BinaryOp::Ge => "ge",
		BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited above"),
	}
}

/// Materializes a `select`/object-literal template: shorthand and
/// key:value pairs are collected in source order, `...*` splices in every
/// field of the input record, `...expr` splices in an evaluated object's
/// fields, and `-field` removes a previously-set key. Exclusions are
/// applied after every spread and pair has been processed, regardless of
/// where `-field` appears among the items.
pub fn eval_object(items: &[ObjectItem], ctx: &EvalContext<'_>, funcs: &FunctionRegistry) -> Result<Object, Error> {
	let mut out = Object::new();
	let mut exclusions = Vec::new();
	for item in items {
		match item {
			ObjectItem::Shorthand(name) => {
				out.insert(name.clone(), ctx.resolve_path(name));
			}
			ObjectItem::KeyValue(name, expr) => {
				out.insert(name.clone(), eval(expr, ctx, funcs)?);
			}
			ObjectItem::SpreadAll => {
				if let Value::Object(fields) = ctx.record {
					for (k, v) in fields {
						out.insert(k.clone(), v.clone());
					}
				}
			}
			ObjectItem::SpreadExpr(expr) => {
				if let Value::Object(fields) = eval(expr, ctx, funcs)? {
					for (k, v) in fields {
						out.insert(k, v);
					}
				}
			}
			ObjectItem::Exclude(name) => exclusions.push(name.clone()),
		}
	}
	for name in exclusions {
		out.shift_remove(&name);
	}
	Ok(out)
}

#[cfg(test)]
mod test {
	use super::*;

	fn funcs() -> FunctionRegistry {
		FunctionRegistry::with_builtins()
	}

	#[test]
	fn evaluates_arithmetic_with_precedence_already_applied() {
		let record = Value::Null;
		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);
		let expr = crate::dsl::parser::parse_expr("1 + 2 * 3").unwrap();
		assert_eq!(eval(&expr, &ctx, &funcs()).unwrap(), Value::Number(7.0));
	}

	#[test]
	fn select_spread_then_exclude() {
		let record: Value = serde_json::json!({"x": 1, "name": "test", "value": 42}).into();
		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);
		let items = vec![ObjectItem::SpreadAll, ObjectItem::Exclude("name".to_string())];
		let obj = eval_object(&items, &ctx, &funcs()).unwrap();
		assert!(!obj.contains_key("name"));
		assert_eq!(obj.get("value"), Some(&Value::Number(42.0)));
	}

	#[test]
	fn path_resolves_nested_field() {
		let record: Value = serde_json::json!({"payload": {"ts": 5}}).into();
		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);
		let expr = Expr::Path("payload.ts".to_string());
		assert_eq!(eval(&expr, &ctx, &funcs()).unwrap(), Value::Number(5.0));
	}
}
