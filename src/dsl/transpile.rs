//! Turns a parsed [`ast::Pipeline`] into a runnable [`Pipeline`] of
//! [`Operator`]s. Built bottom-up: the tail operator (the sink) is
//! constructed first with no downstream, then each preceding operation is
//! wrapped around it, so every operator's `downstream` field is known at
//! construction time instead of patched in afterwards.
//!
//! Aggregation templates (`summarize {...}`) are the one place a plain
//! expression is not enough: [`build_aggregation_node`] lowers an
//! `Expr::Call` into an [`AggregationNode::Aggregation`] when the name
//! resolves against the engine's [`AggregatorRegistry`], and into a
//! [`AggregationNode::Scalar`] otherwise — the same name resolves to
//! different node kinds depending on which registry claims it, mirroring
//! how [`crate::expr`] documents the split.

use super::ast::{self, Expr, ObjectItem, Operation};
use super::eval::eval_const;
use crate::agg::AggregatorRegistry;
use crate::emit;
use crate::err::Error;
use crate::expr::{AggregationNode, AggregationTemplate};
use crate::fnc::FunctionRegistry;
use crate::op::filter::FilterOp;
use crate::op::scan::ScanOp;
use crate::op::select::SelectOp;
use crate::op::sink::{AssertOrSaveOp, CollectOp, FileMode, InsertIntoOp, WriteToFileOp, WriteToFileOptions};
use crate::op::summarize::SummarizeOp;
use crate::op::Operator;
use crate::pipeline::Pipeline;
use crate::stream::StreamManager;
use crate::value::Value;
use crate::window;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// The shared, read-only context a compile needs: the two function-like
/// registries (passed by `Rc` so every operator in the chain can hold one
/// without re-resolving names per record) and a weak handle to the
/// stream manager sinks insert into.
pub struct CompileContext {
	pub funcs: Rc<FunctionRegistry>,
	pub aggs: Rc<AggregatorRegistry>,
	pub manager: Weak<RefCell<StreamManager>>,
}

/// Compiles one DSL pipeline. Validates that the source stream and every
/// `insert_into` target already exist (spec §7: undefined source/sink is
/// a synchronous semantic-validation error) before building any operator.
pub fn compile_pipeline(pipeline: &ast::Pipeline, ctx: &CompileContext) -> Result<(String, Pipeline), Error> {
	let manager = ctx.manager.upgrade().ok_or_else(|| Error::ExecutionFailed("stream manager no longer exists".to_string()))?;
	if !manager.borrow().stream_exists(&pipeline.source) {
		return Err(Error::StreamNotFound(pipeline.source.clone()));
	}
	for op in &pipeline.ops {
		if let Operation::InsertInto(target) = op {
			if !manager.borrow().stream_exists(target) {
				return Err(Error::StreamNotFound(target.clone()));
			}
		}
	}

	let mut downstream: Option<Box<Operator>> = None;
	for op in pipeline.ops.iter().rev() {
		let built = compile_operation(op, ctx, downstream.take())?;
		downstream = Some(Box::new(built));
	}
	let head = downstream.map(|b| *b);
	Ok((pipeline.source.clone(), Pipeline::new(head)))
}

fn compile_operation(op: &Operation, ctx: &CompileContext, downstream: Option<Box<Operator>>) -> Result<Operator, Error> {
	Ok(match op {
		Operation::Where(expr) => Operator::Filter(FilterOp {
			predicate: expr.clone(),
			funcs: ctx.funcs.clone(),
			downstream,
		}),
		Operation::Select(items) => Operator::Select(SelectOp {
			items: items.clone(),
			funcs: ctx.funcs.clone(),
			downstream,
		}),
		Operation::Scan(steps) => Operator::Scan(ScanOp::new(steps.clone(), ctx.funcs.clone(), downstream)),
		Operation::Summarize {
			agg,
			by,
			window: window_expr,
			emit: emit_expr,
		} => {
			let template = build_template(agg, &ctx.funcs, &ctx.aggs)?;
			let group_key = by.clone();
			let compiled_window = window_expr.as_ref().map(|w| window::build(w, &ctx.funcs)).transpose()?;
			let emit_policy = match emit_expr {
				Some(e) => emit::build(e, &ctx.funcs)?,
				// No `emit` clause: suppress every mid-stream emission and
			// materialize each live (group, window) once, on `flush`.
			None => emit::Emit::OnFlush,
			};
			Operator::Summarize(SummarizeOp::new(template, group_key, compiled_window, emit_policy, "window".to_string(), ctx.funcs.clone(), downstream))
		}
		Operation::InsertInto(target) => Operator::InsertInto(InsertIntoOp::new(target.clone(), ctx.manager.clone())),
		Operation::WriteToFile {
			path,
			options,
		} => {
			let path_value = eval_const(path, &ctx.funcs)?;
			let path = path_value.as_str().ok_or_else(|| Error::InvalidQuery("write_to_file path must be a string".to_string()))?;
			let options = build_file_options(options.as_deref(), &ctx.funcs)?;
			Operator::WriteToFile(WriteToFileOp::new(path.into(), options, ctx.manager.clone())?)
		}
		Operation::AssertOrSaveExpected(path) => {
			let path_value = eval_const(path, &ctx.funcs)?;
			let path = path_value.as_str().ok_or_else(|| Error::InvalidQuery("assert_or_save_expected path must be a string".to_string()))?;
			Operator::AssertOrSaveExpected(AssertOrSaveOp::new(path.into(), ctx.manager.clone())?)
		}
		Operation::Collect => Operator::Collect(CollectOp::new(ctx.manager.clone())),
	})
}

fn build_file_options(items: Option<&[ObjectItem]>, funcs: &FunctionRegistry) -> Result<WriteToFileOptions, Error> {
	let mut options = WriteToFileOptions::default();
	let Some(items) = items else {
		return Ok(options);
	};
	for item in items {
		let ObjectItem::KeyValue(key, expr) = item else {
			continue;
		};
		let value = eval_const(expr, funcs)?;
		match key.as_str() {
			"mode" => {
				options.mode = match value.as_str() {
					Some("overwrite") => FileMode::Overwrite,
					Some("append") => FileMode::Append,
					_ => return Err(Error::InvalidQuery("write_to_file mode must be \"append\" or \"overwrite\"".to_string())),
				};
			}
			"buffer_size_mb" => {
				let mb = value.as_f64().ok_or_else(|| Error::InvalidQuery("buffer_size_mb must be a number".to_string()))?;
				options.buffer_size_bytes = (mb * 1_000_000.0) as usize;
			}
			"fsync_every" => {
				let secs = value.as_f64().ok_or_else(|| Error::InvalidQuery("fsync_every must be a duration".to_string()))?;
				options.fsync_every = Some(Duration::from_secs_f64(secs.max(0.0)));
			}
			other => return Err(Error::InvalidQuery(format!("unknown write_to_file option `{other}`"))),
		}
	}
	Ok(options)
}

/// Builds a `summarize` aggregation object template from its `{...}`
/// item list: shorthand fields resolve as a safe field access of the
/// same name, `k: expr` pairs lower `expr` through [`build_aggregation_node`].
fn build_template(items: &[ObjectItem], funcs: &FunctionRegistry, aggs: &AggregatorRegistry) -> Result<AggregationTemplate, Error> {
	let mut fields = Vec::new();
	for item in items {
		match item {
			ObjectItem::Shorthand(name) => fields.push((name.clone(), AggregationNode::safe_get(name.clone()))),
			ObjectItem::KeyValue(name, expr) => fields.push((name.clone(), build_aggregation_node(expr, funcs, aggs)?)),
			ObjectItem::SpreadAll | ObjectItem::SpreadExpr(_) | ObjectItem::Exclude(_) => {
				return Err(Error::InvalidQuery("summarize's aggregation object does not support spreads or exclusions".to_string()));
			}
		}
	}
	Ok(AggregationTemplate::new(fields))
}

/// The number of per-record push arguments each built-in aggregator
/// expects; any trailing call arguments beyond this are treated as
/// constructor configuration (e.g. `tdigest`'s `compression`) instead of
/// per-record values, and are evaluated once at compile time.
fn aggregator_arity(name: &str) -> usize {
	match name {
		"count" => 0,
		"sum" | "tdigest" | "uddsketch" => 1,
		_ => 1,
	}
}

/// Lowers one DSL expression into an [`AggregationNode`]. A call whose
/// name the [`AggregatorRegistry`] recognizes becomes a wrapped
/// aggregator fed by its leading arguments (with any trailing constant
/// arguments captured once as constructor config); a call the
/// [`FunctionRegistry`] recognizes becomes a `Scalar` node; binary/unary
/// operators desugar to the same scalar function names
/// [`super::eval::binary_fn_name`] uses for plain expression evaluation,
/// so a scalar composed over an aggregation sees its live intermediate
/// result exactly as `map`/`filter` would.
pub fn build_aggregation_node(expr: &Expr, funcs: &FunctionRegistry, aggs: &AggregatorRegistry) -> Result<AggregationNode, Error> {
	Ok(match expr {
		Expr::Path(path) => AggregationNode::safe_get(path.clone()),
		Expr::Null | Expr::Bool(_) | Expr::Number(_) | Expr::Duration(_) | Expr::Str(_) => AggregationNode::literal(eval_const(expr, funcs)?),
		Expr::Unary {
			op,
			expr: inner,
		} => {
			let name = match op {
				ast::UnaryOp::Neg => "neg",
				ast::UnaryOp::Not => "not",
			};
			AggregationNode::scalar(name, vec![build_aggregation_node(inner, funcs, aggs)?])
		}
		Expr::Binary {
			op,
			lhs,
			rhs,
		} => {
			let name = super::eval::binary_fn_name(*op);
			AggregationNode::scalar(name, vec![build_aggregation_node(lhs, funcs, aggs)?, build_aggregation_node(rhs, funcs, aggs)?])
		}
		Expr::Call {
			name,
			args,
		} => {
			if aggs.contains(name) {
				let arity = aggregator_arity(name).min(args.len());
				let children = args[..arity].iter().map(|a| build_aggregation_node(a, funcs, aggs)).collect::<Result<Vec<_>, _>>()?;
				let config: Vec<Value> = args[arity..].iter().map(|a| eval_const(a, funcs)).collect::<Result<Vec<_>, _>>()?;
				AggregationNode::aggregation(aggs, name, children, &config)?
			} else if funcs.contains(name) {
				let children = args.iter().map(|a| build_aggregation_node(a, funcs, aggs)).collect::<Result<Vec<_>, _>>()?;
				AggregationNode::scalar(name.clone(), children)
			} else {
				return Err(Error::FunctionNotFound(name.clone()));
			}
		}
		Expr::Index {
			..
		}
		| Expr::Array(_)
		| Expr::Object(_) => return Err(Error::InvalidQuery("unsupported expression shape inside a summarize aggregation".to_string())),
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::dsl::parser::parse_expr;

	#[test]
	fn aggregation_call_wraps_an_aggregator() {
		let funcs = FunctionRegistry::with_builtins();
		let aggs = AggregatorRegistry::with_builtins();
		let expr = parse_expr("sum(amount)").unwrap();
		let node = build_aggregation_node(&expr, &funcs, &aggs).unwrap();
		assert!(matches!(node, AggregationNode::Aggregation { .. }));
	}

	#[test]
	fn scalar_call_over_aggregation_builds_nested_node() {
		let funcs = FunctionRegistry::with_builtins();
		let aggs = AggregatorRegistry::with_builtins();
		let expr = parse_expr("abs(sum(amount))").unwrap();
		let node = build_aggregation_node(&expr, &funcs, &aggs).unwrap();
		assert!(matches!(node, AggregationNode::Scalar { .. }));
	}

	#[test]
	fn tdigest_trailing_literal_is_compile_time_config_not_a_child() {
		let funcs = FunctionRegistry::with_builtins();
		let aggs = AggregatorRegistry::with_builtins();
		let expr = parse_expr("tdigest(amount, 50)").unwrap();
		let node = build_aggregation_node(&expr, &funcs, &aggs).unwrap();
		let AggregationNode::Aggregation {
			children,
			..
		} = &node
		else {
			panic!("expected an aggregation node");
		};
		assert_eq!(children.len(), 1);
	}

	#[test]
	fn unknown_call_name_is_a_function_not_found_error() {
		let funcs = FunctionRegistry::with_builtins();
		let aggs = AggregatorRegistry::with_builtins();
		let expr = parse_expr("nope(1)").unwrap();
		assert!(build_aggregation_node(&expr, &funcs, &aggs).is_err());
	}
}
