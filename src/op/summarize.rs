//! `summarize`: windowed, grouped, incremental aggregation. State is a
//! two-level map `group -> window_id -> (descriptor, aggregation context)`
//! so at most one aggregator instance exists per `(groupKey, windowId)`
//! pair. `BTreeMap` keyed directly on [`Value`] (which already has a total
//! `Ord`) avoids needing a second `Hash` impl just for this one map.

use super::{cancel_downstream, emit, flush_downstream, Operator};
use crate::dsl::ast::Expr;
use crate::dsl::eval::eval;
use crate::emit::Emit;
use crate::err::Error;
use crate::expr::{AggregationTemplate, EvalContext};
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};
use crate::window::{Window, WindowDescriptor};
use std::collections::BTreeMap;
use std::rc::Rc;

struct WindowState {
	descriptor: WindowDescriptor,
	template: AggregationTemplate,
	last_emitted: Option<Value>,
}

pub struct SummarizeOp {
	pub template: AggregationTemplate,
	pub group_key: Option<Expr>,
	pub window: Option<Window>,
	pub emit: Emit,
	pub window_var: String,
	pub funcs: Rc<FunctionRegistry>,
	pub downstream: Option<Box<Operator>>,

	state: BTreeMap<Value, BTreeMap<String, WindowState>>,
}

impl SummarizeOp {
	pub fn new(
		template: AggregationTemplate,
		group_key: Option<Expr>,
		window: Option<Window>,
		emit: Emit,
		window_var: String,
		funcs: Rc<FunctionRegistry>,
		downstream: Option<Box<Operator>>,
	) -> Self {
		Self {
			template,
			group_key,
			window,
			emit,
			window_var,
			funcs,
			downstream,
			state: BTreeMap::new(),
		}
	}

	fn group_of(&self, record: &Value) -> Result<Value, Error> {
		match &self.group_key {
			Some(expr) => {
				let extra = Object::new();
				let ctx = EvalContext::new(record, &extra);
				eval(expr, &ctx, &self.funcs)
			}
			None => Ok(Value::Null),
		}
	}

	fn windows_of(&mut self, record: &Value) -> Result<Vec<WindowDescriptor>, Error> {
		match &mut self.window {
			Some(w) => w.windows_for(record, &self.funcs),
			None => Ok(vec![WindowDescriptor::synthetic_all()]),
		}
	}

	fn materialize(&self, state: &WindowState, window_present: bool) -> Value {
		let mut obj = state.template.materialize();
		if window_present {
			obj.insert(self.window_var.clone(), state.descriptor.to_value());
		}
		Value::Object(obj)
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		let group = self.group_of(&record)?;
		let windows = self.windows_of(&record)?;
		let window_present = self.window.is_some();

		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);

		let mut to_emit: Vec<Value> = Vec::new();

		for descriptor in windows {
			let by_window = self.state.entry(group.clone()).or_default();
			let state = by_window.entry(descriptor.id.clone()).or_insert_with(|| WindowState {
				descriptor: descriptor.clone(),
				template: self.template.clone_template(),
				last_emitted: None,
			});
			state.descriptor = descriptor;
			state.template.push(&ctx, &self.funcs)?;

			let current = self.materialize(state, window_present);
			let changed = state.last_emitted.as_ref() != Some(&current);

			if self.emit.should_emit(&current, Some(&group), changed, &self.funcs)? {
				state.last_emitted = Some(current.clone());
				to_emit.push(current);
			}
		}

		for item in to_emit {
			emit(&mut self.downstream, item).await?;
		}
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
		let window_present = self.window.is_some();
		let mut to_emit = Vec::new();
		for by_window in self.state.values() {
			for state in by_window.values() {
				if self.emit.force_emit() {
					to_emit.push(self.materialize(state, window_present));
				}
			}
		}
		self.state.clear();
		for item in to_emit {
			emit(&mut self.downstream, item).await?;
		}
		flush_downstream(&mut self.downstream).await
	}

	pub fn cancel(&mut self) {
		self.state.clear();
		cancel_downstream(&mut self.downstream);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::agg::AggregatorRegistry;
	use crate::dsl::parser::parse_expr;
	use crate::expr::AggregationNode;

	fn template() -> AggregationTemplate {
		let reg = AggregatorRegistry::with_builtins();
		AggregationTemplate::new(vec![
			("total_amount".to_string(), AggregationNode::aggregation(&reg, "sum", vec![AggregationNode::safe_get("amount")], &[]).unwrap()),
			("count".to_string(), AggregationNode::aggregation(&reg, "count", vec![], &[]).unwrap()),
		])
	}

	#[tokio::test]
	async fn groups_without_window_emit_one_final_record_per_group_on_flush() {
		let mut op = SummarizeOp::new(
			template(),
			Some(parse_expr("product").unwrap()),
			None,
			Emit::OnUpdate,
			"window".to_string(),
			Rc::new(FunctionRegistry::with_builtins()),
			None,
		);
		for (product, amount) in [("laptop", 1200.0), ("laptop", 1100.0), ("mouse", 25.0), ("mouse", 30.0)] {
			op.push(serde_json::json!({"product": product, "amount": amount}).into()).await.unwrap();
		}
		op.flush().await.unwrap();
		assert!(op.state.is_empty());
	}

	#[tokio::test]
	async fn at_most_one_aggregator_per_group_window_pair() {
		let mut op = SummarizeOp::new(
			template(),
			Some(parse_expr("product").unwrap()),
			None,
			Emit::OnUpdate,
			"window".to_string(),
			Rc::new(FunctionRegistry::with_builtins()),
			None,
		);
		op.push(serde_json::json!({"product": "a", "amount": 1.0}).into()).await.unwrap();
		op.push(serde_json::json!({"product": "a", "amount": 2.0}).into()).await.unwrap();
		assert_eq!(op.state.len(), 1);
		let windows = op.state.values().next().unwrap();
		assert_eq!(windows.len(), 1);
	}
}
