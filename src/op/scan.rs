//! `scan`: a multi-step pattern operator. Each step holds at most one
//! in-flight state entry; a record either promotes the previous step's
//! state into this step, or advances this step's own (possibly fresh)
//! state, running the step's assignment block and optionally emitting.

use super::{cancel_downstream, emit, flush_downstream, Operator};
use crate::dsl::ast::{Expr, ScanStep, ScanStmt};
use crate::dsl::eval::eval;
use crate::err::Error;
use crate::expr::EvalContext;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};
use std::rc::Rc;

pub struct ScanOp {
	pub steps: Vec<ScanStep>,
	pub states: Vec<Option<Object>>,
	/// Per-step match id, tracked outside `states` so it never spreads into
	/// `...stepName` the way the rest of a step's state does.
	pub match_ids: Vec<Option<u64>>,
	pub next_match_id: u64,
	pub funcs: Rc<FunctionRegistry>,
	pub downstream: Option<Box<Operator>>,
}

impl ScanOp {
	pub fn new(steps: Vec<ScanStep>, funcs: Rc<FunctionRegistry>, downstream: Option<Box<Operator>>) -> Self {
		let states = steps.iter().map(|_| None).collect();
		let match_ids = steps.iter().map(|_| None).collect();
		Self {
			steps,
			states,
			match_ids,
			next_match_id: 1,
			funcs,
			downstream,
		}
	}

	fn condition_holds(&self, condition: &Expr, record: &Value, step_name: &str, state: &Object) -> Result<bool, Error> {
		let mut extra = Object::new();
		extra.insert(step_name.to_string(), Value::Object(state.clone()));
		let ctx = EvalContext::new(record, &extra);
		Ok(eval(condition, &ctx, &self.funcs)?.is_truthy())
	}

	async fn run_body(
		&mut self,
		body: &[ScanStmt],
		record: &Value,
		step_name: &str,
		state: &mut Object,
	) -> Result<(), Error> {
		for stmt in body {
			match stmt {
				ScanStmt::Assign {
					path,
					value,
				} => {
					let mut extra = Object::new();
					extra.insert(step_name.to_string(), Value::Object(state.clone()));
					let ctx = EvalContext::new(record, &extra);
					let evaluated = eval(value, &ctx, &self.funcs)?;
					let field = path.strip_prefix(step_name).and_then(|rest| rest.strip_prefix('.')).unwrap_or(path);
					let mut as_value = Value::Object(state.clone());
					as_value.set_path(field, evaluated);
					if let Value::Object(updated) = as_value {
						*state = updated;
					}
				}
				ScanStmt::Emit(expr) => {
					let mut extra = Object::new();
					extra.insert(step_name.to_string(), Value::Object(state.clone()));
					let ctx = EvalContext::new(record, &extra);
					let out = eval(expr, &ctx, &self.funcs)?;
					emit(&mut self.downstream, out).await?;
				}
			}
		}
		Ok(())
	}

	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		for i in (0..self.steps.len()).rev() {
			let mut promoted = false;
			if i > 0 {
				if let Some(prev_state) = self.states[i - 1].clone() {
					let prev_name = self.steps[i - 1].name.clone();
					let condition = self.steps[i].condition.clone();
					if self.condition_holds(&condition, &record, &prev_name, &prev_state)? {
						self.states[i - 1] = None;
						self.match_ids[i] = self.match_ids[i - 1].take();
						let mut state = prev_state;
						let body = self.steps[i].body.clone();
						let name = self.steps[i].name.clone();
						self.run_body(&body, &record, &name, &mut state).await?;
						self.states[i] = Some(state);
						promoted = true;
					}
				}
			}
			if !promoted {
				let had_state = self.states[i].is_some();
				if had_state || i == 0 {
					let mut state = self.states[i].clone().unwrap_or_default();
					let name = self.steps[i].name.clone();
					let condition = self.steps[i].condition.clone();
					if self.condition_holds(&condition, &record, &name, &state)? {
						if !had_state {
							self.match_ids[i] = Some(self.next_match_id);
							self.next_match_id += 1;
						}
						let body = self.steps[i].body.clone();
						self.run_body(&body, &record, &name, &mut state).await?;
						self.states[i] = Some(state);
					}
				}
			}
		}
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
		// Retained partial matches are never emitted on flush.
		flush_downstream(&mut self.downstream).await
	}

	pub fn cancel(&mut self) {
		cancel_downstream(&mut self.downstream);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::dsl::parser::parse_expr;

	fn step(name: &str, condition: &str, body: Vec<ScanStmt>) -> ScanStep {
		ScanStep {
			name: name.to_string(),
			condition: parse_expr(condition).unwrap(),
			body,
		}
	}

	#[tokio::test]
	async fn single_step_counts_and_carries_input_field() {
		let body = vec![
			ScanStmt::Assign {
				path: "s1.count".to_string(),
				value: parse_expr("(s1.count || 0) + 1").unwrap(),
			},
			ScanStmt::Emit(Expr::Object(vec![
				crate::dsl::ast::ObjectItem::SpreadExpr(Expr::Path("s1".to_string())),
				crate::dsl::ast::ObjectItem::KeyValue("input".to_string(), Expr::Path("x".to_string())),
			])),
		];
		let mut op = ScanOp::new(vec![step("s1", "true", body)], Rc::new(FunctionRegistry::with_builtins()), None);
		op.push(serde_json::json!({"x": 5}).into()).await.unwrap();
		let state = op.states[0].clone().unwrap();
		assert_eq!(state.get("count"), Some(&Value::Number(1.0)));
	}
}
