//! `filter`: emits the input unchanged iff its predicate is truthy. No
//! state of its own; `flush` is a pure pass-through.

use super::{cancel_downstream, emit, flush_downstream, Operator};
use crate::dsl::ast::Expr;
use crate::dsl::eval::eval;
use crate::err::Error;
use crate::expr::EvalContext;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};
use std::rc::Rc;

pub struct FilterOp {
	pub predicate: Expr,
	pub funcs: Rc<FunctionRegistry>,
	pub downstream: Option<Box<Operator>>,
}

impl FilterOp {
	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);
		if eval(&self.predicate, &ctx, &self.funcs)?.is_truthy() {
			emit(&mut self.downstream, record).await?;
		}
		Ok(())
	}

	pub async fn flush(&mut self) -> Result<(), Error> {
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

	#[tokio::test]
	async fn emits_iff_predicate_is_truthy() {
		let mut op = FilterOp {
			predicate: parse_expr("x > 1").unwrap(),
			funcs: Rc::new(FunctionRegistry::with_builtins()),
			downstream: None,
		};
		op.push(serde_json::json!({"x": 5}).into()).await.unwrap();
		op.push(serde_json::json!({"x": 0}).into()).await.unwrap();
	}
}
