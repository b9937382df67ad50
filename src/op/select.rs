//! `select`: materializes an object literal from shorthand fields, spreads,
//! key:value pairs and exclusions. Emits exactly one record per input.

use super::{cancel_downstream, emit, flush_downstream, Operator};
use crate::dsl::ast::ObjectItem;
use crate::dsl::eval::eval_object;
use crate::err::Error;
use crate::expr::EvalContext;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};
use std::rc::Rc;

pub struct SelectOp {
	pub items: Vec<ObjectItem>,
	pub funcs: Rc<FunctionRegistry>,
	pub downstream: Option<Box<Operator>>,
}

impl SelectOp {
	pub async fn push(&mut self, record: Value) -> Result<(), Error> {
		let extra = Object::new();
		let ctx = EvalContext::new(&record, &extra);
		let obj = eval_object(&self.items, &ctx, &self.funcs)?;
		emit(&mut self.downstream, Value::Object(obj)).await
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

	#[tokio::test]
	async fn spread_all_plus_literal_field() {
		let mut op = SelectOp {
			items: vec![ObjectItem::SpreadAll, ObjectItem::KeyValue("extra".to_string(), crate::dsl::ast::Expr::Str("added".to_string()))],
			funcs: Rc::new(FunctionRegistry::with_builtins()),
			downstream: None,
		};
		op.push(serde_json::json!({"x": 1, "name": "test"}).into()).await.unwrap();
	}
}
