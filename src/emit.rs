//! Emit policies consumed by `summarize`: decide, per `(group, window)`
//! materialization, whether the current record triggers an emission.
//! `force_emit` is what `flush` consults instead, unconditionally true for
//! exactly one draining pass per live context.

use crate::dsl::ast::Expr;
use crate::dsl::eval::eval;
use crate::err::Error;
use crate::expr::EvalContext;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};
use std::time::Instant;

/// `emit_every` without an explicit value expression falls back to this
/// heuristic: intervals under 100 are almost always meant as a record
/// count, at or above 100 they read more naturally as milliseconds.
const WALL_CLOCK_THRESHOLD: f64 = 100.0;

pub enum Emit {
	EveryCount {
		interval: u64,
		count: u64,
	},
	EveryWallClock {
		interval_ms: f64,
		last: Option<Instant>,
		seen_any: bool,
	},
	EveryValue {
		interval: f64,
		value_expr: Expr,
		last_emit_value: Option<f64>,
	},
	When {
		predicate: Expr,
	},
	OnChange {
		value_expr: Expr,
		last_value: Option<Value>,
		seen_any: bool,
	},
	OnGroupChange {
		last_group: Option<Value>,
		seen_any: bool,
	},
	OnUpdate,
	/// No `emit` clause was given: never emit mid-stream, only on `flush`'s
	/// unconditional draining pass.
	OnFlush,
}

impl Emit {
	pub fn every(interval: f64, value_expr: Option<Expr>) -> Emit {
		match value_expr {
			Some(expr) => Emit::EveryValue {
				interval,
				value_expr: expr,
				last_emit_value: None,
			},
			None if interval < WALL_CLOCK_THRESHOLD => Emit::EveryCount {
				interval: interval.max(1.0) as u64,
				count: 0,
			},
			None => Emit::EveryWallClock {
				interval_ms: interval,
				last: None,
				seen_any: false,
			},
		}
	}

	pub fn should_emit(
		&mut self,
		item: &Value,
		group_key: Option<&Value>,
		changed: bool,
		funcs: &FunctionRegistry,
	) -> Result<bool, Error> {
		Ok(match self {
			Emit::EveryCount {
				interval,
				count,
			} => {
				let emit = *count % *interval == 0;
				*count += 1;
				emit
			}
			Emit::EveryWallClock {
				interval_ms,
				last,
				seen_any,
			} => {
				if !*seen_any {
					*seen_any = true;
					*last = Some(Instant::now());
					true
				} else {
					let elapsed = last.map(|i| i.elapsed().as_secs_f64() * 1000.0).unwrap_or(f64::INFINITY);
					if elapsed >= *interval_ms {
						*last = Some(Instant::now());
						true
					} else {
						false
					}
				}
			}
			Emit::EveryValue {
				interval,
				value_expr,
				last_emit_value,
			} => {
				let extra = Object::new();
				let ctx = EvalContext::new(item, &extra);
				let current = eval(value_expr, &ctx, funcs)?
					.as_f64()
					.ok_or_else(|| Error::ExecutionFailed("emit_every value expression did not produce a number".to_string()))?;
				match *last_emit_value {
					None => {
						*last_emit_value = Some(current);
						true
					}
					Some(last) if current - last >= *interval => {
						*last_emit_value = Some(current);
						true
					}
					_ => false,
				}
			}
			Emit::When {
				predicate,
			} => {
				let extra = Object::new();
				let ctx = EvalContext::new(item, &extra);
				eval(predicate, &ctx, funcs)?.is_truthy()
			}
			Emit::OnChange {
				value_expr,
				last_value,
				seen_any,
			} => {
				let extra = Object::new();
				let ctx = EvalContext::new(item, &extra);
				let current = eval(value_expr, &ctx, funcs)?;
				let changed = !*seen_any || last_value.as_ref() != Some(&current);
				*seen_any = true;
				*last_value = Some(current);
				changed
			}
			Emit::OnGroupChange {
				last_group,
				seen_any,
			} => {
				let current = group_key.cloned().unwrap_or(Value::Null);
				let changed = !*seen_any || last_group.as_ref() != Some(&current);
				*seen_any = true;
				*last_group = Some(current);
				changed
			}
			Emit::OnUpdate => changed,
			Emit::OnFlush => false,
		})
	}

	pub fn force_emit(&mut self) -> bool {
		true
	}
}

/// Compiles the `emit` clause's call expression (`emit_every(100)`,
/// `emit_on_change(status)`, ...) into an [`Emit`] policy.
pub fn build(expr: &Expr, funcs: &FunctionRegistry) -> Result<Emit, Error> {
	let Expr::Call {
		name,
		args,
	} = expr
	else {
		return Err(Error::InvalidQuery("expected an emit function call in `emit`".to_string()));
	};
	Ok(match name.as_str() {
		"emit_every" => {
			let interval = crate::dsl::eval::eval_const(&args[0], funcs)?.as_f64().ok_or_else(|| Error::InvalidQuery("emit_every interval must be a number".to_string()))?;
			Emit::every(interval, args.get(1).cloned())
		}
		"emit_when" => Emit::When {
			predicate: args.first().cloned().ok_or_else(|| Error::InvalidQuery("emit_when requires a predicate".to_string()))?,
		},
		"emit_on_change" => Emit::OnChange {
			value_expr: args.first().cloned().ok_or_else(|| Error::InvalidQuery("emit_on_change requires a value expression".to_string()))?,
			last_value: None,
			seen_any: false,
		},
		"emit_on_group_change" => Emit::OnGroupChange {
			last_group: None,
			seen_any: false,
		},
		"emit_on_update" => Emit::OnUpdate,
		other => return Err(Error::InvalidQuery(format!("unknown emit function `{other}`"))),
	})
}

#[cfg(test)]
mod test {
	use super::*;

	fn funcs() -> FunctionRegistry {
		FunctionRegistry::with_builtins()
	}

	#[test]
	fn build_compiles_emit_every_call() {
		let expr = crate::dsl::parser::parse_expr("emit_every(3)").unwrap();
		let mut e = build(&expr, &funcs()).unwrap();
		let results: Vec<bool> = (0..4).map(|_| e.should_emit(&Value::Null, None, false, &funcs()).unwrap()).collect();
		assert_eq!(results, vec![true, false, false, true]);
	}

	#[test]
	fn build_rejects_unknown_emit_function() {
		let expr = crate::dsl::parser::parse_expr("nonsense()").unwrap();
		assert!(build(&expr, &funcs()).is_err());
	}

	#[test]
	fn every_count_emits_on_first_and_every_nth() {
		let mut e = Emit::every(3.0, None);
		let f = funcs();
		let results: Vec<bool> = (0..7).map(|_| e.should_emit(&Value::Null, None, false, &f).unwrap()).collect();
		assert_eq!(results, vec![true, false, false, true, false, false, true]);
	}

	#[test]
	fn on_update_mirrors_changed_flag() {
		let mut e = Emit::OnUpdate;
		let f = funcs();
		assert!(!e.should_emit(&Value::Null, None, false, &f).unwrap());
		assert!(e.should_emit(&Value::Null, None, true, &f).unwrap());
	}

	#[test]
	fn on_group_change_fires_on_first_observation() {
		let mut e = Emit::OnGroupChange {
			last_group: None,
			seen_any: false,
		};
		let f = funcs();
		assert!(e.should_emit(&Value::Null, Some(&Value::Str("a".into())), false, &f).unwrap());
		assert!(!e.should_emit(&Value::Null, Some(&Value::Str("a".into())), false, &f).unwrap());
		assert!(e.should_emit(&Value::Null, Some(&Value::Str("b".into())), false, &f).unwrap());
	}
}
