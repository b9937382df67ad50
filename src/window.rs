//! Window function factories consumed by `summarize`: tumbling, hopping,
//! sliding, session and count windows. Each factory compiles to a
//! [`Window`] that, given one record, produces zero or more window
//! descriptors — the set of `(group, window)` pairs `summarize` folds
//! that record into.

use crate::dsl::ast::Expr;
use crate::dsl::eval::eval;
use crate::err::Error;
use crate::expr::EvalContext;
use crate::fnc::FunctionRegistry;
use crate::value::{Object, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowMode {
	Count,
	Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowType {
	Tumbling,
	Hopping,
	Sliding,
	Session,
	Count,
	/// The synthetic single window `summarize` folds every record into
	/// when no `over` clause is given.
	All,
}

/// One `(id, start, end, type, mode)` instance a record belongs to. `id`
/// doubles as the window-id key in `summarize`'s two-level map.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowDescriptor {
	pub id: String,
	pub start: f64,
	pub end: f64,
	pub kind: WindowType,
	pub mode: WindowMode,
}

impl WindowDescriptor {
	/// The one synthetic `(id: "__all__", start: 0, end: 0)` window
	/// `summarize` folds every record into when no `over` clause is given
	/// (spec: "null spec means one synthetic window `__all__`").
	pub fn synthetic_all() -> WindowDescriptor {
		WindowDescriptor {
			id: "__all__".to_string(),
			start: 0.0,
			end: 0.0,
			kind: WindowType::All,
			mode: WindowMode::Count,
		}
	}

	pub fn to_value(&self) -> Value {
		let mut obj = Object::new();
		obj.insert("id".to_string(), Value::Str(self.id.clone()));
		obj.insert("windowId".to_string(), Value::Str(self.id.clone()));
		obj.insert("start".to_string(), Value::Number(self.start));
		obj.insert("end".to_string(), Value::Number(self.end));
		obj.insert(
			"type".to_string(),
			Value::Str(
				match self.kind {
					WindowType::Tumbling => "tumbling",
					WindowType::Hopping => "hopping",
					WindowType::Sliding => "sliding",
					WindowType::Session => "session",
					WindowType::Count => "count",
					WindowType::All => "all",
				}
				.to_string(),
			),
		);
		obj.insert(
			"mode".to_string(),
			Value::Str(
				match self.mode {
					WindowMode::Count => "count",
					WindowMode::Value => "value",
				}
				.to_string(),
			),
		);
		Value::Object(obj)
	}
}

fn extract_value(record: &Value, value_expr: &Expr, funcs: &FunctionRegistry) -> Result<f64, Error> {
	let extra = Object::new();
	let ctx = EvalContext::new(record, &extra);
	let v = eval(value_expr, &ctx, funcs)?;
	v.as_f64().ok_or_else(|| Error::ExecutionFailed("window value expression did not produce a number".to_string()))
}

pub enum Window {
	Tumbling {
		size: f64,
		value_expr: Option<Expr>,
		count: u64,
	},
	Hopping {
		size: f64,
		hop: f64,
		value_expr: Option<Expr>,
		count: u64,
	},
	Sliding {
		size: f64,
		value_expr: Option<Expr>,
		count: u64,
	},
	Session {
		timeout: f64,
		value_expr: Expr,
		session_id: u64,
		last_value: Option<f64>,
		current_end: f64,
	},
	Count {
		size: u64,
		count: u64,
	},
}

impl Window {
	pub fn windows_for(&mut self, record: &Value, funcs: &FunctionRegistry) -> Result<Vec<WindowDescriptor>, Error> {
		match self {
			Window::Tumbling {
				size,
				value_expr,
				count,
			} => {
				let (p, mode) = match value_expr {
					Some(expr) => (extract_value(record, expr, funcs)?, WindowMode::Value),
					None => {
						let p = *count as f64;
						*count += 1;
						(p, WindowMode::Count)
					}
				};
				let idx = (p / *size).floor();
				let start = idx * *size;
				Ok(vec![WindowDescriptor {
					id: format!("tumbling:{idx}"),
					start,
					end: start + *size,
					kind: WindowType::Tumbling,
					mode,
				}])
			}
			Window::Hopping {
				size,
				hop,
				value_expr,
				count,
			} => {
				let (p, mode) = match value_expr {
					Some(expr) => (extract_value(record, expr, funcs)?, WindowMode::Value),
					None => {
						let p = *count as f64;
						*count += 1;
						(p, WindowMode::Count)
					}
				};
				let lo = ((p - *size) / *hop).floor() as i64 + 1;
				let hi = (p / *hop).floor() as i64;
				let mut out = Vec::new();
				let mut k = lo.max(0);
				while k <= hi {
					let start = k as f64 * *hop;
					out.push(WindowDescriptor {
						id: format!("hopping:{k}"),
						start,
						end: start + *size,
						kind: WindowType::Hopping,
						mode,
					});
					k += 1;
				}
				Ok(out)
			}
			Window::Sliding {
				size,
				value_expr,
				count,
			} => {
				let (p, mode) = match value_expr {
					Some(expr) => (extract_value(record, expr, funcs)?, WindowMode::Value),
					None => {
						let p = *count as f64;
						*count += 1;
						(p, WindowMode::Count)
					}
				};
				Ok(vec![WindowDescriptor {
					id: "sliding:current".to_string(),
					start: p - *size,
					end: p,
					kind: WindowType::Sliding,
					mode,
				}])
			}
			Window::Session {
				timeout,
				value_expr,
				session_id,
				last_value,
				current_end,
			} => {
				let v = extract_value(record, value_expr, funcs)?;
				let start_new = match *last_value {
					None => true,
					Some(last) => v - last > *timeout,
				};
				if start_new {
					*session_id += 1;
					*current_end = v + *timeout;
				}
				*last_value = Some(v);
				Ok(vec![WindowDescriptor {
					id: format!("session:{session_id}"),
					start: v,
					end: *current_end,
					kind: WindowType::Session,
					mode: WindowMode::Value,
				}])
			}
			Window::Count {
				size,
				count,
			} => {
				let idx = *count / *size;
				*count += 1;
				let start = (idx * *size) as f64;
				Ok(vec![WindowDescriptor {
					id: format!("count:{idx}"),
					start,
					end: start + *size as f64,
					kind: WindowType::Count,
					mode: WindowMode::Count,
				}])
			}
		}
	}
}

/// Evaluates a constructor argument that must be a compile-time constant
/// (a window's `size`/`hop`/`timeout`), against an empty record context —
/// these are literals or closed arithmetic over literals (`30s`, `pi()`),
/// never a per-record field reference.
fn const_arg(expr: &Expr, funcs: &FunctionRegistry) -> Result<f64, Error> {
	crate::dsl::eval::eval_const(expr, funcs)?.as_f64().ok_or_else(|| Error::InvalidQuery("window parameter did not evaluate to a number".to_string()))
}

/// Compiles the `over` clause's call expression (`tumbling_window(30s)`,
/// `session_window(10m, ts)`, ...) into a [`Window`]. The `_by` suffixed
/// variants are value-mode only, requiring their callback argument.
pub fn build(expr: &Expr, funcs: &FunctionRegistry) -> Result<Window, Error> {
	let Expr::Call {
		name,
		args,
	} = expr
	else {
		return Err(Error::InvalidQuery("expected a window function call in `over`".to_string()));
	};
	Ok(match name.as_str() {
		"tumbling_window" => Window::Tumbling {
			size: const_arg(&args[0], funcs)?,
			value_expr: args.get(1).cloned(),
			count: 0,
		},
		"tumbling_window_by" => Window::Tumbling {
			size: const_arg(&args[0], funcs)?,
			value_expr: Some(args.get(1).cloned().ok_or_else(|| Error::InvalidQuery("tumbling_window_by requires a value callback".to_string()))?),
			count: 0,
		},
		"hopping_window" => Window::Hopping {
			size: const_arg(&args[0], funcs)?,
			hop: const_arg(&args[1], funcs)?,
			value_expr: args.get(2).cloned(),
			count: 0,
		},
		"hopping_window_by" => Window::Hopping {
			size: const_arg(&args[0], funcs)?,
			hop: const_arg(&args[1], funcs)?,
			value_expr: Some(args.get(2).cloned().ok_or_else(|| Error::InvalidQuery("hopping_window_by requires a value callback".to_string()))?),
			count: 0,
		},
		"sliding_window" => Window::Sliding {
			size: const_arg(&args[0], funcs)?,
			value_expr: args.get(1).cloned(),
			count: 0,
		},
		"sliding_window_by" => Window::Sliding {
			size: const_arg(&args[0], funcs)?,
			value_expr: Some(args.get(1).cloned().ok_or_else(|| Error::InvalidQuery("sliding_window_by requires a value callback".to_string()))?),
			count: 0,
		},
		"session_window" => Window::Session {
			timeout: const_arg(&args[0], funcs)?,
			value_expr: args.get(1).cloned().ok_or_else(|| Error::InvalidQuery("session_window requires a value callback".to_string()))?,
			session_id: 0,
			last_value: None,
			current_end: 0.0,
		},
		"count_window" => Window::Count {
			size: const_arg(&args[0], funcs)? as u64,
			count: 0,
		},
		other => return Err(Error::InvalidQuery(format!("unknown window function `{other}`"))),
	})
}

#[cfg(test)]
mod test {
	use super::*;

	fn funcs() -> FunctionRegistry {
		FunctionRegistry::with_builtins()
	}

	#[test]
	fn build_compiles_tumbling_window_call() {
		let expr = crate::dsl::parser::parse_expr("tumbling_window(30)").unwrap();
		let mut w = build(&expr, &funcs()).unwrap();
		let d = w.windows_for(&serde_json::json!({}).into(), &funcs()).unwrap();
		assert_eq!(d[0].start, 0.0);
		assert_eq!(d[0].end, 30.0);
	}

	#[test]
	fn build_rejects_unknown_window_function() {
		let expr = crate::dsl::parser::parse_expr("nonsense(1)").unwrap();
		assert!(build(&expr, &funcs()).is_err());
	}

	#[test]
	fn tumbling_count_mode_buckets_every_n_records() {
		let mut w = Window::Tumbling {
			size: 2.0,
			value_expr: None,
			count: 0,
		};
		let f = funcs();
		let a = w.windows_for(&Value::Null, &f).unwrap();
		let b = w.windows_for(&Value::Null, &f).unwrap();
		let c = w.windows_for(&Value::Null, &f).unwrap();
		assert_eq!(a[0].id, b[0].id);
		assert_ne!(a[0].id, c[0].id);
	}

	#[test]
	fn session_window_does_not_extend_after_creation() {
		let mut w = Window::Session {
			timeout: 10.0,
			value_expr: Expr::Path("x".to_string()),
			session_id: 0,
			last_value: None,
			current_end: 0.0,
		};
		let f = funcs();
		let r1: Value = serde_json::json!({"x": 0.0}).into();
		let r2: Value = serde_json::json!({"x": 5.0}).into();
		let d1 = w.windows_for(&r1, &f).unwrap();
		let d2 = w.windows_for(&r2, &f).unwrap();
		assert_eq!(d1[0].id, d2[0].id);
		assert_eq!(d1[0].end, d2[0].end);
	}

	#[test]
	fn sliding_window_always_ends_at_current_position() {
		let mut w = Window::Sliding {
			size: 5.0,
			value_expr: None,
			count: 0,
		};
		let f = funcs();
		let d0 = w.windows_for(&Value::Null, &f).unwrap();
		let d1 = w.windows_for(&Value::Null, &f).unwrap();
		assert_eq!(d0[0].end, 0.0);
		assert_eq!(d1[0].end, 1.0);
	}
}
