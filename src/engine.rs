//! The flow lifecycle / query engine: the top-level handle a host embeds.
//! Owns the stream manager, the two read-only registries, the mutable
//! lookup table, and the flow table; dispatches parsed DSL statements to
//! the control-plane operations of spec.md §4.17 and §6.3.
//!
//! A `Flow` does not literally own its compiled [`crate::pipeline::Pipeline`]
//! here — the pipeline lives inside the stream manager's subscriber list
//! for the flow's source stream, per the cyclic-reference design note in
//! spec.md §9 ("stream owns subscribers by id; flows hold stream names
//! ... and resolve via the stream manager"). A [`FlowEntry`] is the
//! lightweight handle: the subscriber id plus the bookkeeping (TTL, sink
//! names) the control plane reports back to callers.

use crate::agg::AggregatorRegistry;
use crate::dsl::ast::{ListKind, Modifier, Operation, Statement};
use crate::dsl::eval::eval_const;
use crate::dsl::parser::parse_program;
use crate::dsl::transpile::{compile_pipeline, CompileContext};
use crate::err::Error;
use crate::fnc::FunctionRegistry;
use crate::lookup::LookupTable;
use crate::stream::StreamManager;
use crate::value::{Object, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A named continuous query bound to a source stream. See the module
/// doc comment for why this does not hold the pipeline directly.
struct FlowEntry {
	source: String,
	sinks: Vec<String>,
	ttl_deadline: Option<Instant>,
	subscriber_id: u64,
}

/// Observable lifecycle events, for hosts wanting to react to flow
/// creation/deletion (spec.md §4.17: "a flow-event callback is invoked on
/// create/delete for observers").
#[derive(Clone, Debug, PartialEq)]
pub enum FlowEvent {
	Created(String),
	Deleted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
	pub code: String,
	pub message: String,
}

/// The control-plane response shape of spec.md §6.3.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
	pub success: bool,
	pub kind: Option<String>,
	pub message: String,
	pub result: Option<Value>,
	pub error: Option<ErrorInfo>,
}

impl CommandResponse {
	fn ok(kind: &str, message: impl Into<String>, result: Option<Value>) -> Self {
		CommandResponse {
			success: true,
			kind: Some(kind.to_string()),
			message: message.into(),
			result,
			error: None,
		}
	}

	fn from_error(e: Error) -> Self {
		CommandResponse {
			success: false,
			kind: None,
			message: e.to_string(),
			result: None,
			error: Some(ErrorInfo {
				code: e.code().to_string(),
				message: e.to_string(),
			}),
		}
	}
}

/// The engine instance a host owns: one stream manager, one set of
/// registries, one flow table. Nothing here is global or lazily
/// initialized (spec.md §9: "a per-engine owned `Registry` value").
pub struct Engine {
	pub manager: Rc<RefCell<StreamManager>>,
	funcs: Rc<FunctionRegistry>,
	aggs: Rc<AggregatorRegistry>,
	lookups: Rc<RefCell<LookupTable>>,
	flows: HashMap<String, FlowEntry>,
	listeners: Vec<Box<dyn FnMut(&FlowEvent)>>,
	/// Ad-hoc `subscribe` captures, keyed by subscriber id. The DSL has no
	/// sink syntax for attaching an external callback to a bare
	/// `subscribe`, so this buffers what was seen for `info`/host
	/// inspection rather than delivering it anywhere (see DESIGN.md).
	subscriptions: HashMap<u64, Rc<RefCell<Vec<Value>>>>,
}

impl Engine {
	pub fn new() -> Self {
		let manager = Rc::new(RefCell::new(StreamManager::new()));
		let lookups = Rc::new(RefCell::new(LookupTable::new()));
		let funcs = Rc::new(FunctionRegistry::with_lookups(lookups.clone()));
		let aggs = Rc::new(AggregatorRegistry::with_builtins());
		Self {
			manager,
			funcs,
			aggs,
			lookups,
			flows: HashMap::new(),
			listeners: Vec::new(),
			subscriptions: HashMap::new(),
		}
	}

	pub fn on_flow_event(&mut self, listener: Box<dyn FnMut(&FlowEvent)>) {
		self.listeners.push(listener);
	}

	fn notify(&mut self, event: FlowEvent) {
		for listener in self.listeners.iter_mut() {
			listener(&event);
		}
	}

	/// Drops every flow whose TTL deadline has passed. The engine has no
	/// background timer of its own (spec.md §5's cooperative single-
	/// threaded model); a host polls this — or simply calls `execute`
	/// periodically, which calls it internally — to apply expirations.
	pub fn expire_ttls(&mut self) {
		let now = Instant::now();
		let expired: Vec<String> = self
			.flows
			.iter()
			.filter_map(|(name, entry)| entry.ttl_deadline.filter(|deadline| *deadline <= now).map(|_| name.clone()))
			.collect();
		for name in expired {
			let _ = self.stop_flow(&name);
			self.notify(FlowEvent::Deleted(name));
		}
	}

	/// Parses and runs every statement in `text` in order, returning one
	/// response per statement. A parse failure short-circuits with a
	/// single `SYNTAX_ERROR` response; nothing in `text` is executed.
	pub async fn execute(&mut self, text: &str) -> Vec<CommandResponse> {
		self.expire_ttls();
		let statements = match parse_program(text) {
			Ok(s) => s,
			Err(e) => return vec![CommandResponse::from_error(e)],
		};
		let mut out = Vec::with_capacity(statements.len());
		for stmt in &statements {
			out.push(self.execute_statement(stmt).await);
		}
		out
	}

	pub async fn execute_statement(&mut self, stmt: &Statement) -> CommandResponse {
		match self.dispatch(stmt).await {
			Ok(response) => response,
			Err(e) => CommandResponse::from_error(e),
		}
	}

	async fn dispatch(&mut self, stmt: &Statement) -> Result<CommandResponse, Error> {
		match stmt {
			Statement::CreateStream {
				name,
				modifier,
			} => self.create_stream(name, *modifier),
			Statement::DeleteStream(name) => self.delete_stream(name),
			Statement::CreateFlow {
				name,
				ttl,
				pipeline,
				modifier,
			} => self.create_flow(Some(name.clone()), ttl.as_ref(), pipeline, *modifier),
			Statement::DeleteFlow(name) => self.delete_flow(name),
			Statement::CreateLookup {
				name,
				value,
				modifier,
			} => self.create_lookup(name, value, *modifier),
			Statement::DeleteLookup(name) => self.delete_lookup(name),
			Statement::Insert {
				stream,
				value,
			} => self.insert(stream, value).await,
			Statement::Flush(name) => self.flush(name).await,
			Statement::List(kind) => self.list(kind),
			Statement::Info(name) => self.info(name.as_deref()),
			Statement::Subscribe(name) => self.subscribe(name),
			Statement::Unsubscribe(expr) => self.unsubscribe(expr),
			Statement::Pipeline(pipeline) => self.create_flow(None, None, pipeline, Modifier::None),
		}
	}

	fn create_stream(&mut self, name: &str, modifier: Modifier) -> Result<CommandResponse, Error> {
		let exists = self.manager.borrow().stream_exists(name);
		match modifier {
			Modifier::IfNotExists if exists => return Ok(CommandResponse::ok("stream", format!("stream `{name}` already exists"), None)),
			Modifier::OrReplace if exists => {
				self.manager.borrow_mut().delete_stream(name)?;
			}
			_ => {}
		}
		self.manager.borrow_mut().create_stream(name)?;
		Ok(CommandResponse::ok("stream", format!("stream `{name}` created"), None))
	}

	fn delete_stream(&mut self, name: &str) -> Result<CommandResponse, Error> {
		self.manager.borrow_mut().delete_stream(name)?;
		let stale: Vec<String> = self.flows.iter().filter(|(_, e)| e.source == name).map(|(n, _)| n.clone()).collect();
		for flow_name in stale {
			self.flows.remove(&flow_name);
		}
		Ok(CommandResponse::ok("stream", format!("stream `{name}` deleted"), None))
	}

	fn create_flow(&mut self, name: Option<String>, ttl: Option<&crate::dsl::ast::Expr>, pipeline: &crate::dsl::ast::Pipeline, modifier: Modifier) -> Result<CommandResponse, Error> {
		let name = name.unwrap_or_else(|| format!("_anon_{}", uuid::Uuid::new_v4()));
		let exists = self.flows.contains_key(&name);
		match modifier {
			Modifier::IfNotExists if exists => return Ok(CommandResponse::ok("flow", format!("flow `{name}` already exists"), None)),
			Modifier::OrReplace if exists => {
				self.stop_flow(&name)?;
			}
			Modifier::None if exists => return Err(Error::FlowAlreadyExists(name)),
			_ => {}
		}

		let ctx = CompileContext {
			funcs: self.funcs.clone(),
			aggs: self.aggs.clone(),
			manager: Rc::downgrade(&self.manager),
		};
		let (source, compiled) = compile_pipeline(pipeline, &ctx)?;
		let sinks = pipeline
			.ops
			.iter()
			.filter_map(|op| match op {
				Operation::InsertInto(target) => Some(target.clone()),
				_ => None,
			})
			.collect();
		let ttl_deadline = ttl.map(|e| eval_const(e, &self.funcs)).transpose()?.and_then(|v| v.as_f64()).map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));

		let subscriber_id = self.manager.borrow_mut().subscribe_pipeline(&source, compiled)?;
		self.flows.insert(
			name.clone(),
			FlowEntry {
				source,
				sinks,
				ttl_deadline,
				subscriber_id,
			},
		);
		self.notify(FlowEvent::Created(name.clone()));
		Ok(CommandResponse::ok("flow", format!("flow `{name}` created"), Some(Value::Str(name))))
	}

	fn stop_flow(&mut self, name: &str) -> Result<(), Error> {
		let entry = self.flows.remove(name).ok_or_else(|| Error::FlowNotFound(name.to_string()))?;
		// unsubscribe() also cancels the pipeline.
		self.manager.borrow_mut().unsubscribe(entry.subscriber_id)
	}

	fn delete_flow(&mut self, name: &str) -> Result<CommandResponse, Error> {
		self.stop_flow(name)?;
		self.notify(FlowEvent::Deleted(name.to_string()));
		Ok(CommandResponse::ok("flow", format!("flow `{name}` deleted"), None))
	}

	fn create_lookup(&mut self, name: &str, value: &crate::dsl::ast::Expr, modifier: Modifier) -> Result<CommandResponse, Error> {
		let exists = self.lookups.borrow().get(name).is_some();
		if matches!(modifier, Modifier::IfNotExists) && exists {
			return Ok(CommandResponse::ok("lookup", format!("lookup `{name}` already exists"), None));
		}
		let value = eval_const(value, &self.funcs)?;
		self.lookups.borrow_mut().create(name, value, matches!(modifier, Modifier::OrReplace))?;
		Ok(CommandResponse::ok("lookup", format!("lookup `{name}` created"), None))
	}

	fn delete_lookup(&mut self, name: &str) -> Result<CommandResponse, Error> {
		self.lookups.borrow_mut().delete(name)?;
		Ok(CommandResponse::ok("lookup", format!("lookup `{name}` deleted"), None))
	}

	async fn insert(&mut self, stream: &str, value: &crate::dsl::ast::Expr) -> Result<CommandResponse, Error> {
		let value = eval_const(value, &self.funcs)?;
		StreamManager::insert(&self.manager, stream, value).await?;
		Ok(CommandResponse::ok("insert", format!("inserted into `{stream}`"), None))
	}

	async fn flush(&mut self, stream: &str) -> Result<CommandResponse, Error> {
		StreamManager::flush_stream(&self.manager, stream).await?;
		Ok(CommandResponse::ok("flush", format!("flushed `{stream}`"), None))
	}

	fn list(&self, kind: &ListKind) -> Result<CommandResponse, Error> {
		let result = match kind {
			ListKind::Streams => Value::Array(self.manager.borrow().stream_names().into_iter().map(Value::Str).collect()),
			ListKind::Flows => Value::Array(self.flows.keys().cloned().map(Value::Str).collect()),
			ListKind::Lookups => Value::Array(self.lookups.borrow().names().into_iter().map(Value::Str).collect()),
			ListKind::Subscriptions => {
				let manager = self.manager.borrow();
				Value::Array(
					manager
						.stream_names()
						.into_iter()
						.map(|name| {
							let mut obj = Object::new();
							let count = manager.subscriber_count(&name).unwrap_or(0);
							obj.insert("stream".to_string(), Value::Str(name));
							obj.insert("subscribers".to_string(), Value::Number(count as f64));
							Value::Object(obj)
						})
						.collect(),
				)
			}
		};
		Ok(CommandResponse::ok("list", "ok".to_string(), Some(result)))
	}

	fn info(&self, name: Option<&str>) -> Result<CommandResponse, Error> {
		let manager = self.manager.borrow();
		match name {
			None => {
				let mut obj = Object::new();
				obj.insert("streams".to_string(), Value::Number(manager.stream_names().len() as f64));
				obj.insert("flows".to_string(), Value::Number(self.flows.len() as f64));
				obj.insert("lookups".to_string(), Value::Number(self.lookups.borrow().names().len() as f64));
				Ok(CommandResponse::ok("info", "ok".to_string(), Some(Value::Object(obj))))
			}
			Some(name) => {
				if let Some(entry) = self.flows.get(name) {
					let mut obj = Object::new();
					obj.insert("name".to_string(), Value::Str(name.to_string()));
					obj.insert("source".to_string(), Value::Str(entry.source.clone()));
					obj.insert("sinks".to_string(), Value::Array(entry.sinks.iter().cloned().map(Value::Str).collect()));
					obj.insert("hasTtl".to_string(), Value::Bool(entry.ttl_deadline.is_some()));
					return Ok(CommandResponse::ok("info", "ok".to_string(), Some(Value::Object(obj))));
				}
				if manager.stream_exists(name) {
					let mut obj = Object::new();
					obj.insert("name".to_string(), Value::Str(name.to_string()));
					obj.insert("subscribers".to_string(), Value::Number(manager.subscriber_count(name).unwrap_or(0) as f64));
					return Ok(CommandResponse::ok("info", "ok".to_string(), Some(Value::Object(obj))));
				}
				Err(Error::StreamNotFound(name.to_string()))
			}
		}
	}

	/// Attaches an ad-hoc subscriber to `name` that buffers every record it
	/// sees. The DSL has no sink syntax for wiring a bare `subscribe` to an
	/// external transport (spec.md §1 scopes that out), so this is a
	/// stand-in a host can poll via `info` — see DESIGN.md.
	fn subscribe(&mut self, name: &str) -> Result<CommandResponse, Error> {
		let buffer = Rc::new(RefCell::new(Vec::new()));
		let sink = buffer.clone();
		let id = self.manager.borrow_mut().subscribe_callback(
			name,
			Box::new(move |record: &Value| {
				sink.borrow_mut().push(record.clone());
			}),
		)?;
		self.subscriptions.insert(id, buffer);
		Ok(CommandResponse::ok("subscribe", format!("subscribed to `{name}`"), Some(Value::Number(id as f64))))
	}

	fn unsubscribe(&mut self, expr: &crate::dsl::ast::Expr) -> Result<CommandResponse, Error> {
		let id = eval_const(expr, &self.funcs)?.as_f64().ok_or_else(|| Error::InvalidQuery("unsubscribe expects a numeric subscription id".to_string()))?;
		let id = id as u64;
		self.manager.borrow_mut().unsubscribe(id)?;
		self.subscriptions.remove(&id);
		Ok(CommandResponse::ok("unsubscribe", "unsubscribed".to_string(), None))
	}

	/// Drains and returns everything buffered by a `subscribe` capture,
	/// for a host to poll without needing the real transport.
	pub fn drain_subscription(&self, id: u64) -> Option<Vec<Value>> {
		self.subscriptions.get(&id).map(|buf| std::mem::take(&mut *buf.borrow_mut()))
	}
}

impl Default for Engine {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[tokio::test]
	async fn create_stream_then_duplicate_is_an_error() {
		let mut engine = Engine::new();
		let r1 = engine.execute("create stream sales;").await;
		assert!(r1[0].success);
		let r2 = engine.execute("create stream sales;").await;
		assert!(!r2[0].success);
		assert_eq!(r2[0].error.as_ref().unwrap().code, "STREAM_ALREADY_EXISTS");
	}

	#[tokio::test]
	async fn create_or_replace_stream_does_not_error_on_existing() {
		let mut engine = Engine::new();
		engine.execute("create stream sales;").await;
		let r = engine.execute("create or replace stream sales;").await;
		assert!(r[0].success);
	}

	#[tokio::test]
	async fn flow_end_to_end_summarize_by_product() {
		let mut engine = Engine::new();
		engine.execute("create stream sales; create stream out;").await;
		let create = engine
			.execute(r#"create flow f as sales | summarize { total_amount: sum(amount), count: count() } by product | insert_into(out);"#)
			.await;
		assert!(create[0].success, "{:?}", create[0]);

		for (product, amount) in [("laptop", 1200.0), ("laptop", 1100.0), ("mouse", 25.0), ("mouse", 30.0)] {
			engine.execute(&format!(r#"insert into sales {{product: "{product}", amount: {amount}}};"#)).await;
		}
		let flushed = engine.execute("flush sales;").await;
		assert!(flushed[0].success);
	}

	#[tokio::test]
	async fn delete_flow_then_missing_lookup_reports_errors() {
		let mut engine = Engine::new();
		let r = engine.execute("delete flow nope;").await;
		assert_eq!(r[0].error.as_ref().unwrap().code, "FLOW_NOT_FOUND");
		let r = engine.execute("delete lookup nope;").await;
		assert_eq!(r[0].error.as_ref().unwrap().code, "LOOKUP_NOT_FOUND");
	}

	#[tokio::test]
	async fn create_lookup_then_list_lookups() {
		let mut engine = Engine::new();
		engine.execute("create lookup limit = 10;").await;
		let r = engine.execute("list lookups;").await;
		assert_eq!(r[0].result, Some(Value::Array(vec![Value::Str("limit".to_string())])));
	}

	#[tokio::test]
	async fn flow_with_ttl_expires_and_is_listed_gone() {
		let mut engine = Engine::new();
		engine.execute("create stream sales;").await;
		engine.execute("create flow f ttl(0s) as sales | where true;").await;
		std::thread::sleep(std::time::Duration::from_millis(5));
		let r = engine.execute("list flows;").await;
		assert_eq!(r[0].result, Some(Value::Array(vec![])));
	}
}
