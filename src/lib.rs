//! A streaming query engine: named record streams, a pipeline DSL
//! (`where` / `select` / `scan` / `summarize` / sinks) compiled to
//! single-threaded, non-blocking operator chains, and the flow lifecycle
//! that binds compiled pipelines to stream subscriptions.
//!
//! [`Engine`] is the crate's one entry point for a host: it owns the
//! [`stream::StreamManager`], the [`fnc::FunctionRegistry`] and
//! [`agg::AggregatorRegistry`], the [`lookup::LookupTable`], and the flow
//! table, and turns parsed DSL text into running pipelines via
//! [`dsl::transpile`].

#[macro_use]
extern crate tracing;

pub mod agg;
pub mod dsl;
pub mod duration;
pub mod emit;
pub mod engine;
pub mod err;
pub mod expr;
pub mod fnc;
pub mod lookup;
pub mod op;
pub mod pipeline;
pub mod stream;
pub mod value;
pub mod window;

pub use engine::{CommandResponse, Engine, ErrorInfo, FlowEvent};
pub use err::{Error, Result};
pub use value::Value;
