//! Crate-wide error type.
//!
//! Every variant carries the `code()` used in the control-plane response
//! shape. Control-plane entry points convert `Err(Error)` into
//! `CommandResponse { success: false, error: Some(...), .. }` at the
//! boundary (see [`crate::engine`]); data-plane execution errors are logged
//! to the `_log` stream instead of being propagated (see
//! [`crate::stream::StreamManager`]).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
	#[error("stream not found: {0}")]
	StreamNotFound(String),

	#[error("stream already exists: {0}")]
	StreamAlreadyExists(String),

	#[error("flow not found: {0}")]
	FlowNotFound(String),

	#[error("flow already exists: {0}")]
	FlowAlreadyExists(String),

	#[error("syntax error: {0}")]
	SyntaxError(String),

	#[error("invalid query: {0}")]
	InvalidQuery(String),

	#[error("command failed: {0}")]
	CommandFailed(String),

	#[error("execution failed: {0}")]
	ExecutionFailed(String),

	#[error("function not found: {0}")]
	FunctionNotFound(String),

	#[error("function execution error in {name}: {message}")]
	FunctionExecutionError {
		name: String,
		message: String,
	},

	#[error("lookup not found: {0}")]
	LookupNotFound(String),

	#[error("lookup name conflict: {0}")]
	LookupNameConflict(String),

	#[error("lookup value error: {0}")]
	LookupValueError(String),
}

impl Error {
	/// The fixed, stable error code for this variant.
	pub fn code(&self) -> &'static str {
		match self {
			Error::StreamNotFound(_) => "STREAM_NOT_FOUND",
			Error::StreamAlreadyExists(_) => "STREAM_ALREADY_EXISTS",
			Error::FlowNotFound(_) => "FLOW_NOT_FOUND",
			Error::FlowAlreadyExists(_) => "FLOW_ALREADY_EXISTS",
			Error::SyntaxError(_) => "SYNTAX_ERROR",
			Error::InvalidQuery(_) => "INVALID_QUERY",
			Error::CommandFailed(_) => "COMMAND_FAILED",
			Error::ExecutionFailed(_) => "EXECUTION_FAILED",
			Error::FunctionNotFound(_) => "FUNCTION_NOT_FOUND",
			Error::FunctionExecutionError {
				..
			} => "FUNCTION_EXECUTION_ERROR",
			Error::LookupNotFound(_) => "LOOKUP_NOT_FOUND",
			Error::LookupNameConflict(_) => "LOOKUP_NAME_CONFLICT",
			Error::LookupValueError(_) => "LOOKUP_VALUE_ERROR",
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
