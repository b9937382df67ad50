//! The parsed representation of one DSL program: a list of statements.
//! Kept deliberately close to the grammar so the parser can be a direct
//! transliteration of it; [`crate::dsl::transpile`] is where AST shapes
//! become runnable plans.

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
	Null,
	Bool(bool),
	Number(f64),
	Duration(f64),
	Str(String),
	/// A bare identifier or dotted path (`x`, `x.y.z`), resolved against
	/// the current record at evaluation time.
	Path(String),
	Array(Vec<Expr>),
	Object(Vec<ObjectItem>),
	Unary {
		op: UnaryOp,
		expr: Box<Expr>,
	},
	Binary {
		op: BinaryOp,
		lhs: Box<Expr>,
		rhs: Box<Expr>,
	},
	/// A function call, `name(args...)`. Whether `name` names a scalar
	/// function or an aggregator is resolved at transpile time depending
	/// on context (a plain expression vs. a `summarize` aggregation item).
	Call {
		name: String,
		args: Vec<Expr>,
	},
	Index {
		target: Box<Expr>,
		index: Box<Expr>,
	},
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
	Neg,
	Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Mod,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	And,
	Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectItem {
	Shorthand(String),
	KeyValue(String, Expr),
	SpreadAll,
	SpreadExpr(Expr),
	Exclude(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScanStmt {
	Assign {
		path: String,
		value: Expr,
	},
	Emit(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScanStep {
	pub name: String,
	pub condition: Expr,
	pub body: Vec<ScanStmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
	Where(Expr),
	Select(Vec<ObjectItem>),
	Scan(Vec<ScanStep>),
	Summarize {
		agg: Vec<ObjectItem>,
		by: Option<Expr>,
		window: Option<Expr>,
		emit: Option<Expr>,
	},
	InsertInto(String),
	WriteToFile {
		path: Expr,
		options: Option<Vec<ObjectItem>>,
	},
	AssertOrSaveExpected(Expr),
	/// `collect` appears in the grammar's operation list with no defined
	/// semantics elsewhere in the spec; resolved as a terminal debug sink
	/// that republishes each record to `_log` as an `info` entry (see
	/// DESIGN.md).
	Collect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
	pub source: String,
	pub ops: Vec<Operation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modifier {
	None,
	OrReplace,
	IfNotExists,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ListKind {
	Streams,
	Flows,
	Lookups,
	Subscriptions,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
	CreateStream {
		name: String,
		modifier: Modifier,
	},
	DeleteStream(String),
	CreateFlow {
		name: String,
		ttl: Option<Expr>,
		pipeline: Pipeline,
		modifier: Modifier,
	},
	DeleteFlow(String),
	CreateLookup {
		name: String,
		value: Expr,
		modifier: Modifier,
	},
	DeleteLookup(String),
	Insert {
		stream: String,
		value: Expr,
	},
	Flush(String),
	List(ListKind),
	Info(Option<String>),
	Subscribe(String),
	Unsubscribe(Expr),
	Pipeline(Pipeline),
}
