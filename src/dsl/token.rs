//! Token kinds produced by the lexer and consumed by the parser.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
	pub offset: u32,
	pub len: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
	pub kind: TokenKind,
	pub span: Span,
}

/// Keywords that are reserved only where the grammar actually expects a
/// command, per the grammar's context-sensitive lexing rule: outside those
/// positions the same spelling lexes as a plain identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
	Create,
	Delete,
	Or,
	Replace,
	If,
	Not,
	Exists,
	Stream,
	Flow,
	Lookup,
	Ttl,
	As,
	Insert,
	Into,
	Flush,
	List,
	Streams,
	Flows,
	Lookups,
	Subscriptions,
	Info,
	Subscribe,
	Unsubscribe,
	Where,
	Select,
	Scan,
	Step,
	Summarize,
	By,
	Over,
	Emit,
	InsertInto,
	WriteToFile,
	AssertOrSaveExpected,
	Collect,
	True,
	False,
	Null,
}

impl Keyword {
	pub fn from_ident(ident: &str) -> Option<Keyword> {
		use Keyword::*;
		Some(match ident.to_ascii_lowercase().as_str() {
			"create" => Create,
			"delete" => Delete,
			"or" => Or,
			"replace" => Replace,
			"if" => If,
			"not" => Not,
			"exists" => Exists,
			"stream" => Stream,
			"flow" => Flow,
			"lookup" => Lookup,
			"ttl" => Ttl,
			"as" => As,
			"insert" => Insert,
			"into" => Into,
			"flush" => Flush,
			"list" => List,
			"streams" => Streams,
			"flows" => Flows,
			"lookups" => Lookups,
			"subscriptions" => Subscriptions,
			"info" => Info,
			"subscribe" => Subscribe,
			"unsubscribe" => Unsubscribe,
			"where" => Where,
			"select" => Select,
			"scan" => Scan,
			"step" => Step,
			"summarize" => Summarize,
			"by" => By,
			"over" => Over,
			"emit" => Emit,
			"insert_into" => InsertInto,
			"write_to_file" => WriteToFile,
			"assert_or_save_expected" => AssertOrSaveExpected,
			"collect" => Collect,
			"true" => True,
			"false" => False,
			"null" => Null,
			_ => return None,
		})
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
	Keyword(Keyword),
	Ident(String),
	Number(f64),
	Duration(f64),
	Str(String),
	// punctuation
	Pipe,
	Semi,
	Comma,
	Colon,
	Dot,
	DotDotDot,
	Minus,
	Arrow,
	LBrace,
	RBrace,
	LParen,
	RParen,
	LBracket,
	RBracket,
	Eq,
	EqEq,
	NotEq,
	Lt,
	Le,
	Gt,
	Ge,
	Plus,
	Star,
	Slash,
	Percent,
	Bang,
	AndAnd,
	OrOr,
	Eof,
	Invalid(char),
}
