//! Recursive-descent parser over the token stream, with precedence
//! climbing for expressions. Operators low to high: `||`, `&&`,
//! `==/!=/</<=/>/>=`, `+/-`, `*//%`, unary `-/!`, member `.`/`[]`, call.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Keyword, Token, TokenKind};
use crate::err::Error;

pub fn parse_program(source: &str) -> Result<Vec<Statement>, Error> {
	let tokens = Lexer::new(source).tokenize()?;
	let mut parser = Parser {
		tokens,
		pos: 0,
	};
	parser.program()
}

pub fn parse_expr(source: &str) -> Result<Expr, Error> {
	let tokens = Lexer::new(source).tokenize()?;
	let mut parser = Parser {
		tokens,
		pos: 0,
	};
	let expr = parser.expr()?;
	parser.expect_eof()?;
	Ok(expr)
}

struct Parser {
	tokens: Vec<Token>,
	pos: usize,
}

impl Parser {
	fn peek(&self) -> &TokenKind {
		&self.tokens[self.pos].kind
	}

	fn advance(&mut self) -> TokenKind {
		let kind = self.tokens[self.pos].kind.clone();
		if self.pos + 1 < self.tokens.len() {
			self.pos += 1;
		}
		kind
	}

	fn at_eof(&self) -> bool {
		matches!(self.peek(), TokenKind::Eof)
	}

	fn expect_eof(&self) -> Result<(), Error> {
		if self.at_eof() {
			Ok(())
		} else {
			Err(Error::SyntaxError(format!("unexpected trailing input near {:?}", self.peek())))
		}
	}

	fn eat(&mut self, kind: &TokenKind) -> Result<(), Error> {
		if self.peek() == kind {
			self.advance();
			Ok(())
		} else {
			Err(Error::SyntaxError(format!("expected {kind:?}, found {:?}", self.peek())))
		}
	}

	fn eat_keyword(&mut self, kw: Keyword) -> Result<(), Error> {
		self.eat(&TokenKind::Keyword(kw))
	}

	fn at_keyword(&self, kw: Keyword) -> bool {
		matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
	}

	/// Consumes a bare name, accepting either a plain identifier or a
	/// reserved-spelling keyword token used outside a command position —
	/// this realizes the grammar's context-sensitive lexing without a
	/// separate lexer mode.
	fn ident(&mut self) -> Result<String, Error> {
		match self.advance() {
			TokenKind::Ident(s) => Ok(s),
			TokenKind::Keyword(kw) => Ok(keyword_spelling(kw).to_string()),
			other => Err(Error::SyntaxError(format!("expected an identifier, found {other:?}"))),
		}
	}

	fn dotted_path(&mut self) -> Result<String, Error> {
		let mut path = self.ident()?;
		while matches!(self.peek(), TokenKind::Dot) {
			self.advance();
			path.push('.');
			path.push_str(&self.ident()?);
		}
		Ok(path)
	}

	// ---- program / statements ----

	fn program(&mut self) -> Result<Vec<Statement>, Error> {
		let mut statements = Vec::new();
		loop {
			while matches!(self.peek(), TokenKind::Semi) {
				self.advance();
			}
			if self.at_eof() {
				break;
			}
			statements.push(self.statement()?);
			if matches!(self.peek(), TokenKind::Semi) {
				self.advance();
			} else if !self.at_eof() {
				return Err(Error::SyntaxError(format!("expected `;`, found {:?}", self.peek())));
			}
		}
		Ok(statements)
	}

	fn modifier(&mut self) -> Result<Modifier, Error> {
		if self.at_keyword(Keyword::Or) {
			self.advance();
			self.eat_keyword(Keyword::Replace)?;
			Ok(Modifier::OrReplace)
		} else if self.at_keyword(Keyword::If) {
			self.advance();
			self.eat_keyword(Keyword::Not)?;
			self.eat_keyword(Keyword::Exists)?;
			Ok(Modifier::IfNotExists)
		} else {
			Ok(Modifier::None)
		}
	}

	fn statement(&mut self) -> Result<Statement, Error> {
		match self.peek().clone() {
			TokenKind::Keyword(Keyword::Create) => self.create_statement(),
			TokenKind::Keyword(Keyword::Delete) => self.delete_statement(),
			TokenKind::Keyword(Keyword::Insert) => self.insert_statement(),
			TokenKind::Keyword(Keyword::Flush) => {
				self.advance();
				Ok(Statement::Flush(self.ident()?))
			}
			TokenKind::Keyword(Keyword::List) => self.list_statement(),
			TokenKind::Keyword(Keyword::Info) => {
				self.advance();
				let name = if self.at_eof() || matches!(self.peek(), TokenKind::Semi) {
					None
				} else {
					Some(self.ident()?)
				};
				Ok(Statement::Info(name))
			}
			TokenKind::Keyword(Keyword::Subscribe) => {
				self.advance();
				Ok(Statement::Subscribe(self.ident()?))
			}
			TokenKind::Keyword(Keyword::Unsubscribe) => {
				self.advance();
				Ok(Statement::Unsubscribe(self.expr()?))
			}
			_ => Ok(Statement::Pipeline(self.pipeline()?)),
		}
	}

	fn create_statement(&mut self) -> Result<Statement, Error> {
		self.advance();
		let modifier = self.modifier()?;
		match self.peek().clone() {
			TokenKind::Keyword(Keyword::Stream) => {
				self.advance();
				Ok(Statement::CreateStream {
					name: self.ident()?,
					modifier,
				})
			}
			TokenKind::Keyword(Keyword::Flow) => {
				self.advance();
				let name = self.ident()?;
				let ttl = if self.at_keyword(Keyword::Ttl) {
					self.advance();
					self.eat(&TokenKind::LParen)?;
					let e = self.expr()?;
					self.eat(&TokenKind::RParen)?;
					Some(e)
				} else {
					None
				};
				self.eat_keyword(Keyword::As)?;
				let pipeline = self.pipeline()?;
				Ok(Statement::CreateFlow {
					name,
					ttl,
					pipeline,
					modifier,
				})
			}
			TokenKind::Keyword(Keyword::Lookup) => {
				self.advance();
				let name = self.ident()?;
				self.eat(&TokenKind::Eq)?;
				let value = self.expr()?;
				Ok(Statement::CreateLookup {
					name,
					value,
					modifier,
				})
			}
			other => Err(Error::SyntaxError(format!("expected stream, flow or lookup after `create`, found {other:?}"))),
		}
	}

	fn delete_statement(&mut self) -> Result<Statement, Error> {
		self.advance();
		match self.advance() {
			TokenKind::Keyword(Keyword::Stream) => Ok(Statement::DeleteStream(self.ident()?)),
			TokenKind::Keyword(Keyword::Flow) => Ok(Statement::DeleteFlow(self.ident()?)),
			TokenKind::Keyword(Keyword::Lookup) => Ok(Statement::DeleteLookup(self.ident()?)),
			other => Err(Error::SyntaxError(format!("expected stream, flow or lookup after `delete`, found {other:?}"))),
		}
	}

	fn insert_statement(&mut self) -> Result<Statement, Error> {
		self.advance();
		self.eat_keyword(Keyword::Into)?;
		let stream = self.ident()?;
		let value = self.expr()?;
		Ok(Statement::Insert {
			stream,
			value,
		})
	}

	fn list_statement(&mut self) -> Result<Statement, Error> {
		self.advance();
		let kind = match self.peek().clone() {
			TokenKind::Keyword(Keyword::Streams) => {
				self.advance();
				ListKind::Streams
			}
			TokenKind::Keyword(Keyword::Flows) => {
				self.advance();
				ListKind::Flows
			}
			TokenKind::Keyword(Keyword::Lookups) => {
				self.advance();
				ListKind::Lookups
			}
			TokenKind::Keyword(Keyword::Subscriptions) => {
				self.advance();
				ListKind::Subscriptions
			}
			_ => ListKind::Streams,
		};
		Ok(Statement::List(kind))
	}

	// ---- pipeline ----

	fn pipeline(&mut self) -> Result<Pipeline, Error> {
		let source = self.ident()?;
		let mut ops = Vec::new();
		while matches!(self.peek(), TokenKind::Pipe) {
			self.advance();
			ops.push(self.operation()?);
		}
		Ok(Pipeline {
			source,
			ops,
		})
	}

	fn operation(&mut self) -> Result<Operation, Error> {
		match self.advance() {
			TokenKind::Keyword(Keyword::Where) => Ok(Operation::Where(self.expr()?)),
			TokenKind::Keyword(Keyword::Select) => Ok(Operation::Select(self.object_items()?)),
			TokenKind::Keyword(Keyword::Scan) => self.scan_operation(),
			TokenKind::Keyword(Keyword::Summarize) => self.summarize_operation(),
			TokenKind::Keyword(Keyword::InsertInto) => {
				self.eat(&TokenKind::LParen)?;
				let name = self.ident()?;
				self.eat(&TokenKind::RParen)?;
				Ok(Operation::InsertInto(name))
			}
			TokenKind::Keyword(Keyword::WriteToFile) => {
				self.eat(&TokenKind::LParen)?;
				let path = self.expr()?;
				let options = if matches!(self.peek(), TokenKind::Comma) {
					self.advance();
					Some(self.object_items()?)
				} else {
					None
				};
				self.eat(&TokenKind::RParen)?;
				Ok(Operation::WriteToFile {
					path,
					options,
				})
			}
			TokenKind::Keyword(Keyword::AssertOrSaveExpected) => {
				self.eat(&TokenKind::LParen)?;
				let path = self.expr()?;
				self.eat(&TokenKind::RParen)?;
				Ok(Operation::AssertOrSaveExpected(path))
			}
			TokenKind::Keyword(Keyword::Collect) => Ok(Operation::Collect),
			other => Err(Error::SyntaxError(format!("unrecognized pipeline operation {other:?}"))),
		}
	}

	fn scan_operation(&mut self) -> Result<Operation, Error> {
		self.eat(&TokenKind::LParen)?;
		let mut steps = Vec::new();
		loop {
			self.eat_keyword(Keyword::Step)?;
			let name = self.ident()?;
			self.eat(&TokenKind::Colon)?;
			let condition = self.expr()?;
			self.eat(&TokenKind::Arrow)?;
			let mut body = Vec::new();
			loop {
				body.push(self.scan_stmt()?);
				if matches!(self.peek(), TokenKind::Comma) {
					// A comma may separate statements within the same step's
					// body, or separate this step from the next; disambiguate
					// by looking ahead for `step`.
					if matches!(&self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Keyword(Keyword::Step))) {
						break;
					}
					self.advance();
				} else {
					break;
				}
			}
			steps.push(ScanStep {
				name,
				condition,
				body,
			});
			if matches!(self.peek(), TokenKind::Comma) {
				self.advance();
			} else {
				break;
			}
		}
		if matches!(self.peek(), TokenKind::Semi) {
			self.advance();
		}
		self.eat(&TokenKind::RParen)?;
		Ok(Operation::Scan(steps))
	}

	fn scan_stmt(&mut self) -> Result<ScanStmt, Error> {
		if let TokenKind::Ident(name) = self.peek().clone() {
			if name == "emit" {
				self.advance();
				self.eat(&TokenKind::LParen)?;
				let expr = self.expr()?;
				self.eat(&TokenKind::RParen)?;
				return Ok(ScanStmt::Emit(expr));
			}
		}
		let path = self.dotted_path()?;
		self.eat(&TokenKind::Eq)?;
		let value = self.expr()?;
		Ok(ScanStmt::Assign {
			path,
			value,
		})
	}

	fn summarize_operation(&mut self) -> Result<Operation, Error> {
		let agg = self.object_items()?;
		let by = if self.at_keyword(Keyword::By) {
			self.advance();
			Some(self.expr()?)
		} else {
			None
		};
		let window = if self.at_keyword(Keyword::Over) {
			self.advance();
			Some(self.expr()?)
		} else {
			None
		};
		let emit = if self.at_keyword(Keyword::Emit) {
			self.advance();
			Some(self.expr()?)
		} else {
			None
		};
		Ok(Operation::Summarize {
			agg,
			by,
			window,
			emit,
		})
	}

	fn object_items(&mut self) -> Result<Vec<ObjectItem>, Error> {
		self.eat(&TokenKind::LBrace)?;
		let mut items = Vec::new();
		while !matches!(self.peek(), TokenKind::RBrace) {
			items.push(self.object_item()?);
			if matches!(self.peek(), TokenKind::Comma) {
				self.advance();
			} else {
				break;
			}
		}
		self.eat(&TokenKind::RBrace)?;
		Ok(items)
	}

	fn object_item(&mut self) -> Result<ObjectItem, Error> {
		match self.peek().clone() {
			TokenKind::DotDotDot => {
				self.advance();
				if matches!(self.peek(), TokenKind::Star) {
					self.advance();
					Ok(ObjectItem::SpreadAll)
				} else {
					Ok(ObjectItem::SpreadExpr(self.expr()?))
				}
			}
			TokenKind::Minus => {
				self.advance();
				Ok(ObjectItem::Exclude(self.ident()?))
			}
			_ => {
				let name = self.ident()?;
				if matches!(self.peek(), TokenKind::Colon) {
					self.advance();
					Ok(ObjectItem::KeyValue(name, self.expr()?))
				} else {
					Ok(ObjectItem::Shorthand(name))
				}
			}
		}
	}

	// ---- expressions (precedence climbing) ----

	pub fn expr(&mut self) -> Result<Expr, Error> {
		self.or_expr()
	}

	fn or_expr(&mut self) -> Result<Expr, Error> {
		let mut lhs = self.and_expr()?;
		while matches!(self.peek(), TokenKind::OrOr) {
			self.advance();
			let rhs = self.and_expr()?;
			lhs = binary(BinaryOp::Or, lhs, rhs);
		}
		Ok(lhs)
	}

	fn and_expr(&mut self) -> Result<Expr, Error> {
		let mut lhs = self.cmp_expr()?;
		while matches!(self.peek(), TokenKind::AndAnd) {
			self.advance();
			let rhs = self.cmp_expr()?;
			lhs = binary(BinaryOp::And, lhs, rhs);
		}
		Ok(lhs)
	}

	fn cmp_expr(&mut self) -> Result<Expr, Error> {
		let mut lhs = self.add_expr()?;
		loop {
			let op = match self.peek() {
				TokenKind::EqEq => BinaryOp::Eq,
				TokenKind::NotEq => BinaryOp::Ne,
				TokenKind::Lt => BinaryOp::Lt,
				TokenKind::Le => BinaryOp::Le,
				TokenKind::Gt => BinaryOp::Gt,
				TokenKind::Ge => BinaryOp::Ge,
				_ => break,
			};
			self.advance();
			let rhs = self.add_expr()?;
			lhs = binary(op, lhs, rhs);
		}
		Ok(lhs)
	}

	fn add_expr(&mut self) -> Result<Expr, Error> {
		let mut lhs = self.mul_expr()?;
		loop {
			let op = match self.peek() {
				TokenKind::Plus => BinaryOp::Add,
				TokenKind::Minus => BinaryOp::Sub,
				_ => break,
			};
			self.advance();
			let rhs = self.mul_expr()?;
			lhs = binary(op, lhs, rhs);
		}
		Ok(lhs)
	}

	fn mul_expr(&mut self) -> Result<Expr, Error> {
		let mut lhs = self.unary_expr()?;
		loop {
			let op = match self.peek() {
				TokenKind::Star => BinaryOp::Mul,
				TokenKind::Slash => BinaryOp::Div,
				TokenKind::Percent => BinaryOp::Mod,
				_ => break,
			};
			self.advance();
			let rhs = self.unary_expr()?;
			lhs = binary(op, lhs, rhs);
		}
		Ok(lhs)
	}

	fn unary_expr(&mut self) -> Result<Expr, Error> {
		match self.peek() {
			TokenKind::Minus => {
				self.advance();
				Ok(Expr::Unary {
					op: UnaryOp::Neg,
					expr: Box::new(self.unary_expr()?),
				})
			}
			TokenKind::Bang => {
				self.advance();
				Ok(Expr::Unary {
					op: UnaryOp::Not,
					expr: Box::new(self.unary_expr()?),
				})
			}
			_ => self.postfix_expr(),
		}
	}

	fn postfix_expr(&mut self) -> Result<Expr, Error> {
		let mut expr = self.primary_expr()?;
		loop {
			match self.peek() {
				TokenKind::Dot => {
					self.advance();
					let field = self.ident()?;
					expr = match expr {
						Expr::Path(mut p) => {
							p.push('.');
							p.push_str(&field);
							Expr::Path(p)
						}
						other => Expr::Index {
							target: Box::new(other),
							index: Box::new(Expr::Str(field)),
						},
					};
				}
				TokenKind::LBracket => {
					self.advance();
					let index = self.expr()?;
					self.eat(&TokenKind::RBracket)?;
					expr = Expr::Index {
						target: Box::new(expr),
						index: Box::new(index),
					};
				}
				_ => break,
			}
		}
		Ok(expr)
	}

	fn primary_expr(&mut self) -> Result<Expr, Error> {
		match self.advance() {
			TokenKind::Keyword(Keyword::Null) => Ok(Expr::Null),
			TokenKind::Keyword(Keyword::True) => Ok(Expr::Bool(true)),
			TokenKind::Keyword(Keyword::False) => Ok(Expr::Bool(false)),
			TokenKind::Number(n) => Ok(Expr::Number(n)),
			TokenKind::Duration(d) => Ok(Expr::Duration(d)),
			TokenKind::Str(s) => Ok(Expr::Str(s)),
			TokenKind::LParen => {
				let inner = self.expr()?;
				self.eat(&TokenKind::RParen)?;
				Ok(inner)
			}
			TokenKind::LBracket => {
				let mut items = Vec::new();
				while !matches!(self.peek(), TokenKind::RBracket) {
					items.push(self.expr()?);
					if matches!(self.peek(), TokenKind::Comma) {
						self.advance();
					} else {
						break;
					}
				}
				self.eat(&TokenKind::RBracket)?;
				Ok(Expr::Array(items))
			}
			TokenKind::LBrace => {
				self.pos -= 1;
				Ok(Expr::Object(self.object_items()?))
			}
			TokenKind::Ident(name) => {
				if matches!(self.peek(), TokenKind::LParen) {
					self.advance();
					let mut args = Vec::new();
					while !matches!(self.peek(), TokenKind::RParen) {
						args.push(self.expr()?);
						if matches!(self.peek(), TokenKind::Comma) {
							self.advance();
						} else {
							break;
						}
					}
					self.eat(&TokenKind::RParen)?;
					Ok(Expr::Call {
						name,
						args,
					})
				} else {
					let mut path = name;
					while matches!(self.peek(), TokenKind::Dot) {
						self.advance();
						path.push('.');
						path.push_str(&self.ident()?);
					}
					Ok(Expr::Path(path))
				}
			}
			TokenKind::Keyword(kw) => Ok(Expr::Path(keyword_spelling(kw).to_string())),
			other => Err(Error::SyntaxError(format!("unexpected token {other:?} in expression"))),
		}
	}
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
	Expr::Binary {
		op,
		lhs: Box::new(lhs),
		rhs: Box::new(rhs),
	}
}

fn keyword_spelling(kw: Keyword) -> &'static str {
	use Keyword::*;
	match kw {
		Create => "create",
		Delete => "delete",
		Or => "or",
		Replace => "replace",
		If => "if",
		Not => "not",
		Exists => "exists",
		Stream => "stream",
		Flow => "flow",
		Lookup => "lookup",
		Ttl => "ttl",
		As => "as",
		Insert => "insert",
		Into => "into",
		Flush => "flush",
		List => "list",
		Streams => "streams",
		Flows => "flows",
		Lookups => "lookups",
		Subscriptions => "subscriptions",
		Info => "info",
		Subscribe => "subscribe",
		Unsubscribe => "unsubscribe",
		Where => "where",
		Select => "select",
		Scan => "scan",
		Step => "step",
		Summarize => "summarize",
		By => "by",
		Over => "over",
		Emit => "emit",
		InsertInto => "insert_into",
		WriteToFile => "write_to_file",
		AssertOrSaveExpected => "assert_or_save_expected",
		Collect => "collect",
		True => "true",
		False => "false",
		Null => "null",
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parses_summarize_without_window() {
		let stmts = parse_program(
			"create stream sales; create stream out; create flow f as sales | summarize { total_amount: sum(amount), count: count() } by product | insert_into(out)",
		)
		.unwrap();
		assert_eq!(stmts.len(), 3);
		match &stmts[2] {
			Statement::CreateFlow {
				pipeline,
				..
			} => {
				assert_eq!(pipeline.ops.len(), 2);
				assert!(matches!(pipeline.ops[0], Operation::Summarize { .. }));
			}
			other => panic!("expected a flow statement, got {other:?}"),
		}
	}

	#[test]
	fn parses_select_spread_and_literal() {
		let expr = match parse_program("input | select { ...*, extra: \"added\" } | insert_into(out)").unwrap().remove(0) {
			Statement::Pipeline(p) => p,
			other => panic!("expected a pipeline statement, got {other:?}"),
		};
		match &expr.ops[0] {
			Operation::Select(items) => {
				assert_eq!(items[0], ObjectItem::SpreadAll);
				assert_eq!(items[1], ObjectItem::KeyValue("extra".to_string(), Expr::Str("added".to_string())));
			}
			other => panic!("expected a select operation, got {other:?}"),
		}
	}

	#[test]
	fn parses_scan_step_with_assignment_and_emit() {
		let stmts = parse_program(
			"input | scan(step s1: true => s1.count = (s1.count || 0) + 1, emit({ ...s1, input: x });) | insert_into(out)",
		)
		.unwrap();
		let pipeline = match stmts.into_iter().next().unwrap() {
			Statement::Pipeline(p) => p,
			other => panic!("expected a pipeline statement, got {other:?}"),
		};
		match &pipeline.ops[0] {
			Operation::Scan(steps) => {
				assert_eq!(steps.len(), 1);
				assert_eq!(steps[0].body.len(), 2);
			}
			other => panic!("expected a scan operation, got {other:?}"),
		}
	}

	#[test]
	fn operator_precedence_matches_grammar() {
		let e = parse_expr("1 + 2 * 3 == 7 && true").unwrap();
		assert!(matches!(e, Expr::Binary { op: BinaryOp::And, .. }));
	}
}
