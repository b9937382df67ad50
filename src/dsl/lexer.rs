//! A hand-written, single-pass lexer over `&str` source. No
//! parser-generator dependency: the grammar is small enough that a
//! straightforward character scan is clearer than a generated table.

use super::token::{Keyword, Span, Token, TokenKind};
use crate::duration::parse_duration;
use crate::err::Error;

pub struct Lexer<'a> {
	source: &'a str,
	chars: std::str::CharIndices<'a>,
	peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
	pub fn new(source: &'a str) -> Self {
		let mut chars = source.char_indices();
		let peeked = chars.next();
		Lexer {
			source,
			chars,
			peeked,
		}
	}

	fn bump(&mut self) -> Option<(usize, char)> {
		let cur = self.peeked;
		self.peeked = self.chars.next();
		cur
	}

	fn peek_char(&self) -> Option<char> {
		self.peeked.map(|(_, c)| c)
	}

	fn skip_whitespace(&mut self) {
		while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
			self.bump();
		}
	}

	/// Tokenizes the whole source up-front; the parser then walks the
	/// resulting slice with a cursor. Simpler than lazy re-entrant lexing
	/// and the inputs here (DSL statements) are never large enough for
	/// streaming tokenization to matter.
	pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
		let mut tokens = Vec::new();
		loop {
			self.skip_whitespace();
			let Some((start, c)) = self.peek_char().map(|c| (self.current_offset(), c)) else {
				tokens.push(Token {
					kind: TokenKind::Eof,
					span: Span {
						offset: self.source.len() as u32,
						len: 0,
					},
				});
				break;
			};
			let kind = self.lex_one(c)?;
			let end = self.current_offset();
			tokens.push(Token {
				kind,
				span: Span {
					offset: start as u32,
					len: (end - start) as u32,
				},
			});
		}
		Ok(tokens)
	}

	fn current_offset(&self) -> usize {
		self.peeked.map(|(i, _)| i).unwrap_or(self.source.len())
	}

	fn lex_one(&mut self, c: char) -> Result<TokenKind, Error> {
		if c.is_ascii_digit() {
			return self.lex_number();
		}
		if c == '_' || c.is_alphabetic() {
			return Ok(self.lex_ident());
		}
		if c == '"' || c == '\'' {
			return self.lex_string(c);
		}
		self.bump();
		Ok(match c {
			'|' => TokenKind::Pipe,
			';' => TokenKind::Semi,
			',' => TokenKind::Comma,
			':' => TokenKind::Colon,
			'.' => {
				if self.peek_char() == Some('.') {
					self.bump();
					if self.peek_char() == Some('.') {
						self.bump();
						TokenKind::DotDotDot
					} else {
						return Err(Error::SyntaxError("expected `...`".to_string()));
					}
				} else {
					TokenKind::Dot
				}
			}
			'-' => TokenKind::Minus,
			'{' => TokenKind::LBrace,
			'}' => TokenKind::RBrace,
			'(' => TokenKind::LParen,
			')' => TokenKind::RParen,
			'[' => TokenKind::LBracket,
			']' => TokenKind::RBracket,
			'+' => TokenKind::Plus,
			'*' => TokenKind::Star,
			'/' => TokenKind::Slash,
			'%' => TokenKind::Percent,
			'=' => {
				if self.peek_char() == Some('=') {
					self.bump();
					TokenKind::EqEq
				} else if self.peek_char() == Some('>') {
					self.bump();
					TokenKind::Arrow
				} else {
					TokenKind::Eq
				}
			}
			'!' => {
				if self.peek_char() == Some('=') {
					self.bump();
					TokenKind::NotEq
				} else {
					TokenKind::Bang
				}
			}
			'<' => {
				if self.peek_char() == Some('=') {
					self.bump();
					TokenKind::Le
				} else {
					TokenKind::Lt
				}
			}
			'>' => {
				if self.peek_char() == Some('=') {
					self.bump();
					TokenKind::Ge
				} else {
					TokenKind::Gt
				}
			}
			'&' if self.peek_char() == Some('&') => {
				self.bump();
				TokenKind::AndAnd
			}
			'|' if self.peek_char() == Some('|') => {
				self.bump();
				TokenKind::OrOr
			}
			other => TokenKind::Invalid(other),
		})
	}

	fn lex_ident(&mut self) -> TokenKind {
		let mut scratch = String::new();
		while matches!(self.peek_char(), Some(c) if c == '_' || c.is_alphanumeric()) {
			scratch.push(self.bump().unwrap().1);
		}
		match Keyword::from_ident(&scratch) {
			Some(kw) => TokenKind::Keyword(kw),
			None => TokenKind::Ident(scratch),
		}
	}

	fn lex_number(&mut self) -> Result<TokenKind, Error> {
		let mut scratch = String::new();
		while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
			scratch.push(self.bump().unwrap().1);
		}
		if self.peek_char() == Some('.') {
			// Only consume as a decimal point if followed by another digit;
			// otherwise `.` belongs to member access on a bare number, which
			// the grammar never allows anyway but we shouldn't eat the dot.
			let mut lookahead = self.chars.clone();
			if matches!(lookahead.next(), Some((_, d)) if d.is_ascii_digit()) {
				scratch.push(self.bump().unwrap().1);
				while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
					scratch.push(self.bump().unwrap().1);
				}
			}
		}
		// A duration literal is the same digit run immediately followed by
		// unit letters with no intervening whitespace.
		let mut unit_scratch = String::new();
		while matches!(self.peek_char(), Some(c) if c.is_alphabetic() || c == 'μ') {
			unit_scratch.push(self.bump().unwrap().1);
		}
		if unit_scratch.is_empty() {
			scratch.parse::<f64>().map(TokenKind::Number).map_err(|_| Error::SyntaxError(format!("invalid number literal `{scratch}`")))
		} else {
			let full = format!("{scratch}{unit_scratch}");
			parse_duration(&full).map(TokenKind::Duration)
		}
	}

	fn lex_string(&mut self, quote: char) -> Result<TokenKind, Error> {
		self.bump();
		let mut scratch = String::new();
		loop {
			match self.bump() {
				None => return Err(Error::SyntaxError("unterminated string literal".to_string())),
				Some((_, c)) if c == quote => break,
				Some((_, '\\')) => match self.bump() {
					Some((_, 'n')) => scratch.push('\n'),
					Some((_, 't')) => scratch.push('\t'),
					Some((_, 'r')) => scratch.push('\r'),
					Some((_, c)) if c == quote || c == '\\' => scratch.push(c),
					Some((_, c)) => scratch.push(c),
					None => return Err(Error::SyntaxError("unterminated escape sequence".to_string())),
				},
				Some((_, c)) => scratch.push(c),
			}
		}
		Ok(TokenKind::Str(scratch))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn kinds(src: &str) -> Vec<TokenKind> {
		Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
	}

	#[test]
	fn lexes_pipeline_skeleton() {
		let k = kinds("sales | where x > 1 | insert_into(out)");
		assert!(matches!(k[0], TokenKind::Ident(ref s) if s == "sales"));
		assert_eq!(k[1], TokenKind::Pipe);
		assert_eq!(k[2], TokenKind::Keyword(Keyword::Where));
	}

	#[test]
	fn lexes_duration_combined_units() {
		let k = kinds("1w3d8h");
		assert_eq!(k[0], TokenKind::Duration(parse_duration("1w3d8h").unwrap()));
	}

	#[test]
	fn lexes_spread_and_exclusion() {
		let k = kinds("{ ...*, -name }");
		assert_eq!(k[1], TokenKind::DotDotDot);
		assert_eq!(k[2], TokenKind::Star);
		assert_eq!(k[4], TokenKind::Minus);
	}

	#[test]
	fn distinguishes_double_and_single_quoted_strings() {
		let k = kinds(r#" "a" 'b' "#);
		assert_eq!(k[0], TokenKind::Str("a".to_string()));
		assert_eq!(k[1], TokenKind::Str("b".to_string()));
	}
}
