//! The tokenizer. Turns text into a flat list of [`Token`]s and never fails.

use std::sync::OnceLock;

use regex::Regex;
use text_size::{TextRange, TextSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
	/// `{`
	BraceL,
	/// `}`
	BraceR,
	Op(Operator),
	/// A bare word: an identifier, a scope chain, a date, a `@constant`...
	Word,
	/// A word which is a (possibly negative, possibly decimal) number.
	Number,
	/// A double-quoted string, quotes included in the token's text.
	/// If unterminated, the token ends at the end of its line.
	Str { terminated: bool },
	/// From `#` to the end of the line.
	LineComment,
	/// `/* ... */`. If unterminated, the token ends at the end of the input.
	BlockComment { terminated: bool },
	/// A single character which can not start any other token.
	Unknown,
}

impl TokenKind {
	#[must_use]
	pub fn is_trivia(self) -> bool {
		matches!(self, Self::LineComment | Self::BlockComment { .. })
	}

	/// Can this token be a key or a value?
	#[must_use]
	pub fn is_atom(self) -> bool {
		matches!(self, Self::Word | Self::Number | Self::Str { .. })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
	/// `=`
	Eq,
	/// `==`
	EqEq,
	/// `!=`
	NotEq,
	/// `<`
	Lt,
	/// `<=`
	LtEq,
	/// `>`
	Gt,
	/// `>=`
	GtEq,
	/// `?=`
	QEq,
}

impl Operator {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Eq => "=",
			Self::EqEq => "==",
			Self::NotEq => "!=",
			Self::Lt => "<",
			Self::LtEq => "<=",
			Self::Gt => ">",
			Self::GtEq => ">=",
			Self::QEq => "?=",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'s> {
	pub kind: TokenKind,
	pub text: &'s str,
	pub range: TextRange,
	/// Zero-based.
	pub line: u32,
	/// Zero-based, in UTF-16 code units.
	pub col: u32,
}

/// Splits `src` into tokens, trivia included. Whitespace is dropped.
#[must_use]
pub fn tokenize(src: &str) -> Vec<Token<'_>> {
	let mut lexer = Lexer {
		src,
		pos: 0,
		line: 0,
		col: 0,
		tokens: Vec::with_capacity(src.len() / 4),
	};

	lexer.run();
	lexer.tokens
}

/// Does `word` spell a number literal, e.g. `3`, `-12` or `0.25`?
#[must_use]
pub fn is_number(word: &str) -> bool {
	static NUMBER: OnceLock<Regex> = OnceLock::new();

	NUMBER
		.get_or_init(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap())
		.is_match(word)
}

#[must_use]
pub(crate) fn is_word_char(c: char) -> bool {
	c.is_alphanumeric()
		|| matches!(
			c,
			'_' | '.' | ':' | '@' | '$' | '\'' | '-' | '|' | '%' | '^' | '+'
		)
}

struct Lexer<'s> {
	src: &'s str,
	/// Byte offset of the next character.
	pos: usize,
	line: u32,
	col: u32,
	tokens: Vec<Token<'s>>,
}

impl<'s> Lexer<'s> {
	fn run(&mut self) {
		while let Some(c) = self.peek() {
			if c.is_whitespace() || c == '\u{feff}' {
				self.bump();
				continue;
			}

			let start = self.pos;
			let (line, col) = (self.line, self.col);

			let kind = match c {
				'{' => {
					self.bump();
					TokenKind::BraceL
				}
				'}' => {
					self.bump();
					TokenKind::BraceR
				}
				'#' => {
					self.eat_line();
					TokenKind::LineComment
				}
				'"' => self.string(),
				'/' if self.peek_nth(1) == Some('*') => self.block_comment(),
				'=' | '<' | '>' | '!' | '?' => self.operator(c),
				c if is_word_char(c) => {
					while self.peek().is_some_and(is_word_char) {
						self.bump();
					}

					if is_number(&self.src[start..self.pos]) {
						TokenKind::Number
					} else {
						TokenKind::Word
					}
				}
				_ => {
					self.bump();
					TokenKind::Unknown
				}
			};

			self.tokens.push(Token {
				kind,
				text: &self.src[start..self.pos],
				range: TextRange::new(
					TextSize::from(start as u32),
					TextSize::from(self.pos as u32),
				),
				line,
				col,
			});
		}
	}

	fn string(&mut self) -> TokenKind {
		self.bump(); // Opening quote.

		while let Some(c) = self.peek() {
			match c {
				'"' => {
					self.bump();
					return TokenKind::Str { terminated: true };
				}
				'\\' => {
					self.bump();

					// An escaped newline still ends the string.
					if self.peek().is_some_and(|c| c != '\n') {
						self.bump();
					}
				}
				'\n' => break,
				_ => {
					self.bump();
				}
			}
		}

		TokenKind::Str { terminated: false }
	}

	fn block_comment(&mut self) -> TokenKind {
		self.bump();
		self.bump();

		while let Some(c) = self.bump() {
			if c == '*' && self.peek() == Some('/') {
				self.bump();
				return TokenKind::BlockComment { terminated: true };
			}
		}

		TokenKind::BlockComment { terminated: false }
	}

	fn operator(&mut self, first: char) -> TokenKind {
		self.bump();
		let eq_follows = self.peek() == Some('=');

		let op = match (first, eq_follows) {
			('=', false) => Operator::Eq,
			('=', true) => Operator::EqEq,
			('<', false) => Operator::Lt,
			('<', true) => Operator::LtEq,
			('>', false) => Operator::Gt,
			('>', true) => Operator::GtEq,
			('!', true) => Operator::NotEq,
			('?', true) => Operator::QEq,
			_ => return TokenKind::Unknown,
		};

		if eq_follows {
			self.bump();
		}

		TokenKind::Op(op)
	}

	fn eat_line(&mut self) {
		while self.peek().is_some_and(|c| c != '\n') {
			self.bump();
		}
	}

	#[must_use]
	fn peek(&self) -> Option<char> {
		self.src[self.pos..].chars().next()
	}

	#[must_use]
	fn peek_nth(&self, n: usize) -> Option<char> {
		self.src[self.pos..].chars().nth(n)
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.pos += c.len_utf8();

		if c == '\n' {
			self.line += 1;
			self.col = 0;
		} else {
			self.col += c.len_utf16() as u32;
		}

		Some(c)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[must_use]
	fn kinds(src: &str) -> Vec<TokenKind> {
		tokenize(src).into_iter().map(|t| t.kind).collect()
	}

	#[test]
	fn smoke_assignment() {
		let tokens = tokenize("add_gold = 100");
		assert_eq!(tokens.len(), 3);
		assert_eq!(tokens[0].kind, TokenKind::Word);
		assert_eq!(tokens[0].text, "add_gold");
		assert_eq!(tokens[1].kind, TokenKind::Op(Operator::Eq));
		assert_eq!(tokens[2].kind, TokenKind::Number);
		assert_eq!(tokens[2].col, 11);
	}

	#[test]
	fn numbers() {
		assert_eq!(
			kinds("-5 0.25 12 1066.9.15 -x"),
			[
				TokenKind::Number,
				TokenKind::Number,
				TokenKind::Number,
				TokenKind::Word,
				TokenKind::Word,
			]
		);
	}

	#[test]
	fn operators() {
		assert_eq!(
			kinds("a >= 1 b != 2 c ?= d e == f"),
			[
				TokenKind::Word,
				TokenKind::Op(Operator::GtEq),
				TokenKind::Number,
				TokenKind::Word,
				TokenKind::Op(Operator::NotEq),
				TokenKind::Number,
				TokenKind::Word,
				TokenKind::Op(Operator::QEq),
				TokenKind::Word,
				TokenKind::Word,
				TokenKind::Op(Operator::EqEq),
				TokenKind::Word,
			]
		);
	}

	#[test]
	fn strings() {
		let tokens = tokenize(r#"desc = "say \"hi\"" name = "oops
next"#);

		assert_eq!(tokens[2].kind, TokenKind::Str { terminated: true });
		assert_eq!(tokens[2].text, r#""say \"hi\"""#);
		assert_eq!(tokens[5].kind, TokenKind::Str { terminated: false });
		assert_eq!(tokens[5].text, r#""oops"#);
		assert_eq!(tokens[6].text, "next");
		assert_eq!(tokens[6].line, 1);
	}

	#[test]
	fn comments_are_retained() {
		let tokens = tokenize("a = 1 # trailing\n/* block\n comment */ b = 2 /* open");

		assert_eq!(tokens[3].kind, TokenKind::LineComment);
		assert_eq!(tokens[3].text, "# trailing");
		assert_eq!(tokens[4].kind, TokenKind::BlockComment { terminated: true });
		assert_eq!(tokens[5].line, 2);
		assert_eq!(
			tokens.last().unwrap().kind,
			TokenKind::BlockComment { terminated: false }
		);
	}

	#[test]
	fn unknown_characters() {
		assert_eq!(
			kinds("a = [ ! ]"),
			[
				TokenKind::Word,
				TokenKind::Op(Operator::Eq),
				TokenKind::Unknown,
				TokenKind::Unknown,
				TokenKind::Unknown,
			]
		);
	}

	#[test]
	fn positions_are_monotonic() {
		let src = "a = { b = \"ü\" }\r\n\tc = 𝄞 /* x */ d\n}}{";
		let tokens = tokenize(src);

		for pair in tokens.windows(2) {
			assert!(pair[0].range.end() <= pair[1].range.start());
			assert!((pair[0].line, pair[0].col) < (pair[1].line, pair[1].col));
		}

		// The musical symbol is two UTF-16 code units wide.
		let d = tokens.iter().find(|t| t.text == "d").unwrap();
		assert_eq!((d.line, d.col), (1, 16));
	}
}
