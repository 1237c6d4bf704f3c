//! The parser. A single left-to-right pass over the token stream with an
//! explicit stack of open blocks, so input nesting depth never touches the
//! call stack.

use text_size::{TextRange, TextSize};
use tracing::debug;

use crate::{
	ast::{Ast, FaultKind, FaultMarker, NodeId, NodeKind, ValueKind},
	lex::{self, Operator, Token, TokenKind},
};

/// Parses `src` into a forest. Never fails; see [`Ast::faults`] for what
/// had to be repaired or skipped.
#[must_use]
pub fn parse(src: &str) -> Ast {
	let tokens = lex::tokenize(src);
	let mut ast = Ast::new(src);
	let mut significant = Vec::with_capacity(tokens.len());

	for token in tokens {
		match token.kind {
			TokenKind::LineComment | TokenKind::BlockComment { terminated: true } => {
				ast.comments.push(token.range);
			}
			TokenKind::BlockComment { terminated: false } => {
				ast.comments.push(token.range);
				ast.faults.push(FaultMarker {
					kind: FaultKind::UnterminatedComment,
					anchor: TextRange::at(token.range.start(), TextSize::from(2)),
					node: None,
				});
			}
			_ => significant.push(token),
		}
	}

	let mut parser = Parser {
		tokens: &significant,
		pos: 0,
		ast,
		stack: vec![],
	};

	parser.run();
	let mut ast = parser.ast;
	ast.faults.sort_by_key(|fault| (fault.anchor.start(), fault.anchor.end()));

	debug!(
		"Parsed {} nodes ({} roots, {} faults).",
		ast.nodes.len(),
		ast.roots.len(),
		ast.faults.len()
	);

	ast
}

#[derive(Debug, Clone, Copy)]
struct Frame {
	node: NodeId,
	brace: TextRange,
}

struct Parser<'s, 't> {
	tokens: &'t [Token<'s>],
	pos: usize,
	ast: Ast,
	stack: Vec<Frame>,
}

impl<'s> Parser<'s, '_> {
	fn run(&mut self) {
		while let Some(token) = self.bump() {
			match token.kind {
				TokenKind::BraceL => self.open_block(None, None, token.range.start(), token.range),
				TokenKind::BraceR => self.close_block(token.range),
				TokenKind::Op(_) => self.fault(FaultKind::StrayOperator, token.range),
				TokenKind::Unknown => self.fault(FaultKind::UnknownCharacter, token.range),
				TokenKind::Word | TokenKind::Number | TokenKind::Str { .. } => {
					self.check_string(&token);

					match self.peek().map(|t| t.kind) {
						Some(TokenKind::Op(op)) => {
							// Never `None`; the peek above saw a token.
							let op_range = self.bump().map_or(token.range, |t| t.range);
							self.after_operator(&token, op, op_range);
						}
						_ => self.scalar(&token),
					}
				}
				TokenKind::LineComment | TokenKind::BlockComment { .. } => {}
			}
		}

		let eof = TextSize::of(self.ast.text.as_str());

		while let Some(frame) = self.stack.pop() {
			self.finish_block(frame, eof);

			self.ast.faults.push(FaultMarker {
				kind: FaultKind::UnclosedOpen,
				anchor: frame.brace,
				node: Some(frame.node),
			});
		}
	}

	/// Decides the shape of the value by looking at the token after `op`.
	fn after_operator(&mut self, key: &Token, op: Operator, op_range: TextRange) {
		match self.peek().map(|t| t.kind) {
			Some(TokenKind::BraceL) => {
				let brace = self.bump().map_or(op_range, |t| t.range);
				self.open_block(Some(key.range), Some(op), key.range.start(), brace);
			}
			Some(kind) if kind.is_atom() => {
				let Some(value) = self.bump() else {
					return;
				};

				self.check_string(&value);

				let id = self.ast.alloc(
					NodeKind::Assignment,
					self.top(),
					key.range.cover(value.range),
				);

				let node = self.ast.node_mut(id);
				node.key = Some(key.range);
				node.op = Some(op);
				node.value = Some((value_kind(value.kind), value.range));
			}
			_ => {
				// `}`, another operator, an unknown character, or the end of input.
				// The next token gets handled by the main loop.
				let id = self.ast.alloc(
					NodeKind::Assignment,
					self.top(),
					key.range.cover(op_range),
				);

				let node = self.ast.node_mut(id);
				node.key = Some(key.range);
				node.op = Some(op);

				self.ast.faults.push(FaultMarker {
					kind: FaultKind::MissingValue,
					anchor: op_range,
					node: Some(id),
				});
			}
		}
	}

	fn scalar(&mut self, token: &Token) {
		let id = self.ast.alloc(NodeKind::Scalar, self.top(), token.range);
		self.ast.node_mut(id).value = Some((value_kind(token.kind), token.range));
	}

	fn open_block(
		&mut self,
		key: Option<TextRange>,
		op: Option<Operator>,
		start: TextSize,
		brace: TextRange,
	) {
		let id = self
			.ast
			.alloc(NodeKind::Block, self.top(), TextRange::new(start, brace.end()));

		let node = self.ast.node_mut(id);
		node.key = key;
		node.op = op;

		self.stack.push(Frame { node: id, brace });
	}

	fn close_block(&mut self, brace: TextRange) {
		match self.stack.pop() {
			Some(frame) => self.finish_block(frame, brace.end()),
			None => self.fault(FaultKind::UnmatchedClose, brace),
		}
	}

	fn finish_block(&mut self, frame: Frame, end: TextSize) {
		let subtree_end = self.ast.nodes.len() as u32;
		let all_scalars = {
			let node = self.ast.node(frame.node);

			!node.children.is_empty()
				&& node
					.children
					.iter()
					.all(|c| self.ast.node(*c).kind == NodeKind::Scalar)
		};

		let node = self.ast.node_mut(frame.node);
		node.range = TextRange::new(node.range.start(), end);
		node.subtree_end = subtree_end;

		if all_scalars {
			node.kind = NodeKind::List;
		}
	}

	fn check_string(&mut self, token: &Token) {
		if token.kind == (TokenKind::Str { terminated: false }) {
			self.fault(FaultKind::UnterminatedString, token.range);
		}
	}

	fn fault(&mut self, kind: FaultKind, anchor: TextRange) {
		let node = self.top();
		self.ast.faults.push(FaultMarker { kind, anchor, node });
	}

	#[must_use]
	fn top(&self) -> Option<NodeId> {
		self.stack.last().map(|frame| frame.node)
	}

	#[must_use]
	fn peek(&self) -> Option<Token<'s>> {
		self.tokens.get(self.pos).copied()
	}

	fn bump(&mut self) -> Option<Token<'s>> {
		let ret = self.tokens.get(self.pos).copied();
		self.pos += 1;
		ret
	}
}

#[must_use]
fn value_kind(kind: TokenKind) -> ValueKind {
	match kind {
		TokenKind::Number => ValueKind::Number,
		TokenKind::Str { terminated } => ValueKind::Str { terminated },
		_ => ValueKind::Word,
	}
}

#[cfg(test)]
mod test {
	use indoc::indoc;

	use super::*;

	#[test]
	fn smoke() {
		let ast = parse(indoc! {"
			namespace = my_events
			my_events.1 = {
				type = character_event
				trigger = { is_adult = yes gold >= 100 }
				option = { add_gold = -5.5 }
			}
		"});

		assert!(ast.faults().is_empty());
		assert_eq!(ast.roots().len(), 2);

		let event = ast.roots()[1];
		assert_eq!(ast.key(event), Some("my_events.1"));
		assert_eq!(ast.node(event).children().len(), 3);

		let trigger = ast.node(event).children()[1];
		let gold = ast.node(trigger).children()[1];
		assert_eq!(ast.node(gold).operator(), Some(Operator::GtEq));
		assert_eq!(ast.value(gold), Some("100"));
		assert_eq!(ast.node(gold).value_kind(), Some(ValueKind::Number));
	}

	#[test]
	fn brace_repair() {
		let ast = parse("a = { b = { c = 1");

		let a = ast.roots()[0];
		assert_eq!(ast.key(a), Some("a"));
		let b = ast.node(a).children()[0];
		assert_eq!(ast.key(b), Some("b"));
		let c = ast.node(b).children()[0];
		assert_eq!(ast.key(c), Some("c"));
		assert_eq!(ast.value(c), Some("1"));

		let unclosed: Vec<_> = ast
			.faults()
			.iter()
			.filter(|f| f.kind == FaultKind::UnclosedOpen)
			.collect();

		assert_eq!(unclosed.len(), 2);
		assert_eq!(ast.faults().len(), 2);
		// Anchored at each original `{`, outermost first after sorting.
		assert_eq!(ast.slice(unclosed[0].anchor), "{");
		assert_eq!(unclosed[0].node, Some(a));
		assert_eq!(unclosed[1].node, Some(b));
		assert_eq!(ast.node(a).range().end(), TextSize::of(ast.text()));
	}

	#[test]
	fn unmatched_close_is_skipped() {
		let ast = parse("} a = { b = 1 } } c = 2");

		assert_eq!(ast.roots().len(), 2);
		assert_eq!(ast.len(), 3);

		let faults = ast.faults();
		assert_eq!(faults.len(), 2);
		assert!(faults.iter().all(|f| f.kind == FaultKind::UnmatchedClose));
		assert!(faults.iter().all(|f| f.node.is_none()));
	}

	#[test]
	fn lists() {
		let ast = parse("traits = { brave just } empty = { } mixed = { a b = c }");
		let kinds: Vec<_> = ast.roots().iter().map(|r| ast.node(*r).kind()).collect();
		assert_eq!(kinds, [NodeKind::List, NodeKind::Block, NodeKind::Block]);
	}

	#[test]
	fn missing_values() {
		let ast = parse("a = { b = } c =");

		let kinds: Vec<_> = ast.faults().iter().map(|f| f.kind).collect();
		assert_eq!(kinds, [FaultKind::MissingValue, FaultKind::MissingValue]);

		let b = ast.node(ast.roots()[0]).children()[0];
		assert_eq!(ast.key(b), Some("b"));
		assert_eq!(ast.node(b).value_range(), None);
		assert_eq!(ast.faults()[0].node, Some(b));
	}

	#[test]
	fn stray_tokens() {
		let ast = parse("= a ! \"open");
		let kinds: Vec<_> = ast.faults().iter().map(|f| f.kind).collect();

		assert_eq!(
			kinds,
			[
				FaultKind::StrayOperator,
				FaultKind::UnknownCharacter,
				FaultKind::UnterminatedString
			]
		);

		assert_eq!(ast.roots().len(), 2);
	}

	#[test]
	fn ranges_are_contained() {
		let ast = parse(indoc! {"
			a = { b = { c = 1 d = { e f } } } }
			{ g = h
			i = { j = \"k
		"});

		for (id, node) in ast.nodes() {
			if let Some(parent) = node.parent() {
				assert!(
					ast.node(parent).range().contains_range(node.range()),
					"{id:?} escapes its parent"
				);
			}
		}
	}

	#[test]
	fn totality() {
		let deep_open = "a = {".repeat(10_000);
		let deep_closed = format!("{}{}", "{".repeat(10_000), "}".repeat(10_000));
		let long_line = "x = y ".repeat(50_000);

		let inputs: [&str; 10] = [
			"",
			"{",
			"}",
			"=",
			"\"",
			"}{}{",
			&deep_open,
			&deep_closed,
			&long_line,
			"a = { b = \u{fffd}\u{fffd} c /*",
		];

		for input in inputs {
			let ast = parse(input);
			assert!(ast.len() <= input.len());
		}

		let deep = parse(&deep_open);
		assert_eq!(deep.faults().len(), 10_000);
	}
}
