//! Functions and types for dealing in strings in terms of lines.
//!
//! The line index is from rust-analyzer, pared down to the generic analyzer
//! and extended with conversions to and from LSP positions.

use lsp_types::TextDocumentContentChangeEvent;
use nohash_hasher::IntMap;
use text_size::{TextRange, TextSize};

/// `(line, column)` information in the native, UTF-8 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineCol {
	/// Zero-based.
	pub line: u32,
	/// Zero-based UTF-8 offset.
	pub col: u32,
}

/// `(line, column)` information in UTF-16, as LSP clients count by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WideLineCol {
	/// Zero-based.
	pub line: u32,
	/// Zero-based.
	pub col: u32,
}

impl std::fmt::Display for WideLineCol {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.line + 1, self.col + 1)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WideChar {
	/// Start offset of a character inside a line, zero-based.
	start: TextSize,
	/// End offset of a character inside a line, zero-based.
	end: TextSize,
}

impl WideChar {
	/// Returns the length in 8-bit UTF-8 code units.
	fn len(&self) -> TextSize {
		self.end - self.start
	}

	/// Returns the length in UTF-16 code units.
	fn wide_len(&self) -> u32 {
		if self.len() == TextSize::from(4) {
			2
		} else {
			1
		}
	}
}

/// Maps flat [`TextSize`] offsets to and from `(line, column)` representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
	/// Offset the beginning of each line (except the first, which always has offset 0).
	newlines: Box<[TextSize]>,
	/// List of non-ASCII characters on each line.
	line_wide_chars: IntMap<u32, Box<[WideChar]>>,
	/// The length of the entire text.
	len: TextSize,
}

impl LineIndex {
	#[must_use]
	pub fn new(text: &str) -> Self {
		let mut newlines = vec![];
		let mut line_wide_chars = IntMap::<u32, Vec<WideChar>>::default();

		for (i, c) in text.char_indices() {
			let pos = TextSize::from(i as u32);

			if c == '\n' {
				newlines.push(pos + TextSize::from(1));
			} else if c.len_utf8() > 1 {
				let line = newlines.len() as u32;
				let start = newlines.last().map_or(TextSize::from(0), |nl| *nl);

				line_wide_chars.entry(line).or_default().push(WideChar {
					start: pos - start,
					end: pos - start + TextSize::of(c),
				});
			}
		}

		Self {
			newlines: newlines.into_boxed_slice(),
			line_wide_chars: line_wide_chars
				.into_iter()
				.map(|(k, v)| (k, v.into_boxed_slice()))
				.collect(),
			len: TextSize::of(text),
		}
	}

	/// Returns `None` if the `offset` was invalid, e.g. if it extends past the
	/// end of the text or points to the middle of a multi-byte character.
	#[must_use]
	pub fn try_line_col(&self, offset: TextSize) -> Option<LineCol> {
		if offset > self.len {
			return None;
		}

		let line = self.newlines.partition_point(|&it| it <= offset);
		let start = self.start_offset(line)?;
		let col = offset - start;

		let ret = LineCol {
			line: line as u32,
			col: col.into(),
		};

		self.line_wide_chars
			.get(&ret.line)
			.into_iter()
			.flat_map(|it| it.iter())
			.all(|it| col <= it.start || it.end <= col)
			.then_some(ret)
	}

	#[must_use]
	pub fn offset(&self, line_col: LineCol) -> Option<TextSize> {
		let start = self.start_offset(line_col.line as usize)?;
		let ret = start + TextSize::from(line_col.col);
		(ret <= self.len).then_some(ret)
	}

	fn start_offset(&self, line: usize) -> Option<TextSize> {
		match line.checked_sub(1) {
			None => Some(TextSize::from(0)),
			Some(it) => self.newlines.get(it).copied(),
		}
	}

	#[must_use]
	pub fn to_wide(&self, line_col: LineCol) -> Option<WideLineCol> {
		let mut col = line_col.col;

		if let Some(wide_chars) = self.line_wide_chars.get(&line_col.line) {
			for c in wide_chars.iter() {
				if u32::from(c.end) <= line_col.col {
					col = col.checked_sub(u32::from(c.len()) - c.wide_len())?;
				} else {
					// All remaining wide characters come after the one being mapped.
					break;
				}
			}
		}

		Some(WideLineCol {
			line: line_col.line,
			col,
		})
	}

	#[must_use]
	pub fn to_utf8(&self, line_col: WideLineCol) -> Option<LineCol> {
		let mut col = line_col.col;

		if let Some(wide_chars) = self.line_wide_chars.get(&line_col.line) {
			for c in wide_chars.iter() {
				if col > u32::from(c.start) {
					col = col.checked_add(u32::from(c.len()) - c.wide_len())?;
				} else {
					break;
				}
			}
		}

		Some(LineCol {
			line: line_col.line,
			col,
		})
	}

	/// Returns the length of the original text.
	#[must_use]
	pub fn len(&self) -> TextSize {
		self.len
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len == TextSize::from(0)
	}

	// LSP /////////////////////////////////////////////////////////////////////

	#[must_use]
	pub fn lsp_position(&self, offset: TextSize) -> Option<lsp_types::Position> {
		let wide = self.to_wide(self.try_line_col(offset)?)?;
		Some(lsp_types::Position::new(wide.line, wide.col))
	}

	/// Out-of-bounds ends are clamped to the end of the text.
	#[must_use]
	pub fn lsp_range(&self, range: TextRange) -> lsp_types::Range {
		let clamp = |offset: TextSize| {
			self.lsp_position(offset.min(self.len))
				.or_else(|| self.lsp_position(self.len))
				.unwrap_or_default()
		};

		lsp_types::Range::new(clamp(range.start()), clamp(range.end()))
	}

	#[must_use]
	pub fn text_size(&self, pos: lsp_types::Position) -> Option<TextSize> {
		self.offset(self.to_utf8(WideLineCol {
			line: pos.line,
			col: pos.character,
		})?)
	}

	#[must_use]
	pub fn text_range(&self, range: lsp_types::Range) -> Option<TextRange> {
		let start = self.text_size(range.start)?;
		let end = self.text_size(range.end)?;
		(start <= end).then(|| TextRange::new(start, end))
	}
}

/// Applies a batch of `textDocument/didChange` content changes to `text`,
/// in order. Changes with out-of-bounds ranges are skipped.
pub fn splice_changes(text: &mut String, mut changes: Vec<TextDocumentContentChangeEvent>) {
	// Skip to the last full document change,
	// as it invalidates all previous changes anyways.
	let mut start = changes
		.iter()
		.rev()
		.position(|change| change.range.is_none())
		.map_or(0, |idx| changes.len() - idx - 1);

	match changes.get_mut(start) {
		Some(TextDocumentContentChangeEvent {
			range: None,
			text: new_text,
			..
		}) => {
			*text = std::mem::take(new_text);
			start += 1;

			if start == changes.len() {
				return;
			}
		}
		Some(_) => {}
		None => return,
	}

	let mut index = LineIndex::new(text);

	// Changes must be applied sequentially, but can cross lines, so the index
	// must be kept updated. Clients may send the ranges in reverse; remember the
	// last valid line in the index and only rebuild it if needed.
	let mut index_valid = u32::MAX;

	for change in changes.into_iter().skip(start) {
		let Some(range) = change.range else {
			continue;
		};

		if index_valid <= range.end.line {
			index = LineIndex::new(text);
		}

		index_valid = range.start.line;

		if let Some(range) = index.text_range(range) {
			text.replace_range(std::ops::Range::<usize>::from(range), &change.text);
		}
	}
}
