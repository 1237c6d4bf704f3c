//! # PDX-LS Core
//!
//! The analysis core that underpins the PDX-LS binary, kept in a separate
//! library so that it can be driven without any language server transport.
//!
//! Analysis is a pure, synchronous function of the document text and a set of
//! read-only [static tables](data::StaticTables):
//!
//! 1. [`parse`] turns text into a flat [arena of nodes](ast::Ast), repairing
//!    brace mismatches and recording [faults](ast::FaultMarker) as it goes.
//! 2. [`scope`] infers which game-object category ("scope-kind") is in effect
//!    at every node, purely from navigation syntax.
//! 3. [`diag`] runs the syntax, semantic and scope layers over the results.

pub mod ast;
pub mod context;
pub mod data;
pub mod diag;
pub mod lex;
pub mod lines;
pub mod parse;
pub mod scope;

#[cfg(test)]
mod test;

use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use tracing::debug;

use crate::{
	ast::Ast,
	data::{ScopeKind, StaticTables, WorkspaceIndex},
	diag::Diagnostic,
};

pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// The complete output of one analysis run.
///
/// Always fully populated, even for empty or garbage input.
#[derive(Debug)]
pub struct Analysis {
	pub ast: Ast,
	/// Sorted by source position.
	pub diagnostics: Vec<Diagnostic>,
}

/// Configures and runs analysis of single documents against shared tables.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer<'t> {
	tables: &'t StaticTables,
	index: Option<&'t WorkspaceIndex>,
	root: Option<ScopeKind>,
}

impl<'t> Analyzer<'t> {
	#[must_use]
	pub fn new(tables: &'t StaticTables) -> Self {
		Self {
			tables,
			index: None,
			root: None,
		}
	}

	/// Supply cross-file identifiers and saved scopes.
	#[must_use]
	pub fn with_index(mut self, index: &'t WorkspaceIndex) -> Self {
		self.index = Some(index);
		self
	}

	/// Override the scope-kind every top-level definition starts in.
	/// Falls back to the configured default if `None` is given.
	#[must_use]
	pub fn with_root(mut self, root: Option<ScopeKind>) -> Self {
		self.root = root;
		self
	}

	#[must_use]
	pub fn root(&self) -> ScopeKind {
		self.root.unwrap_or_else(|| self.tables.default_root())
	}

	#[must_use]
	pub fn analyze(&self, text: &str) -> Analysis {
		let start_time = std::time::Instant::now();
		let ast = parse::parse(text);
		let bindings = scope::Bindings::collect(&ast, &self.tables.config);
		let env = scope::DocumentEnv::new(&ast, &bindings, self.tables, self.index);
		scope::infer(&ast, self.tables, self.root(), &env);

		let diagnostics = diag::run(&diag::Pass {
			ast: &ast,
			tables: self.tables,
			index: self.index,
			bindings: &bindings,
			env: &env,
			root: self.root(),
		});

		debug!(
			"Analyzed {} bytes in {}us: {} nodes, {} diagnostics.",
			text.len(),
			start_time.elapsed().as_micros(),
			ast.len(),
			diagnostics.len(),
		);

		Analysis { ast, diagnostics }
	}
}

/// Shorthand for `Analyzer::new(tables).analyze(text)`, optionally with an index.
#[must_use]
pub fn analyze(text: &str, tables: &StaticTables, index: Option<&WorkspaceIndex>) -> Analysis {
	let analyzer = Analyzer::new(tables);

	match index {
		Some(index) => analyzer.with_index(index).analyze(text),
		None => analyzer.analyze(text),
	}
}

/// Like [`analyze`], but accepts bytes which may not be valid UTF-8.
/// Invalid sequences are replaced with U+FFFD before tokenization.
#[must_use]
pub fn analyze_bytes(
	bytes: &[u8],
	tables: &StaticTables,
	index: Option<&WorkspaceIndex>,
) -> Analysis {
	analyze(&String::from_utf8_lossy(bytes), tables, index)
}
