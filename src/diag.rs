//! The diagnostics pipeline: three independent layers run over one analyzed
//! document, each unable to suppress the others.

pub mod order;
pub mod scope;
pub mod semantic;
pub mod syntax;

use std::panic::AssertUnwindSafe;

use lsp_types::{DiagnosticSeverity, NumberOrString};
use text_size::TextRange;
use tracing::{debug, error};

use crate::{
	ast::{Ast, NodeId},
	context::ContextMap,
	data::{ScopeKind, StaticTables, WorkspaceIndex},
	lines::LineIndex,
	scope::{Bindings, DocumentEnv, Resolver},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
	Syntax,
	Semantic,
	Scope,
}

impl Layer {
	/// The `source` tag of diagnostics from this layer.
	#[must_use]
	pub fn source(self) -> &'static str {
		match self {
			Self::Syntax => "pdxls-syntax",
			Self::Semantic => "pdxls-semantic",
			Self::Scope => "pdxls-scope",
		}
	}
}

/// A stable identifier for each kind of finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagCode {
	UnmatchedClose,
	UnclosedBlock,
	MissingValue,
	StrayOperator,
	UnterminatedString,
	UnterminatedComment,
	UnknownCharacter,
	UnknownIdentifier,
	EffectInTrigger,
	TriggerInEffect,
	IteratorExclusiveParams,
	IteratorMissingParam,
	IteratorUnsupportedParam,
	UnknownScopeLink,
	UndefinedSavedScope,
	InvalidScopeChain,
	EvaluationOrder,
	AnalysisIncomplete,
}

impl DiagCode {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::UnmatchedClose => "unmatched-close",
			Self::UnclosedBlock => "unclosed-block",
			Self::MissingValue => "missing-value",
			Self::StrayOperator => "stray-operator",
			Self::UnterminatedString => "unterminated-string",
			Self::UnterminatedComment => "unterminated-comment",
			Self::UnknownCharacter => "unknown-character",
			Self::UnknownIdentifier => "unknown-identifier",
			Self::EffectInTrigger => "effect-in-trigger",
			Self::TriggerInEffect => "trigger-in-effect",
			Self::IteratorExclusiveParams => "iterator-exclusive-params",
			Self::IteratorMissingParam => "iterator-missing-param",
			Self::IteratorUnsupportedParam => "iterator-unsupported-param",
			Self::UnknownScopeLink => "unknown-scope-link",
			Self::UndefinedSavedScope => "undefined-saved-scope",
			Self::InvalidScopeChain => "invalid-scope-chain",
			Self::EvaluationOrder => "evaluation-order",
			Self::AnalysisIncomplete => "analysis-incomplete",
		}
	}
}

impl std::fmt::Display for DiagCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
	pub range: TextRange,
	pub severity: DiagnosticSeverity,
	pub code: DiagCode,
	pub message: String,
	pub layer: Layer,
}

impl Diagnostic {
	#[must_use]
	pub fn to_lsp(&self, lndx: &LineIndex) -> lsp_types::Diagnostic {
		lsp_types::Diagnostic {
			range: lndx.lsp_range(self.range),
			severity: Some(self.severity),
			code: Some(NumberOrString::String(self.code.as_str().to_string())),
			source: Some(self.layer.source().to_string()),
			message: self.message.clone(),
			..Default::default()
		}
	}
}

// AnalysisError ///////////////////////////////////////////////////////////////

/// An internal inconsistency encountered while checking one node.
///
/// Never escapes an analysis run; each is converted into an
/// `analysis-incomplete` diagnostic scoped to the offending node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
	/// Inference left no scope-kind cached for this node.
	MissingScope(NodeId),
	/// A range recorded on a node does not fall on the document's text.
	BadRange { node: NodeId, range: TextRange },
	/// A panic was caught while checking this node.
	Panicked { node: NodeId, message: String },
}

impl std::error::Error for AnalysisError {}

impl std::fmt::Display for AnalysisError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::MissingScope(node) => write!(f, "no scope-kind was inferred for node {}", node.index()),
			Self::BadRange { node, range } => {
				write!(f, "node {} has out-of-bounds range {range:?}", node.index())
			}
			Self::Panicked { node, message } => {
				write!(f, "check of node {} panicked: {message}", node.index())
			}
		}
	}
}

/// Everything a layer reads. Inference must already have run.
pub struct Pass<'a> {
	pub ast: &'a Ast,
	pub tables: &'a StaticTables,
	pub index: Option<&'a WorkspaceIndex>,
	pub bindings: &'a Bindings,
	pub env: &'a DocumentEnv<'a>,
	pub root: ScopeKind,
}

impl<'a> Pass<'a> {
	/// The text at `range`, or an error if it does not lie on the document.
	pub(crate) fn slice(&self, node: NodeId, range: TextRange) -> Result<&'a str, AnalysisError> {
		self.ast
			.text()
			.get(std::ops::Range::<usize>::from(range))
			.ok_or(AnalysisError::BadRange { node, range })
	}
}

/// Runs every layer and returns their findings in source-position order.
/// Findings at the same position keep layer order.
#[must_use]
pub fn run(pass: &Pass) -> Vec<Diagnostic> {
	let ast = pass.ast;
	let mut out = vec![];

	syntax::check(pass, &mut out);
	let n_syntax = out.len();

	let contexts = ContextMap::new(pass.tables, ast);

	for (id, _) in ast.nodes() {
		guarded(&mut out, ast, Layer::Semantic, id, |out| {
			semantic::check_node(pass, &contexts, id, out)
		});
	}

	let n_semantic = out.len() - n_syntax;
	let resolver = Resolver::new(pass.tables, pass.env, pass.root);

	for (id, _) in ast.nodes() {
		guarded(&mut out, ast, Layer::Scope, id, |out| {
			scope::check_node(pass, &resolver, id, out)
		});
	}

	for def in ast.roots().iter().copied() {
		guarded(&mut out, ast, Layer::Scope, def, |out| {
			order::check_definition(pass, def, out)
		});
	}

	debug!(
		"Diagnostics: {n_syntax} syntax, {n_semantic} semantic, {} scope.",
		out.len() - n_syntax - n_semantic
	);

	out.sort_by_key(|diag| (diag.range.start(), diag.range.end()));
	out
}

/// Runs one per-node check. If it fails or panics, its partial output is
/// discarded and replaced with a single `analysis-incomplete` finding.
pub(crate) fn guarded<F>(
	out: &mut Vec<Diagnostic>,
	ast: &Ast,
	layer: Layer,
	node: NodeId,
	check: F,
) where
	F: FnOnce(&mut Vec<Diagnostic>) -> Result<(), AnalysisError>,
{
	let len = out.len();

	let err = match std::panic::catch_unwind(AssertUnwindSafe(|| check(out))) {
		Ok(Ok(())) => return,
		Ok(Err(err)) => err,
		Err(payload) => {
			let message = if let Some(s) = payload.downcast_ref::<&str>() {
				s.to_string()
			} else if let Some(s) = payload.downcast_ref::<String>() {
				s.clone()
			} else {
				"unknown panic".to_string()
			};

			AnalysisError::Panicked { node, message }
		}
	};

	error!("{} layer: {err}", layer.source());
	out.truncate(len);

	let syn = ast.node(node);

	out.push(Diagnostic {
		range: syn.key_range().unwrap_or(syn.range()),
		severity: DiagnosticSeverity::INFORMATION,
		code: DiagCode::AnalysisIncomplete,
		message: format!("analysis of this node is incomplete: {err}"),
		layer,
	});
}
