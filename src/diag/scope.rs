//! Scope-chain validity for every chain-bearing key and value.

use lsp_types::DiagnosticSeverity;
use text_size::TextRange;

use crate::{
	ast::NodeId,
	scope::{self, FailReason, Resolver},
};

use super::{AnalysisError, DiagCode, Diagnostic, Layer, Pass};

pub(super) fn check_node(
	pass: &Pass,
	resolver: &Resolver,
	id: NodeId,
	out: &mut Vec<Diagnostic>,
) -> Result<(), AnalysisError> {
	let ast = pass.ast;
	let names = &pass.tables.scopes;

	for (chain, range) in scope::chains_of(ast, pass.tables, id) {
		let ambient = ast.ambient_scope(id).ok_or(AnalysisError::MissingScope(id))?;
		let result = resolver.resolve_from(chain, ambient);

		let Some(failure) = result.failure else {
			continue;
		};

		let seg = &failure.segment;

		let (code, message) = match failure.reason {
			FailReason::UnknownLink { from } => (
				DiagCode::UnknownScopeLink,
				format!("`{seg}` is not a scope link of `{}`", names.name(from)),
			),
			FailReason::UnknownList { from } => (
				DiagCode::UnknownScopeLink,
				format!("`{seg}` does not iterate over a list of `{}`", names.name(from)),
			),
			FailReason::UndefinedSaved(_) => (
				DiagCode::UndefinedSavedScope,
				format!("`{seg}` is never saved"),
			),
			FailReason::EmptySegment => (
				DiagCode::InvalidScopeChain,
				format!("scope chain `{chain}` has an empty link"),
			),
			FailReason::MisplacedIterator => (
				DiagCode::InvalidScopeChain,
				format!("`{seg}` can only be the last link of a scope chain"),
			),
		};

		out.push(Diagnostic {
			range: TextRange::at(range.start() + failure.range.start(), failure.range.len()),
			severity: DiagnosticSeverity::ERROR,
			code,
			message,
			layer: Layer::Scope,
		});
	}

	Ok(())
}
