//! The evaluation-order check.
//!
//! The host evaluates the immediate children of a definition in a fixed phase
//! order (see [`AnalysisConfig::phases`](crate::data::AnalysisConfig::phases)),
//! not in document order. A name saved in a later phase is not yet bound when
//! an earlier phase runs, so referencing it there silently yields nothing.

use lsp_types::DiagnosticSeverity;
use text_size::{TextRange, TextSize};

use crate::{
	ast::{NodeId, ValueKind},
	data::Namespace,
	scope::split_prefix,
};

use super::{AnalysisError, DiagCode, Diagnostic, Layer, Pass};

/// A `scope:<name>`-style reference.
#[derive(Debug)]
struct Reference<'a> {
	namespace: Namespace,
	text: &'a str,
	name: &'a str,
	range: TextRange,
}

pub(super) fn check_definition(
	pass: &Pass,
	def: NodeId,
	out: &mut Vec<Diagnostic>,
) -> Result<(), AnalysisError> {
	let ast = pass.ast;
	let config = &pass.tables.config;

	for child in ast.node(def).children().iter().copied() {
		let Some(phase) = ast.key(child).and_then(|k| config.phase_of(k)) else {
			continue;
		};

		for id in ast.subtree(child) {
			for reference in references(pass, id)? {
				let decls = pass
					.bindings
					.get(reference.namespace, reference.name)
					.iter()
					.filter(|b| b.definition == def);

				let mut earliest: Option<(usize, NodeId)> = None;

				for decl in decls {
					match decl.phase {
						Some(p) if p > phase => {
							if earliest.map_or(true, |(e, _)| p < e) {
								earliest = Some((p, decl.node));
							}
						}
						// Bound in the same phase, an earlier one, or somewhere
						// with no known phase; the reference may well be fine.
						_ => {
							earliest = None;
							break;
						}
					}
				}

				let Some((_, decl)) = earliest else {
					continue;
				};

				let used_in = ast.key(child).unwrap_or_default();
				let saved_in = phase_key(pass, def, decl).unwrap_or_default();

				out.push(Diagnostic {
					range: reference.range,
					severity: DiagnosticSeverity::ERROR,
					code: DiagCode::EvaluationOrder,
					message: format!(
						"`{}` is used in `{used_in}`, which is evaluated before `{saved_in}` saves `{}`",
						reference.text, reference.name,
					),
					layer: Layer::Scope,
				});
			}
		}
	}

	Ok(())
}

/// The key of the child of `def` which contains `node`.
#[must_use]
fn phase_key<'a>(pass: &Pass<'a>, def: NodeId, node: NodeId) -> Option<&'a str> {
	let ast = pass.ast;

	std::iter::once(node)
		.chain(ast.ancestors(node))
		.find(|id| ast.node(*id).parent() == Some(def))
		.and_then(|id| ast.key(id))
}

/// All references in a node's key and (non-string) value.
fn references<'a>(pass: &Pass<'a>, id: NodeId) -> Result<Vec<Reference<'a>>, AnalysisError> {
	let node = pass.ast.node(id);
	let mut ret = vec![];

	let value = match node.value {
		Some((ValueKind::Word, range)) => Some(range),
		_ => None,
	};

	for range in node.key_range().into_iter().chain(value) {
		let word = pass.slice(id, range)?;
		let mut offset = range.start();

		for segment in word.split('.') {
			let seg_range = TextRange::at(offset, TextSize::of(segment));
			offset += TextSize::of(segment) + TextSize::from(1);

			let Some((prefix, name)) = split_prefix(segment) else {
				continue;
			};

			let Some(namespace) = pass.tables.config.reference_namespace(prefix) else {
				continue;
			};

			if name.is_empty() {
				continue;
			}

			ret.push(Reference {
				namespace,
				text: segment,
				name,
				range: seg_range,
			});
		}
	}

	Ok(ret)
}
