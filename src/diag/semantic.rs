//! Identifier classification, context misuse, and iterator parameter rules.

use lsp_types::DiagnosticSeverity;
use text_size::TextRange;

use crate::{
	ast::{NodeId, NodeKind},
	context::{self, Context, ContextMap, IterParams, IteratorKind},
	data::NameClass,
	lex,
	scope::{self, ChainSite},
};

use super::{AnalysisError, DiagCode, Diagnostic, Layer, Pass};

pub(super) fn check_node(
	pass: &Pass,
	contexts: &ContextMap,
	id: NodeId,
	out: &mut Vec<Diagnostic>,
) -> Result<(), AnalysisError> {
	let node = pass.ast.node(id);

	let Some(key_range) = node.key_range() else {
		return Ok(());
	};

	let key = pass.slice(id, key_range)?;
	let iterator = context::iterator(pass.tables, key).map(|(iter, _)| iter);

	if let (Some(iter), NodeKind::Block) = (iterator, node.kind()) {
		check_iterator(pass, id, iter, key, out)?;
	}

	if iterator.is_none() && pass.tables.config.effect_keys.iter().any(|k| k == key) {
		if contexts.of(pass.ast, id) == Context::Trigger {
			out.push(error(
				key_range,
				DiagCode::EffectInTrigger,
				format!("`{key}` runs effects, but is used where a trigger is expected"),
			));
		}

		return Ok(());
	}

	if iterator.is_none() && is_structural(pass, id, key) {
		return Ok(());
	}

	let class = match iterator {
		Some(iter) => iter.class(),
		None => match pass.tables.names.classify(key) {
			NameClass::Unknown if pass.index.is_some_and(|i| i.has_identifier(key)) => {
				NameClass::Both
			}
			other => other,
		},
	};

	let ctx = contexts.of(pass.ast, id);

	let (severity, code, message) = match (ctx, class) {
		(Context::Trigger, NameClass::Effect) => (
			DiagnosticSeverity::ERROR,
			DiagCode::EffectInTrigger,
			format!("`{key}` is an effect, but is used where a trigger is expected"),
		),
		(Context::Effect, NameClass::Trigger) => (
			DiagnosticSeverity::HINT,
			DiagCode::TriggerInEffect,
			format!("`{key}` is a trigger, and does nothing here outside of a condition"),
		),
		(Context::Effect | Context::Trigger, NameClass::Unknown) if pass.env.strict() => (
			DiagnosticSeverity::WARNING,
			DiagCode::UnknownIdentifier,
			format!("unknown identifier `{key}`"),
		),
		_ => return Ok(()),
	};

	out.push(Diagnostic {
		range: key_range,
		severity,
		code,
		message,
		layer: Layer::Semantic,
	});

	Ok(())
}

/// Keys which are part of the DSL's structure rather than effects or triggers.
#[must_use]
fn is_structural(pass: &Pass, id: NodeId, key: &str) -> bool {
	let config = &pass.tables.config;
	let ast = pass.ast;
	let node = ast.node(id);

	if config.trigger_keys.iter().any(|k| k == key)
		|| config.transparent_keys.iter().any(|k| k == key)
		|| config.phase_of(key).is_some()
	{
		return true;
	}

	if lex::is_number(key) || key.starts_with('@') || key.contains(['.', ':']) {
		return true;
	}

	let scopes = &pass.tables.scopes;

	// Scope targets, as in `root = scope:actor` or `liege = { ... }`.
	if scopes.universal(key).is_some()
		|| (scopes.is_known_link(key) && !pass.tables.names.contains(key))
	{
		return true;
	}

	if node.is_container() && scope::chain_text(pass.tables, ChainSite::BlockKey, key).is_some() {
		return true;
	}

	let Some(parent_key) = node.parent().and_then(|p| ast.key(p)) else {
		return false;
	};

	if IterParams::from_key(key).is_some() && context::iterator(pass.tables, parent_key).is_some()
	{
		return true;
	}

	key == "name" && config.binding_namespace(parent_key).is_some()
}

fn check_iterator(
	pass: &Pass,
	id: NodeId,
	iter: IteratorKind,
	key: &str,
	out: &mut Vec<Diagnostic>,
) -> Result<(), AnalysisError> {
	let ast = pass.ast;
	let node = ast.node(id);
	let key_range = node.key_range().unwrap_or(node.range());
	let allowed = iter.allowed_params();
	let mut present = IterParams::empty();

	for child in node.children().iter().copied() {
		let Some(range) = ast.node(child).key_range() else {
			continue;
		};

		let Some(param) = IterParams::from_key(pass.slice(child, range)?) else {
			continue;
		};

		present |= param;

		if !allowed.contains(param) {
			out.push(Diagnostic {
				range,
				severity: DiagnosticSeverity::WARNING,
				code: DiagCode::IteratorUnsupportedParam,
				message: format!(
					"`{}` is not a parameter of `{}` iterators",
					param.key(),
					iter.prefix()
				),
				layer: Layer::Semantic,
			});
		}
	}

	let exclusive = present & iter.exclusive_params();

	if exclusive.bits().count_ones() > 1 {
		out.push(error(
			key_range,
			DiagCode::IteratorExclusiveParams,
			format!("{} are mutually exclusive in `{key}`", param_list(exclusive)),
		));
	}

	let missing = iter.required_params() - present;

	if !missing.is_empty() {
		out.push(error(
			key_range,
			DiagCode::IteratorMissingParam,
			format!("`{key}` requires {}", param_list(missing)),
		));
	}

	Ok(())
}

#[must_use]
fn error(range: TextRange, code: DiagCode, message: String) -> Diagnostic {
	Diagnostic {
		range,
		severity: DiagnosticSeverity::ERROR,
		code,
		message,
		layer: Layer::Semantic,
	}
}

/// E.g. "`count` and `percent`".
#[must_use]
fn param_list(params: IterParams) -> String {
	let keys: Vec<_> = params.iter().map(|p| format!("`{}`", p.key())).collect();
	keys.join(" and ")
}
