//! One finding per [`FaultMarker`](crate::ast::FaultMarker).

use lsp_types::DiagnosticSeverity;

use crate::ast::FaultKind;

use super::{DiagCode, Diagnostic, Layer, Pass};

pub(super) fn check(pass: &Pass, out: &mut Vec<Diagnostic>) {
	let ast = pass.ast;

	for fault in ast.faults() {
		let text = ast.text().get(std::ops::Range::<usize>::from(fault.anchor)).unwrap_or("");

		let (code, message) = match fault.kind {
			FaultKind::UnmatchedClose => (
				DiagCode::UnmatchedClose,
				"unmatched `}`; there is no open block to close".to_string(),
			),
			FaultKind::UnclosedOpen => (
				DiagCode::UnclosedBlock,
				"this block is never closed; expected `}`".to_string(),
			),
			FaultKind::MissingValue => (
				DiagCode::MissingValue,
				format!("expected a value or `{{` after `{text}`"),
			),
			FaultKind::StrayOperator => (
				DiagCode::StrayOperator,
				format!("`{text}` has no key before it"),
			),
			FaultKind::UnterminatedString => (
				DiagCode::UnterminatedString,
				"unterminated string; expected `\"` before the end of the line".to_string(),
			),
			FaultKind::UnterminatedComment => (
				DiagCode::UnterminatedComment,
				"unterminated block comment; expected `*/`".to_string(),
			),
			FaultKind::UnknownCharacter => (
				DiagCode::UnknownCharacter,
				format!("unexpected character `{text}`"),
			),
		};

		let severity = match fault.kind {
			FaultKind::UnknownCharacter => DiagnosticSeverity::WARNING,
			_ => DiagnosticSeverity::ERROR,
		};

		out.push(Diagnostic {
			range: fault.anchor,
			severity,
			code,
			message,
			layer: Layer::Syntax,
		});
	}
}
