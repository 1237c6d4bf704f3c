//! End-to-end tests of the whole analysis pipeline.

use indoc::indoc;
use lsp_types::DiagnosticSeverity;
use text_size::TextSize;

use crate::{
	analyze, analyze_bytes,
	data::{test::tables, StaticTables, WorkspaceIndex},
	diag::{DiagCode, Diagnostic},
	lines::LineIndex,
	Analysis, Analyzer,
};

#[must_use]
fn with_code(analysis: &Analysis, code: DiagCode) -> Vec<&Diagnostic> {
	analysis
		.diagnostics
		.iter()
		.filter(|d| d.code == code)
		.collect()
}

#[must_use]
fn errors(analysis: &Analysis) -> Vec<&Diagnostic> {
	analysis
		.diagnostics
		.iter()
		.filter(|d| d.severity == DiagnosticSeverity::ERROR)
		.collect()
}

#[test]
fn chain_correctness() {
	let tables = tables();

	let analysis = analyze(
		indoc! {"
			my_event = {
				immediate = {
					liege.primary_title.holder = { add_gold = 1 }
					liege.county = { add_gold = 1 }
				}
			}
		"},
		&tables,
		None,
	);

	let errs = errors(&analysis);
	assert_eq!(errs.len(), 1, "{errs:#?}");
	assert_eq!(errs[0].code, DiagCode::UnknownScopeLink);
	assert_eq!(analysis.ast.slice(errs[0].range), "county");
	assert!(errs[0].message.contains("county"));
}

#[test]
fn iterator_exclusivity() {
	let tables = tables();

	let both = analyze("trigger = { any_vassal = { count = 3 percent = 0.5 } }", &tables, None);
	assert_eq!(with_code(&both, DiagCode::IteratorExclusiveParams).len(), 1);
	assert_eq!(errors(&both).len(), 1);

	let one = analyze("trigger = { any_vassal = { count = 3 } }", &tables, None);
	assert!(one.diagnostics.is_empty(), "{:#?}", one.diagnostics);

	let unordered = analyze("immediate = { ordered_vassal = { max = 2 } }", &tables, None);
	assert_eq!(with_code(&unordered, DiagCode::IteratorMissingParam).len(), 1);

	let ordered = analyze(
		"immediate = { ordered_vassal = { order_by = gold position = 1 add_gold = 1 } }",
		&tables,
		None,
	);

	assert!(ordered.diagnostics.is_empty(), "{:#?}", ordered.diagnostics);

	let weighted = analyze("immediate = { every_vassal = { weight = 2 } }", &tables, None);
	let unsupported = with_code(&weighted, DiagCode::IteratorUnsupportedParam);
	assert_eq!(unsupported.len(), 1);
	assert_eq!(unsupported[0].severity, DiagnosticSeverity::WARNING);
	assert_eq!(weighted.ast.slice(unsupported[0].range), "weight");
}

#[test]
fn context_misuse() {
	let tables = tables();

	let effect_in_trigger = analyze("trigger = { add_gold = 100 }", &tables, None);
	let errs = errors(&effect_in_trigger);
	assert_eq!(errs.len(), 1);
	assert_eq!(errs[0].code, DiagCode::EffectInTrigger);
	assert!(errs[0].message.contains("add_gold"));

	let trigger_in_effect = analyze("immediate = { is_adult = yes }", &tables, None);
	assert!(errors(&trigger_in_effect).is_empty());

	let hints = with_code(&trigger_in_effect, DiagCode::TriggerInEffect);
	assert_eq!(hints.len(), 1);
	assert_eq!(hints[0].severity, DiagnosticSeverity::HINT);

	// Conditions nested in effects are fine, as are iterators in the right place.
	let nested = analyze(
		indoc! {"
			immediate = {
				if = {
					limit = { is_adult = yes }
					add_gold = 5
				}
				every_vassal = {
					limit = { age >= 16 }
					add_trait = brave
				}
			}
		"},
		&tables,
		None,
	);

	assert!(nested.diagnostics.is_empty(), "{:#?}", nested.diagnostics);

	let wrong_iterator = analyze("trigger = { every_vassal = { } }", &tables, None);
	assert_eq!(with_code(&wrong_iterator, DiagCode::EffectInTrigger).len(), 1);

	let in_any = analyze("trigger = { any_vassal = { add_gold = 1 } }", &tables, None);
	let errs = errors(&in_any);
	assert_eq!(errs.len(), 1);
	assert_eq!(errs[0].code, DiagCode::EffectInTrigger);
	assert_eq!(in_any.ast.slice(errs[0].range), "add_gold");

	// An effect block opened inside a condition is itself the mistake.
	let hidden = analyze("trigger = { hidden_effect = { add_gold = 1 } }", &tables, None);
	let errs = errors(&hidden);
	assert_eq!(errs.len(), 1);
	assert_eq!(errs[0].code, DiagCode::EffectInTrigger);
	assert_eq!(hidden.ast.slice(errs[0].range), "hidden_effect");

	let hidden_ok = analyze("immediate = { hidden_effect = { add_gold = 1 } }", &tables, None);
	assert!(hidden_ok.diagnostics.is_empty(), "{:#?}", hidden_ok.diagnostics);
}

#[test]
fn golden_rule() {
	let tables = tables();

	let analysis = analyze(
		indoc! {"
			my_events.1 = {
				trigger = {
					scope:target = { is_adult = yes }
				}
				immediate = {
					random_courtier = { save_scope_as = target }
				}
			}
		"},
		&tables,
		None,
	);

	let errs = errors(&analysis);
	assert_eq!(errs.len(), 1, "{errs:#?}");
	assert_eq!(errs[0].code, DiagCode::EvaluationOrder);
	assert!(errs[0].message.contains("target"));
	assert_eq!(analysis.ast.slice(errs[0].range), "scope:target");

	// Saved earlier than it is used: fine.
	let ordered = analyze(
		indoc! {"
			my_events.2 = {
				immediate = { save_scope_as = target }
				option = { scope:target = { add_gold = 5 } }
			}
		"},
		&tables,
		None,
	);

	assert!(errors(&ordered).is_empty(), "{:#?}", ordered.diagnostics);

	// Variables follow the same rule.
	let variable = analyze(
		indoc! {"
			my_events.3 = {
				trigger = { var:counter >= 2 }
				immediate = { set_variable = { name = counter value = 3 } }
			}
		"},
		&tables,
		None,
	);

	assert_eq!(with_code(&variable, DiagCode::EvaluationOrder).len(), 1);
}

#[test]
fn brace_repair() {
	let tables = tables();
	let analysis = analyze("a = { b = { c = 1", &tables, None);

	assert_eq!(analysis.diagnostics.len(), 2);
	assert!(analysis
		.diagnostics
		.iter()
		.all(|d| d.code == DiagCode::UnclosedBlock && d.severity == DiagnosticSeverity::ERROR));

	let ast = &analysis.ast;
	let a = ast.roots()[0];
	let b = ast.node(a).children()[0];
	let c = ast.node(b).children()[0];
	assert_eq!(ast.key(c), Some("c"));
	assert_eq!(ast.value(c), Some("1"));
}

#[test]
fn saved_scopes_and_index() {
	let tables = tables();
	let src = "my_event = { immediate = { scope:nobody = { add_gold = 1 } my_effect = yes } }";

	let unindexed = analyze(src, &tables, None);
	assert!(unindexed.diagnostics.is_empty(), "{:#?}", unindexed.diagnostics);

	let mut index = WorkspaceIndex::default();
	index.identifiers.insert("my_effect".to_string());
	let indexed = analyze(src, &tables, Some(&index));
	assert_eq!(with_code(&indexed, DiagCode::UndefinedSavedScope).len(), 1);
	assert!(with_code(&indexed, DiagCode::UnknownIdentifier).is_empty());

	index.saved_scopes.insert("nobody".to_string(), Some("character".to_string()));
	let resolved = analyze(src, &tables, Some(&index));
	assert!(resolved.diagnostics.is_empty(), "{:#?}", resolved.diagnostics);

	let unknown = analyze("trigger = { no_such_trigger = yes }", &tables, Some(&index));
	let warnings = with_code(&unknown, DiagCode::UnknownIdentifier);
	assert_eq!(warnings.len(), 1);
	assert_eq!(warnings[0].severity, DiagnosticSeverity::WARNING);
}

#[test]
fn scope_comparisons() {
	let tables = tables();
	let mut index = WorkspaceIndex::default();

	let undefined = analyze(
		"my_event = { trigger = { scope:nobody = yes } }",
		&tables,
		Some(&index),
	);

	let undef = with_code(&undefined, DiagCode::UndefinedSavedScope);
	assert_eq!(undefined.diagnostics.len(), 1, "{:#?}", undefined.diagnostics);
	assert_eq!(undef.len(), 1);
	assert_eq!(undefined.ast.slice(undef[0].range), "scope:nobody");

	let both = analyze("my_event = { trigger = { scope:a = scope:b } }", &tables, Some(&index));
	assert_eq!(with_code(&both, DiagCode::UndefinedSavedScope).len(), 2);

	let unindexed = analyze("my_event = { trigger = { scope:a = scope:b } }", &tables, None);
	assert!(unindexed.diagnostics.is_empty(), "{:#?}", unindexed.diagnostics);

	// Scope targets used as keys are never unknown identifiers.
	index.saved_scopes.insert("actor".to_string(), Some("character".to_string()));

	let targets = analyze(
		"my_event = { trigger = { root = scope:actor this = prev liege = root } }",
		&tables,
		Some(&index),
	);

	assert!(targets.diagnostics.is_empty(), "{:#?}", targets.diagnostics);

	let bad_link = analyze(
		"my_event = { trigger = { primary_title.county = root } }",
		&tables,
		Some(&index),
	);

	let unknown = with_code(&bad_link, DiagCode::UnknownScopeLink);
	assert_eq!(unknown.len(), 1);
	assert_eq!(bad_link.ast.slice(unknown[0].range), "county");
}

#[test]
fn scope_lookup_by_position() {
	let tables = tables();
	let title = tables.scopes.kind("title").unwrap();
	let src = "my_event = { immediate = { primary_title = { holder = { } } } }";

	let analysis = Analyzer::new(&tables).analyze(src);
	let offset = TextSize::from(src.find("holder").unwrap() as u32);
	let node = analysis.ast.node_at(offset).unwrap();
	assert_eq!(analysis.ast.key(node), Some("holder"));
	assert_eq!(analysis.ast.ambient_scope(node).map(|s| s.kind), Some(title));

	// With a different root, `primary_title` no longer resolves.
	let rooted = Analyzer::new(&tables).with_root(Some(title)).analyze(src);
	assert_eq!(with_code(&rooted, DiagCode::UnknownScopeLink).len(), 1);
}

#[test]
fn determinism() {
	let tables = tables();

	let src = indoc! {"
		} my_events.1 = {
			trigger = { add_gold = 1 scope:x = { } any_vassal = { count = 1 percent = 1 } }
			immediate = { save_scope_as = x liege.nowhere = yes ! }
			option = { \"unterminated
		"};

	let first = analyze(src, &tables, None);
	let second = analyze(src, &tables, None);
	assert!(!first.diagnostics.is_empty());
	assert_eq!(first.diagnostics, second.diagnostics);

	let lndx = LineIndex::new(src);
	let lsp1: Vec<_> = first.diagnostics.iter().map(|d| d.to_lsp(&lndx)).collect();
	let lsp2: Vec<_> = second.diagnostics.iter().map(|d| d.to_lsp(&lndx)).collect();
	assert_eq!(lsp1, lsp2);

	for pair in first.diagnostics.windows(2) {
		assert!(pair[0].range.start() <= pair[1].range.start());
	}
}

#[test]
fn totality() {
	let tables = StaticTables::builtin().unwrap();
	let deep_open = "a = {".repeat(10_000);
	let deep_scopes = "liege = {".repeat(10_000);
	let long_line = "add_gold = 1 ".repeat(20_000);

	let corpus: [&str; 11] = [
		"",
		"{",
		"}",
		"{}",
		"= = =",
		"\"",
		"/*",
		"scope: . .. :",
		&deep_open,
		&deep_scopes,
		&long_line,
	];

	for src in corpus {
		let analysis = analyze(src, &tables, None);
		let len = TextSize::of(src);

		for diag in &analysis.diagnostics {
			assert!(diag.range.end() <= len);
		}

		for (id, node) in analysis.ast.nodes() {
			assert!(analysis.ast.scope_of(id).is_some());

			if let Some(parent) = node.parent() {
				assert!(analysis.ast.node(parent).range().contains_range(node.range()));
			}
		}
	}

	let truncated: &[&[u8]] = &[b"a = \xe2\x82", b"\xff\xfe{", b"x = { y = \"\xc3"];

	for bytes in truncated {
		let analysis = analyze_bytes(bytes, &tables, None);
		assert!(analysis.ast.text().contains('\u{fffd}'));
	}
}
