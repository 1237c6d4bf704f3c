//! Static, read-only tables injected into the analysis core.
//!
//! Raw forms (`Raw*`) are what gets deserialized; they are compiled once into
//! lookup structures and never mutated afterwards, so one [`StaticTables`]
//! can be shared by any number of concurrent analyses.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use tracing::debug;

use crate::FxIndexMap;

/// A game-object category: the DSL's de facto type.
///
/// An index into a [`ScopeTable`], or [`ScopeKind::ANY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeKind(pub(crate) u16);

impl ScopeKind {
	/// The scope-kind could not be determined. Every lookup against it is
	/// answered permissively, so that one unknown never cascades.
	pub const ANY: Self = Self(u16::MAX);

	#[must_use]
	pub fn is_any(self) -> bool {
		self == Self::ANY
	}
}

// Scope kinds /////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeKindDefinition {
	pub name: String,
	/// Single-valued navigations, e.g. `liege -> character`.
	#[serde(default)]
	pub links: FxIndexMap<String, String>,
	/// Navigations to collections, e.g. `vassal -> character`,
	/// only traversable via an iterator prefix.
	#[serde(default)]
	pub lists: FxIndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawScopeTable {
	pub kinds: Vec<ScopeKindDefinition>,
	/// Names valid from any scope-kind. Values are either a scope-kind name,
	/// or one of `$root`, `$this` and `$prev`.
	#[serde(default)]
	pub universal: FxIndexMap<String, String>,
	/// Database prefixes which yield a scope-kind, e.g. `title:k_france`.
	#[serde(default)]
	pub prefixes: FxIndexMap<String, String>,
	/// Prefixes which yield a value of no fixed kind, e.g. `var:gold_owed`.
	#[serde(default)]
	pub value_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Universal {
	Root,
	This,
	Prev,
	Kind(ScopeKind),
}

#[derive(Debug)]
struct KindEntry {
	name: Box<str>,
	links: FxHashMap<Box<str>, ScopeKind>,
	lists: FxHashMap<Box<str>, ScopeKind>,
}

/// The compiled form of a [`RawScopeTable`].
#[derive(Debug)]
pub struct ScopeTable {
	kinds: Vec<KindEntry>,
	by_name: FxHashMap<Box<str>, ScopeKind>,
	/// Keys are lowercase; the DSL accepts `ROOT` and `root` alike.
	universal: FxHashMap<Box<str>, Universal>,
	prefixes: FxHashMap<Box<str>, ScopeKind>,
	value_prefixes: FxHashSet<Box<str>>,
	/// Every link name of every kind, mapped to its target if all kinds agree.
	any_links: FxHashMap<Box<str>, ScopeKind>,
	any_lists: FxHashMap<Box<str>, ScopeKind>,
}

impl ScopeTable {
	pub fn from_raw(raw: RawScopeTable) -> Result<Self, DataError> {
		let mut by_name = FxHashMap::default();

		for (i, def) in raw.kinds.iter().enumerate() {
			if def.name == "any" || by_name.insert(def.name.clone().into_boxed_str(), ScopeKind(i as u16)).is_some() {
				return Err(DataError::DuplicateKind(def.name.clone()));
			}
		}

		let lookup = |owner: &str, target: &str| -> Result<ScopeKind, DataError> {
			if target == "any" {
				return Ok(ScopeKind::ANY);
			}

			by_name
				.get(target)
				.copied()
				.ok_or_else(|| DataError::UnknownKind {
					referenced_by: owner.to_string(),
					name: target.to_string(),
				})
		};

		let mut kinds = Vec::with_capacity(raw.kinds.len());
		let mut any_links = FxHashMap::default();
		let mut any_lists = FxHashMap::default();

		for def in &raw.kinds {
			let mut entry = KindEntry {
				name: def.name.clone().into_boxed_str(),
				links: FxHashMap::default(),
				lists: FxHashMap::default(),
			};

			for (link, target) in &def.links {
				let kind = lookup(&format!("{}.{link}", def.name), target)?;
				entry.links.insert(link.clone().into_boxed_str(), kind);
				merge_target(&mut any_links, link, kind);
			}

			for (list, target) in &def.lists {
				let kind = lookup(&format!("{}.{list}", def.name), target)?;
				entry.lists.insert(list.clone().into_boxed_str(), kind);
				merge_target(&mut any_lists, list, kind);
			}

			kinds.push(entry);
		}

		let mut universal = FxHashMap::default();

		for (name, target) in &raw.universal {
			let u = match target.as_str() {
				"$root" => Universal::Root,
				"$this" => Universal::This,
				"$prev" => Universal::Prev,
				other => Universal::Kind(lookup(name, other)?),
			};

			universal.insert(name.to_ascii_lowercase().into_boxed_str(), u);
		}

		let mut prefixes = FxHashMap::default();

		for (prefix, target) in &raw.prefixes {
			prefixes.insert(
				prefix.clone().into_boxed_str(),
				lookup(&format!("{prefix}:"), target)?,
			);
		}

		debug!(
			"Scope table compiled: {} kinds, {} links, {} lists.",
			kinds.len(),
			any_links.len(),
			any_lists.len()
		);

		Ok(Self {
			kinds,
			by_name,
			universal,
			prefixes,
			value_prefixes: raw
				.value_prefixes
				.into_iter()
				.map(String::into_boxed_str)
				.collect(),
			any_links,
			any_lists,
		})
	}

	#[must_use]
	pub fn kind(&self, name: &str) -> Option<ScopeKind> {
		self.by_name.get(name).copied()
	}

	#[must_use]
	pub fn name(&self, kind: ScopeKind) -> &str {
		self.kinds
			.get(kind.0 as usize)
			.map_or("any", |entry| &entry.name)
	}

	/// Resolves `name` as a link on `from`. From [`ScopeKind::ANY`], any link
	/// name known to the table is accepted.
	#[must_use]
	pub fn link(&self, from: ScopeKind, name: &str) -> Option<ScopeKind> {
		match self.kinds.get(from.0 as usize) {
			Some(entry) => entry.links.get(name).copied(),
			None => self.any_links.get(name).copied(),
		}
	}

	/// Resolves `name` as a list on `from`, yielding the element scope-kind.
	#[must_use]
	pub fn list(&self, from: ScopeKind, name: &str) -> Option<ScopeKind> {
		match self.kinds.get(from.0 as usize) {
			Some(entry) => entry.lists.get(name).copied(),
			None => self.any_lists.get(name).copied(),
		}
	}

	#[must_use]
	pub fn is_known_link(&self, name: &str) -> bool {
		self.any_links.contains_key(name)
	}

	#[must_use]
	pub fn is_known_list(&self, name: &str) -> bool {
		self.any_lists.contains_key(name)
	}

	#[must_use]
	pub fn universal(&self, name: &str) -> Option<Universal> {
		if let Some(u) = self.universal.get(name) {
			return Some(*u);
		}

		if name.bytes().any(|b| b.is_ascii_uppercase()) {
			return self.universal.get(name.to_ascii_lowercase().as_str()).copied();
		}

		None
	}

	#[must_use]
	pub fn prefix(&self, prefix: &str) -> Option<ScopeKind> {
		self.prefixes.get(prefix).copied()
	}

	#[must_use]
	pub fn is_value_prefix(&self, prefix: &str) -> bool {
		self.value_prefixes.contains(prefix)
	}

	/// All scope-kinds in declaration order.
	pub fn kinds(&self) -> impl Iterator<Item = ScopeKind> + '_ {
		(0..self.kinds.len()).map(|i| ScopeKind(i as u16))
	}
}

fn merge_target(map: &mut FxHashMap<Box<str>, ScopeKind>, name: &str, kind: ScopeKind) {
	match map.get_mut(name) {
		Some(existing) if *existing != kind => *existing = ScopeKind::ANY,
		Some(_) => {}
		None => {
			map.insert(name.to_string().into_boxed_str(), kind);
		}
	}
}

// Identifier sets /////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNameSets {
	#[serde(default)]
	pub effects: Vec<String>,
	#[serde(default)]
	pub triggers: Vec<String>,
}

/// Whether an identifier mutates state, tests state, or may do either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameClass {
	Effect,
	Trigger,
	/// Listed as both, or only known to be valid somewhere.
	Both,
	Unknown,
}

#[derive(Debug, Default)]
pub struct NameSets {
	effects: FxHashSet<Box<str>>,
	triggers: FxHashSet<Box<str>>,
}

impl NameSets {
	#[must_use]
	pub fn from_raw(raw: RawNameSets) -> Self {
		Self {
			effects: raw.effects.into_iter().map(String::into_boxed_str).collect(),
			triggers: raw.triggers.into_iter().map(String::into_boxed_str).collect(),
		}
	}

	#[must_use]
	pub fn classify(&self, name: &str) -> NameClass {
		match (self.effects.contains(name), self.triggers.contains(name)) {
			(true, true) => NameClass::Both,
			(true, false) => NameClass::Effect,
			(false, true) => NameClass::Trigger,
			(false, false) => NameClass::Unknown,
		}
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.classify(name) != NameClass::Unknown
	}
}

// Configuration ///////////////////////////////////////////////////////////////

/// The namespace a saved value lives in, and is referenced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
	/// `save_scope_as = x` ... `scope:x`.
	Scope,
	/// `save_event_target_as = x` ... `event_target:x`.
	EventTarget,
	/// `set_variable = x` ... `var:x`.
	Variable,
}

impl Namespace {
	#[must_use]
	pub fn prefix(self) -> &'static str {
		match self {
			Self::Scope => "scope",
			Self::EventTarget => "event_target",
			Self::Variable => "var",
		}
	}

	/// Do references in this namespace evaluate to a scope-kind?
	#[must_use]
	pub fn holds_scope(self) -> bool {
		matches!(self, Self::Scope | Self::EventTarget)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BindingKey {
	pub key: String,
	pub namespace: Namespace,
}

/// Tunable data driving context classification and the evaluation-order check.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
	/// The scope-kind each top-level definition starts in.
	pub default_root: String,
	/// Block keys whose contents are conditions.
	pub trigger_keys: Vec<String>,
	/// Block keys whose contents are state changes.
	pub effect_keys: Vec<String>,
	/// Block keys which neither introduce a context nor take arguments;
	/// their contents inherit the enclosing context.
	pub transparent_keys: Vec<String>,
	/// Groups of top-level keys, in the order the host evaluates them.
	pub phases: Vec<Vec<String>>,
	/// Keys which bind a name for later reference.
	pub bindings: Vec<BindingKey>,
	/// Reference prefixes checked against bindings, e.g. `scope` and `var`.
	pub references: FxIndexMap<String, Namespace>,
	/// Report unknown identifiers and undefined saved scopes even when no
	/// workspace index was supplied to confirm they are not defined elsewhere.
	pub report_unknown_without_index: bool,
}

impl Default for AnalysisConfig {
	fn default() -> Self {
		fn strings(s: &[&str]) -> Vec<String> {
			s.iter().map(|s| s.to_string()).collect()
		}

		Self {
			default_root: "character".to_string(),
			trigger_keys: strings(&[
				"trigger",
				"limit",
				"is_shown",
				"is_valid",
				"is_valid_showing_failures_only",
				"potential",
				"allow",
				"can_start",
				"can_be_picked",
				"is_highlighted",
				"ai_will_do_trigger",
			]),
			effect_keys: strings(&[
				"immediate",
				"option",
				"effect",
				"after",
				"on_accept",
				"on_decline",
				"hidden_effect",
				"on_start",
				"on_end",
			]),
			transparent_keys: strings(&[
				"if",
				"else_if",
				"else",
				"while",
				"trigger_if",
				"trigger_else_if",
				"trigger_else",
				"AND",
				"OR",
				"NOT",
				"NOR",
				"NAND",
				"random_list",
				"random",
				"hidden_effect",
			]),
			phases: vec![
				strings(&["trigger", "is_shown", "is_valid", "potential", "allow", "weight_multiplier"]),
				strings(&["title", "desc"]),
				strings(&["immediate"]),
				strings(&[
					"option",
					"after",
					"left_portrait",
					"right_portrait",
					"lower_left_portrait",
					"lower_center_portrait",
					"lower_right_portrait",
					"artifact",
				]),
			],
			bindings: vec![
				BindingKey {
					key: "save_scope_as".to_string(),
					namespace: Namespace::Scope,
				},
				BindingKey {
					key: "save_temporary_scope_as".to_string(),
					namespace: Namespace::Scope,
				},
				BindingKey {
					key: "save_event_target_as".to_string(),
					namespace: Namespace::EventTarget,
				},
				BindingKey {
					key: "set_variable".to_string(),
					namespace: Namespace::Variable,
				},
				BindingKey {
					key: "set_local_variable".to_string(),
					namespace: Namespace::Variable,
				},
			],
			references: [
				("scope", Namespace::Scope),
				("event_target", Namespace::EventTarget),
				("var", Namespace::Variable),
				("local_var", Namespace::Variable),
			]
			.into_iter()
			.map(|(prefix, ns)| (prefix.to_string(), ns))
			.collect(),
			report_unknown_without_index: false,
		}
	}
}

impl AnalysisConfig {
	/// The position of `key` in [`Self::phases`], if it introduces a phase.
	#[must_use]
	pub fn phase_of(&self, key: &str) -> Option<usize> {
		self.phases
			.iter()
			.position(|group| group.iter().any(|k| k == key))
	}

	#[must_use]
	pub fn binding_namespace(&self, key: &str) -> Option<Namespace> {
		self.bindings
			.iter()
			.find_map(|b| (b.key == key).then_some(b.namespace))
	}

	#[must_use]
	pub fn reference_namespace(&self, prefix: &str) -> Option<Namespace> {
		self.references.get(prefix).copied()
	}
}

// Bundle //////////////////////////////////////////////////////////////////////

#[derive(Debug, Default, Deserialize)]
pub struct RawStaticTables {
	pub scopes: RawScopeTable,
	#[serde(default)]
	pub names: RawNameSets,
	#[serde(default)]
	pub config: Option<AnalysisConfig>,
}

/// Everything the analysis core reads but never writes.
#[derive(Debug)]
pub struct StaticTables {
	pub scopes: ScopeTable,
	pub names: NameSets,
	pub config: AnalysisConfig,
	default_root: ScopeKind,
}

impl StaticTables {
	pub fn new(
		scopes: ScopeTable,
		names: NameSets,
		config: AnalysisConfig,
	) -> Result<Self, DataError> {
		let default_root = scopes
			.kind(&config.default_root)
			.ok_or_else(|| DataError::UnknownRoot(config.default_root.clone()))?;

		Ok(Self {
			scopes,
			names,
			config,
			default_root,
		})
	}

	pub fn from_raw(raw: RawStaticTables) -> Result<Self, DataError> {
		Self::new(
			ScopeTable::from_raw(raw.scopes)?,
			NameSets::from_raw(raw.names),
			raw.config.unwrap_or_default(),
		)
	}

	pub fn from_json(json: &str) -> Result<Self, DataError> {
		let raw: RawStaticTables = serde_json::from_str(json)?;
		Self::from_raw(raw)
	}

	/// The tables shipped with the binary.
	pub fn builtin() -> Result<Self, DataError> {
		Self::from_json(include_str!("../data/builtin.json"))
	}

	#[must_use]
	pub fn default_root(&self) -> ScopeKind {
		self.default_root
	}

	/// Replace the analysis configuration, e.g. after a settings change.
	pub fn with_config(self, config: AnalysisConfig) -> Result<Self, DataError> {
		Self::new(self.scopes, self.names, config)
	}
}

// Workspace index /////////////////////////////////////////////////////////////

/// Cross-file knowledge supplied by a workspace indexer.
///
/// The mere presence of an index (even an empty one) tells the core that
/// names missing from it are genuinely undefined, rather than possibly
/// defined in some other file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceIndex {
	/// Scripted effects, scripted triggers and the like.
	#[serde(default)]
	pub identifiers: FxHashSet<String>,
	/// Saved scopes and event targets bound in other files, with the name of
	/// their scope-kind if the indexer knows it.
	#[serde(default)]
	pub saved_scopes: FxHashMap<String, Option<String>>,
}

impl WorkspaceIndex {
	#[must_use]
	pub fn has_identifier(&self, name: &str) -> bool {
		self.identifiers.contains(name)
	}

	/// `None` if unknown to the index; `Some(None)` if known but of no
	/// recorded scope-kind.
	#[must_use]
	pub fn saved_scope(&self, name: &str) -> Option<Option<&str>> {
		self.saved_scopes.get(name).map(|k| k.as_deref())
	}
}

// DataError ///////////////////////////////////////////////////////////////////

/// Failures to compile static tables.
#[derive(Debug)]
pub enum DataError {
	Json(serde_json::Error),
	/// A link, list, prefix or universal name targets a scope-kind which
	/// was never declared.
	UnknownKind {
		referenced_by: String,
		name: String,
	},
	DuplicateKind(String),
	/// The configured default root is not a declared scope-kind.
	UnknownRoot(String),
}

impl std::error::Error for DataError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Json(err) => Some(err),
			_ => None,
		}
	}
}

impl std::fmt::Display for DataError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Json(err) => write!(f, "malformed table JSON: {err}"),
			Self::UnknownKind {
				referenced_by,
				name,
			} => write!(f, "`{referenced_by}` refers to unknown scope-kind `{name}`"),
			Self::DuplicateKind(name) => write!(f, "scope-kind `{name}` is declared more than once"),
			Self::UnknownRoot(name) => write!(f, "default root `{name}` is not a scope-kind"),
		}
	}
}

impl From<serde_json::Error> for DataError {
	fn from(value: serde_json::Error) -> Self {
		Self::Json(value)
	}
}

#[cfg(test)]
pub(crate) mod test {
	use super::*;

	/// The table used throughout the crate's tests: small, but covering every
	/// kind of lookup.
	#[must_use]
	pub(crate) fn tables() -> StaticTables {
		StaticTables::from_json(
			r#"{
			"scopes": {
				"kinds": [
					{
						"name": "character",
						"links": { "liege": "character", "primary_title": "title", "father": "character", "capital_province": "province" },
						"lists": { "vassal": "character", "courtier": "character", "child": "character" }
					},
					{
						"name": "title",
						"links": { "holder": "character", "de_jure_liege": "title" },
						"lists": { "de_jure_vassal": "title" }
					},
					{
						"name": "province",
						"links": { "county": "title" }
					}
				],
				"universal": { "root": "$root", "this": "$this", "prev": "$prev" },
				"prefixes": { "title": "title", "character": "character" },
				"value_prefixes": ["var", "local_var", "global_var", "flag"]
			},
			"names": {
				"effects": ["add_gold", "save_scope_as", "set_variable", "add_trait", "trigger_event", "death"],
				"triggers": ["is_adult", "gold", "has_trait", "exists", "is_alive", "age"]
			}
		}"#,
		)
		.unwrap()
	}

	#[test]
	fn smoke_tables() {
		let tables = tables();
		let scopes = &tables.scopes;
		let character = scopes.kind("character").unwrap();
		let title = scopes.kind("title").unwrap();

		assert_eq!(tables.default_root(), character);
		assert_eq!(scopes.link(character, "primary_title"), Some(title));
		assert_eq!(scopes.link(character, "holder"), None);
		assert_eq!(scopes.link(ScopeKind::ANY, "holder"), Some(character));
		assert_eq!(scopes.list(character, "vassal"), Some(character));
		assert_eq!(scopes.universal("ROOT"), Some(Universal::Root));
		assert_eq!(scopes.prefix("title"), Some(title));
		assert!(scopes.is_value_prefix("var"));
		assert_eq!(scopes.name(ScopeKind::ANY), "any");
		assert_eq!(tables.names.classify("add_gold"), NameClass::Effect);
		assert_eq!(tables.names.classify("gold"), NameClass::Trigger);
	}

	#[test]
	fn bad_tables() {
		let unknown = StaticTables::from_json(
			r#"{ "scopes": { "kinds": [{ "name": "a", "links": { "b": "nowhere" } }] } }"#,
		);

		assert!(matches!(unknown, Err(DataError::UnknownKind { .. })));

		let duplicate = StaticTables::from_json(
			r#"{ "scopes": { "kinds": [{ "name": "character" }, { "name": "character" }] } }"#,
		);

		assert!(matches!(duplicate, Err(DataError::DuplicateKind(_))));

		let rootless = StaticTables::from_json(r#"{ "scopes": { "kinds": [{ "name": "a" }] } }"#);
		assert!(matches!(rootless, Err(DataError::UnknownRoot(_))));
	}

	#[test]
	fn builtin_tables_load() {
		let tables = StaticTables::builtin().unwrap();
		assert_eq!(tables.scopes.name(tables.default_root()), "character");
		assert_eq!(tables.config.phase_of("immediate"), Some(2));
	}
}
