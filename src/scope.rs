//! Scope-kind inference: resolving navigation chains such as
//! `liege.primary_title.holder`, and tagging every node with the scope-kind
//! in effect there.

use text_size::{TextRange, TextSize};
use tracing::debug;

use crate::{
	ast::{Ast, NodeId, NodeKind, NodeScope, ValueKind},
	context::{self, IteratorKind},
	data::{AnalysisConfig, Namespace, ScopeKind, StaticTables, Universal, WorkspaceIndex},
	FxIndexMap,
};

// Chain resolution ////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
	/// E.g. the middle of `liege..holder`.
	EmptySegment,
	UnknownLink { from: ScopeKind },
	/// An iterator over a list which does not exist on the current scope-kind.
	UnknownList { from: ScopeKind },
	UndefinedSaved(Namespace),
	/// Iterators can only end a chain.
	MisplacedIterator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
	/// Index of the failing segment.
	pub index: usize,
	/// Relative to the start of the chain.
	pub range: TextRange,
	pub segment: String,
	pub reason: FailReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChainResult {
	/// The starting scope-kind, then one more per successfully resolved segment.
	pub kinds: Vec<ScopeKind>,
	/// Set if the chain ends with an iterator.
	pub iterator: Option<IteratorKind>,
	/// The first segment which did not resolve. Resolution halts there.
	pub failure: Option<ChainFailure>,
}

impl ScopeChainResult {
	#[must_use]
	pub fn is_valid(&self) -> bool {
		self.failure.is_none()
	}

	/// `None` if the chain is invalid.
	#[must_use]
	pub fn final_kind(&self) -> Option<ScopeKind> {
		if self.is_valid() {
			self.kinds.last().copied()
		} else {
			None
		}
	}
}

/// The outcome of looking up a saved scope or event target by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedLookup {
	Found(ScopeKind),
	/// Definitely never bound.
	Missing,
	/// Possibly bound somewhere this analysis can not see.
	Unknown,
}

/// Where a chain can look up `scope:<name>` and `event_target:<name>`.
pub trait SavedScopes {
	#[must_use]
	fn lookup(&self, namespace: Namespace, name: &str) -> SavedLookup;
}

/// Knows of no saved scopes, and so never declares one missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSavedScopes;

impl SavedScopes for NoSavedScopes {
	fn lookup(&self, _: Namespace, _: &str) -> SavedLookup {
		SavedLookup::Unknown
	}
}

/// Resolves chains against one set of tables.
pub struct Resolver<'a> {
	tables: &'a StaticTables,
	saved: &'a dyn SavedScopes,
	/// What `root` refers to.
	root: ScopeKind,
}

impl<'a> Resolver<'a> {
	#[must_use]
	pub fn new(tables: &'a StaticTables, saved: &'a dyn SavedScopes, root: ScopeKind) -> Self {
		Self {
			tables,
			saved,
			root,
		}
	}

	/// Resolves `chain` starting in `start`, with no `prev` in effect.
	#[must_use]
	pub fn resolve(&self, chain: &str, start: ScopeKind) -> ScopeChainResult {
		self.resolve_from(
			chain,
			NodeScope {
				kind: start,
				prev: None,
			},
		)
	}

	#[must_use]
	pub fn resolve_from(&self, chain: &str, start: NodeScope) -> ScopeChainResult {
		let mut ret = ScopeChainResult {
			kinds: vec![start.kind],
			iterator: None,
			failure: None,
		};

		let mut current = start.kind;
		let mut prev = start.prev;
		let mut offset = 0;
		let count = chain.split('.').count();

		for (index, segment) in chain.split('.').enumerate() {
			let range = TextRange::at(
				TextSize::from(offset as u32),
				TextSize::of(segment),
			);

			offset += segment.len() + 1;

			let fail = |reason| ChainFailure {
				index,
				range,
				segment: segment.to_string(),
				reason,
			};

			let next = match self.segment(segment, current, prev, index + 1 == count) {
				Ok(Step::Kind(kind)) => kind,
				Ok(Step::Iterator(iter, kind)) => {
					ret.iterator = Some(iter);
					kind
				}
				Err(reason) => {
					ret.failure = Some(fail(reason));
					break;
				}
			};

			prev = Some(current);
			current = next;
			ret.kinds.push(current);
		}

		ret
	}

	fn segment(
		&self,
		segment: &str,
		current: ScopeKind,
		prev: Option<ScopeKind>,
		last: bool,
	) -> Result<Step, FailReason> {
		let scopes = &self.tables.scopes;

		if segment.is_empty() {
			return Err(FailReason::EmptySegment);
		}

		if let Some(universal) = scopes.universal(segment) {
			let kind = match universal {
				Universal::Root => self.root,
				Universal::This => current,
				Universal::Prev => prev.unwrap_or(ScopeKind::ANY),
				Universal::Kind(kind) => kind,
			};

			return Ok(Step::Kind(kind));
		}

		if let Some((prefix, name)) = split_prefix(segment) {
			if name.is_empty() {
				return Err(FailReason::EmptySegment);
			}

			if let Some(ns) = self.tables.config.reference_namespace(prefix) {
				if !ns.holds_scope() {
					return Ok(Step::Kind(ScopeKind::ANY));
				}

				return match self.saved.lookup(ns, name) {
					SavedLookup::Found(kind) => Ok(Step::Kind(kind)),
					SavedLookup::Unknown => Ok(Step::Kind(ScopeKind::ANY)),
					SavedLookup::Missing => Err(FailReason::UndefinedSaved(ns)),
				};
			}

			// Database prefixes the tables do not know of are given the
			// benefit of the doubt; the tables are never complete.
			return Ok(Step::Kind(scopes.prefix(prefix).unwrap_or(ScopeKind::ANY)));
		}

		if let Some((iter, list)) = context::iterator(self.tables, segment) {
			let Some(element) = scopes.list(current, list) else {
				return Err(FailReason::UnknownList { from: current });
			};

			if !last {
				return Err(FailReason::MisplacedIterator);
			}

			return Ok(Step::Iterator(iter, element));
		}

		match scopes.link(current, segment) {
			Some(kind) => Ok(Step::Kind(kind)),
			None if current.is_any() => Ok(Step::Kind(ScopeKind::ANY)),
			None => Err(FailReason::UnknownLink { from: current }),
		}
	}
}

enum Step {
	Kind(ScopeKind),
	Iterator(IteratorKind, ScopeKind),
}

/// Splits `title:k_france` into `("title", "k_france")`.
#[must_use]
pub(crate) fn split_prefix(segment: &str) -> Option<(&str, &str)> {
	segment
		.split_once(':')
		.filter(|(prefix, _)| !prefix.is_empty())
}

/// Where in the syntax a word is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSite {
	/// `<chain> = { ... }`; the chain becomes the block's scope-kind.
	BlockKey,
	/// `<chain>.<value> >= 5`, where everything before the last segment is a
	/// chain, or `<target> = <target>`, where all of it is.
	AssignmentKey,
	/// `key = <chain>`.
	Value,
}

/// If `word` at `site` looks like a navigation chain, returns the part of it
/// which should be resolved.
///
/// Words which would be treated as chains by the host are not always
/// navigations in intent (e.g. event IDs like `my_events.1`), so each site
/// only accepts forms which are unambiguous.
#[must_use]
pub fn chain_text<'w>(tables: &StaticTables, site: ChainSite, word: &'w str) -> Option<&'w str> {
	let scopes = &tables.scopes;
	let universal = |w: &str| scopes.universal(w).is_some();

	let anchorable = |first: &str| {
		universal(first)
			|| split_prefix(first).is_some()
			|| scopes.is_known_link(first)
			|| context::iterator(tables, first).is_some()
	};

	let dotted = word
		.split_once('.')
		.filter(|(first, _)| anchorable(first))
		.is_some();

	match site {
		ChainSite::BlockKey => {
			let single = universal(word)
				|| split_prefix(word).is_some()
				|| context::iterator(tables, word).is_some()
				|| (scopes.is_known_link(word) && !tables.names.contains(word));

			(dotted || single).then_some(word)
		}
		ChainSite::AssignmentKey => {
			// `scope:x = yes`, `root = prev` and `liege = scope:y` compare targets.
			let target = |w: &str| {
				universal(w)
					|| split_prefix(w).is_some()
					|| (scopes.is_known_link(w) && !tables.names.contains(w))
			};

			let Some((chain, last)) = word.rsplit_once('.') else {
				return target(word).then_some(word);
			};

			if !dotted {
				return None;
			}

			Some(if target(last) { word } else { chain })
		}
		ChainSite::Value => {
			(dotted || split_prefix(word).is_some() || universal(word)).then_some(word)
		}
	}
}

// Saved scopes ////////////////////////////////////////////////////////////////

/// A name bound by `save_scope_as` or the like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedScopeBinding {
	pub name: String,
	pub namespace: Namespace,
	/// The binding statement itself.
	pub node: NodeId,
	/// Where the name was written.
	pub name_range: TextRange,
	/// The top-level node the binding is in.
	pub definition: NodeId,
	/// See [`AnalysisConfig::phases`]. `None` if the binding is not under any
	/// phase-introducing block.
	pub phase: Option<usize>,
}

/// Every binding in one document, collected purely syntactically.
#[derive(Debug, Default)]
pub struct Bindings {
	by_name: FxIndexMap<(Namespace, String), Vec<SavedScopeBinding>>,
}

impl Bindings {
	#[must_use]
	pub fn collect(ast: &Ast, config: &AnalysisConfig) -> Self {
		let mut ret = Self::default();

		for (id, node) in ast.nodes() {
			let Some(namespace) = ast.key(id).and_then(|k| config.binding_namespace(k)) else {
				continue;
			};

			let name = match node.kind() {
				NodeKind::Assignment => node.value_range(),
				NodeKind::Block => node.children().iter().find_map(|child| {
					(ast.key(*child) == Some("name"))
						.then(|| ast.node(*child).value_range())
						.flatten()
				}),
				NodeKind::Scalar | NodeKind::List => None,
			};

			let Some(name_range) = name else {
				continue;
			};

			let name = ast.slice(name_range).trim_matches('"');

			if name.is_empty() {
				continue;
			}

			ret.by_name
				.entry((namespace, name.to_string()))
				.or_default()
				.push(SavedScopeBinding {
					name: name.to_string(),
					namespace,
					node: id,
					name_range,
					definition: ast.definition_of(id),
					phase: phase_of(ast, id, config),
				});
		}

		debug!("Collected {} saved-scope names.", ret.by_name.len());
		ret
	}

	/// Every binding of `name` in `namespace`, in document order.
	#[must_use]
	pub fn get(&self, namespace: Namespace, name: &str) -> &[SavedScopeBinding] {
		self.by_name
			.get(&(namespace, name.to_string()))
			.map_or(&[], |v| v.as_slice())
	}

	pub fn iter(&self) -> impl Iterator<Item = &SavedScopeBinding> {
		self.by_name.values().flatten()
	}
}

/// The evaluation phase of the definition's immediate child containing `node`.
#[must_use]
pub fn phase_of(ast: &Ast, node: NodeId, config: &AnalysisConfig) -> Option<usize> {
	let mut child = node;

	for ancestor in ast.ancestors(node) {
		if ast.node(ancestor).parent().is_none() {
			return ast.key(child).and_then(|key| config.phase_of(key));
		}

		child = ancestor;
	}

	None
}

/// Answers saved-scope lookups for one document, backed by an optional
/// workspace index for names bound in other files.
pub struct DocumentEnv<'a> {
	ast: &'a Ast,
	bindings: &'a Bindings,
	index: Option<&'a WorkspaceIndex>,
	tables: &'a StaticTables,
}

impl<'a> DocumentEnv<'a> {
	#[must_use]
	pub fn new(
		ast: &'a Ast,
		bindings: &'a Bindings,
		tables: &'a StaticTables,
		index: Option<&'a WorkspaceIndex>,
	) -> Self {
		Self {
			ast,
			bindings,
			index,
			tables,
		}
	}

	/// Will names unknown to both this document and the index be reported?
	#[must_use]
	pub fn strict(&self) -> bool {
		self.index.is_some() || self.tables.config.report_unknown_without_index
	}
}

impl SavedScopes for DocumentEnv<'_> {
	fn lookup(&self, namespace: Namespace, name: &str) -> SavedLookup {
		let local = self.bindings.get(namespace, name);

		if !local.is_empty() {
			// Before inference reaches the binding, its kind is not known.
			let mut kinds = local
				.iter()
				.map(|b| self.ast.ambient_scope(b.node).map_or(ScopeKind::ANY, |s| s.kind));

			let first = kinds.next().unwrap_or(ScopeKind::ANY);

			if kinds.all(|k| k == first) {
				return SavedLookup::Found(first);
			}

			return SavedLookup::Found(ScopeKind::ANY);
		}

		if let Some(index) = self.index {
			return match index.saved_scope(name) {
				Some(Some(kind)) => {
					SavedLookup::Found(self.tables.scopes.kind(kind).unwrap_or(ScopeKind::ANY))
				}
				Some(None) => SavedLookup::Found(ScopeKind::ANY),
				None => SavedLookup::Missing,
			};
		}

		if self.tables.config.report_unknown_without_index {
			SavedLookup::Missing
		} else {
			SavedLookup::Unknown
		}
	}
}

// Inference ///////////////////////////////////////////////////////////////////

/// Tags every node with the scope-kind in effect there; see [`NodeScope`].
///
/// Nodes are visited in index order, so each parent's scope is known before
/// any of its children are reached.
pub fn infer(ast: &Ast, tables: &StaticTables, root: ScopeKind, env: &dyn SavedScopes) {
	let resolver = Resolver::new(tables, env, root);
	let mut changes = 0;

	for (id, node) in ast.nodes() {
		let outer = match node.parent() {
			Some(parent) => ast.node_scope(parent).unwrap_or(NodeScope {
				kind: ScopeKind::ANY,
				prev: None,
			}),
			None => NodeScope {
				kind: root,
				prev: None,
			},
		};

		let mut scope = outer;

		if node.is_container() && node.parent().is_some() {
			let chain = ast
				.key(id)
				.and_then(|key| chain_text(tables, ChainSite::BlockKey, key));

			if let Some(chain) = chain {
				let result = resolver.resolve_from(chain, outer);

				scope = NodeScope {
					kind: result.final_kind().unwrap_or(ScopeKind::ANY),
					prev: Some(outer.kind),
				};

				changes += 1;
			}
		}

		let fresh = ast.set_scope(id, scope);
		debug_assert!(fresh, "node {} was inferred twice", id.index());
	}

	debug!("Inferred scopes for {} nodes ({changes} scope changes).", ast.len());
}

/// Resolves the chain-bearing parts of a node against its cached scope.
/// Each yielded range is absolute, covering the whole chain.
pub(crate) fn chains_of<'a>(
	ast: &'a Ast,
	tables: &StaticTables,
	id: NodeId,
) -> Vec<(&'a str, TextRange)> {
	let node = ast.node(id);
	let mut ret = vec![];

	if node.parent().is_none() {
		return ret;
	}

	if let Some(key_range) = node.key_range() {
		let site = match node.kind() {
			NodeKind::Block | NodeKind::List => ChainSite::BlockKey,
			_ => ChainSite::AssignmentKey,
		};

		let key = ast.slice(key_range);

		if let Some(chain) = chain_text(tables, site, key) {
			ret.push((chain, TextRange::at(key_range.start(), TextSize::of(chain))));
		}
	}

	let binds = ast
		.key(id)
		.is_some_and(|k| tables.config.binding_namespace(k).is_some())
		|| node.parent().and_then(|p| ast.key(p)).is_some_and(|k| {
			tables.config.binding_namespace(k).is_some() && ast.key(id) == Some("name")
		});

	if node.kind() == NodeKind::Assignment && !binds {
		if let Some((ValueKind::Word, range)) = node.value {
			let value = ast.slice(range);

			if let Some(chain) = chain_text(tables, ChainSite::Value, value) {
				ret.push((chain, TextRange::at(range.start(), TextSize::of(chain))));
			}
		}
	}

	ret
}
