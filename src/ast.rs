//! [`Ast`], a flat arena of [`SyntaxNode`]s, and [`FaultMarker`].
//!
//! Nodes are allocated in document pre-order, so a parent's index is always
//! lower than its children's, and a node's whole subtree occupies the
//! contiguous index range `id..subtree_end(id)`. Passes over the tree rely on
//! this to run as flat loops instead of recursion.

use std::cell::OnceCell;

use text_size::{TextRange, TextSize};

use crate::{data::ScopeKind, lex::Operator};

/// A strongly-typed index into [`Ast::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
	#[must_use]
	pub fn index(self) -> usize {
		self.0 as usize
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
	/// `key = { ... }` or an anonymous `{ ... }`.
	Block,
	/// `key = value`, for any operator. The value may be missing if the input
	/// was malformed.
	Assignment,
	/// A bare value with no key, e.g. each element of `{ a b c }`.
	Scalar,
	/// A block whose contents are nothing but [scalars](NodeKind::Scalar).
	List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
	Word,
	Number,
	Str { terminated: bool },
}

#[derive(Debug)]
pub struct SyntaxNode {
	pub(crate) kind: NodeKind,
	pub(crate) key: Option<TextRange>,
	pub(crate) op: Option<Operator>,
	pub(crate) value: Option<(ValueKind, TextRange)>,
	pub(crate) children: Vec<NodeId>,
	pub(crate) parent: Option<NodeId>,
	pub(crate) range: TextRange,
	/// One past the index of this node's last descendant.
	pub(crate) subtree_end: u32,
	pub(crate) scope: OnceCell<NodeScope>,
}

impl SyntaxNode {
	#[must_use]
	pub fn kind(&self) -> NodeKind {
		self.kind
	}

	#[must_use]
	pub fn key_range(&self) -> Option<TextRange> {
		self.key
	}

	#[must_use]
	pub fn operator(&self) -> Option<Operator> {
		self.op
	}

	#[must_use]
	pub fn value_kind(&self) -> Option<ValueKind> {
		self.value.map(|(kind, _)| kind)
	}

	#[must_use]
	pub fn value_range(&self) -> Option<TextRange> {
		self.value.map(|(_, range)| range)
	}

	#[must_use]
	pub fn children(&self) -> &[NodeId] {
		&self.children
	}

	#[must_use]
	pub fn parent(&self) -> Option<NodeId> {
		self.parent
	}

	#[must_use]
	pub fn range(&self) -> TextRange {
		self.range
	}

	/// Blocks and lists can be entered; assignments and scalars can not.
	#[must_use]
	pub fn is_container(&self) -> bool {
		matches!(self.kind, NodeKind::Block | NodeKind::List)
	}
}

/// The cached result of scope inference for one node.
///
/// For containers, `kind` is the scope-kind in effect *inside* the container.
/// For leaves, it is the scope-kind in effect where the leaf appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeScope {
	pub kind: ScopeKind,
	/// What `prev` refers to at this position, if anything.
	pub prev: Option<ScopeKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
	/// A `}` with no open block to close. No node is created for it.
	UnmatchedClose,
	/// A `{` which was still open at the end of the input.
	UnclosedOpen,
	/// An operator with nothing valid after it.
	MissingValue,
	/// An operator with no key before it.
	StrayOperator,
	UnterminatedString,
	UnterminatedComment,
	UnknownCharacter,
}

/// A defect in the input, recorded by the parser instead of raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultMarker {
	pub kind: FaultKind,
	pub anchor: TextRange,
	/// The innermost node enclosing (or, for unclosed blocks, owning) the fault.
	/// `None` if the fault occurred at the top level.
	pub node: Option<NodeId>,
}

#[derive(Debug)]
pub struct Ast {
	pub(crate) text: String,
	pub(crate) nodes: Vec<SyntaxNode>,
	pub(crate) roots: Vec<NodeId>,
	pub(crate) faults: Vec<FaultMarker>,
	pub(crate) comments: Vec<TextRange>,
}

impl Ast {
	#[must_use]
	pub(crate) fn new(text: &str) -> Self {
		Self {
			text: text.to_string(),
			nodes: vec![],
			roots: vec![],
			faults: vec![],
			comments: vec![],
		}
	}

	#[must_use]
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Panics if `range` does not lie in this tree's text.
	#[must_use]
	pub fn slice(&self, range: TextRange) -> &str {
		&self.text[range]
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	#[must_use]
	pub fn node(&self, id: NodeId) -> &SyntaxNode {
		&self.nodes[id.index()]
	}

	#[must_use]
	pub fn get(&self, id: NodeId) -> Option<&SyntaxNode> {
		self.nodes.get(id.index())
	}

	/// All nodes, in document pre-order.
	pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SyntaxNode)> + '_ {
		self.nodes
			.iter()
			.enumerate()
			.map(|(i, node)| (NodeId(i as u32), node))
	}

	/// The top-level nodes of the forest, in document order.
	#[must_use]
	pub fn roots(&self) -> &[NodeId] {
		&self.roots
	}

	/// Sorted by anchor position.
	#[must_use]
	pub fn faults(&self) -> &[FaultMarker] {
		&self.faults
	}

	/// The spans of all line and block comments, in document order.
	#[must_use]
	pub fn comments(&self) -> &[TextRange] {
		&self.comments
	}

	#[must_use]
	pub fn key(&self, id: NodeId) -> Option<&str> {
		self.node(id).key.map(|range| self.slice(range))
	}

	/// The value's text with the quotes of a terminated string removed.
	#[must_use]
	pub fn value(&self, id: NodeId) -> Option<&str> {
		let (kind, range) = self.node(id).value?;
		let text = self.slice(range);

		match kind {
			ValueKind::Str { terminated: true } => text
				.strip_prefix('"')
				.and_then(|t| t.strip_suffix('"'))
				.or(Some(text)),
			ValueKind::Str { terminated: false } => Some(text.strip_prefix('"').unwrap_or(text)),
			ValueKind::Word | ValueKind::Number => Some(text),
		}
	}

	/// Every ancestor of `id`, innermost first. Does not include `id`.
	pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		std::iter::successors(self.node(id).parent, |p| self.node(*p).parent)
	}

	/// The top-level node which `id` belongs to (possibly `id` itself).
	#[must_use]
	pub fn definition_of(&self, id: NodeId) -> NodeId {
		self.ancestors(id).last().unwrap_or(id)
	}

	#[must_use]
	pub fn depth(&self, id: NodeId) -> usize {
		self.ancestors(id).count()
	}

	/// `id` and all of its descendants, in document pre-order.
	pub fn subtree(&self, id: NodeId) -> impl Iterator<Item = NodeId> {
		(id.0..self.node(id).subtree_end).map(NodeId)
	}

	/// The innermost node whose range covers `offset`.
	#[must_use]
	pub fn node_at(&self, offset: TextSize) -> Option<NodeId> {
		let covers = |id: &NodeId| {
			let range = self.node(*id).range;
			range.start() <= offset && offset <= range.end()
		};

		let mut current = self.roots.iter().copied().find(covers)?;

		while let Some(child) = self.node(current).children.iter().copied().find(covers) {
			current = child;
		}

		Some(current)
	}

	/// The scope-kind inferred for this node, if inference has run.
	/// See [`NodeScope`] for what this means for each kind of node.
	#[must_use]
	pub fn scope_of(&self, id: NodeId) -> Option<ScopeKind> {
		self.node(id).scope.get().map(|s| s.kind)
	}

	#[must_use]
	pub fn node_scope(&self, id: NodeId) -> Option<NodeScope> {
		self.node(id).scope.get().copied()
	}

	/// The scope-kind in effect where `id` itself appears; i.e. before any
	/// scope change its own key may introduce.
	#[must_use]
	pub fn ambient_scope(&self, id: NodeId) -> Option<NodeScope> {
		match self.node(id).parent {
			Some(parent) => self.node_scope(parent),
			None => self.node_scope(id),
		}
	}

	// Construction ////////////////////////////////////////////////////////////

	#[must_use]
	pub(crate) fn alloc(
		&mut self,
		kind: NodeKind,
		parent: Option<NodeId>,
		range: TextRange,
	) -> NodeId {
		let id = NodeId(self.nodes.len() as u32);

		self.nodes.push(SyntaxNode {
			kind,
			key: None,
			op: None,
			value: None,
			children: vec![],
			parent,
			range,
			subtree_end: id.0 + 1,
			scope: OnceCell::new(),
		});

		match parent {
			Some(p) => self.nodes[p.index()].children.push(id),
			None => self.roots.push(id),
		}

		id
	}

	#[must_use]
	pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SyntaxNode {
		&mut self.nodes[id.index()]
	}

	/// Returns `false` if the node's scope had already been set.
	pub(crate) fn set_scope(&self, id: NodeId, scope: NodeScope) -> bool {
		self.node(id).scope.set(scope).is_ok()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn node_at_finds_innermost() {
		let ast = crate::parse::parse("a = { b = { c = 1 } }\nd = 2");
		let offset = TextSize::from(ast.text().find("c =").unwrap() as u32);
		let found = ast.node_at(offset).unwrap();
		assert_eq!(ast.key(found), Some("c"));
		assert_eq!(ast.depth(found), 2);
		assert_eq!(ast.key(ast.definition_of(found)), Some("a"));

		let offset = TextSize::from(ast.text().find('d').unwrap() as u32);
		assert_eq!(ast.key(ast.node_at(offset).unwrap()), Some("d"));
	}

	#[test]
	fn subtrees_are_contiguous() {
		let ast = crate::parse::parse("a = { b = { c = 1 } e = 2 } f = { g }");
		let a = ast.roots()[0];
		let keys: Vec<_> = ast.subtree(a).filter_map(|id| ast.key(id)).collect();
		assert_eq!(keys, ["a", "b", "c", "e"]);

		let f = ast.roots()[1];
		assert_eq!(ast.subtree(f).count(), 2);
	}

	#[test]
	fn string_values_are_unquoted() {
		let ast = crate::parse::parse(r#"name = "Harold" broken = "oops"#);
		assert_eq!(ast.value(ast.roots()[0]), Some("Harold"));
		assert_eq!(ast.value(ast.roots()[1]), Some("oops"));

		let escaped = crate::parse::parse(r#"desc = "abc\""#);
		let desc = escaped.roots()[0];
		assert_eq!(escaped.node(desc).value_kind(), Some(ValueKind::Str { terminated: false }));
		assert_eq!(escaped.value(desc), Some(r#"abc\""#));
	}
}
