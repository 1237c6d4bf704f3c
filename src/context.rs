//! Effect-versus-trigger context classification, and list-iterator contracts.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
	ast::{Ast, NodeId},
	data::{NameClass, StaticTables},
	scope::{self, ChainSite},
};

/// What a block's contents are expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
	/// State-mutating operations.
	Effect,
	/// State-testing conditions.
	Trigger,
	/// Neither; e.g. the top level of a definition, or the arguments of an
	/// effect such as `add_opinion = { ... }`.
	Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IteratorKind {
	/// `any_<list>`: is the condition true for any (or `count`/`percent`) elements?
	Any,
	/// `every_<list>`: apply to all elements.
	Every,
	/// `random_<list>`: apply to one random element.
	Random,
	/// `ordered_<list>`: apply to a slice, sorted by `order_by`.
	Ordered,
}

bitflags::bitflags! {
	/// The parameters an iterator body may carry alongside its contents.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct IterParams: u8 {
		const LIMIT = 1 << 0;
		const COUNT = 1 << 1;
		const PERCENT = 1 << 2;
		const MAX = 1 << 3;
		const WEIGHT = 1 << 4;
		const ORDER_BY = 1 << 5;
		const POSITION = 1 << 6;
		/// `alternative_limit` and `custom` tooltips; accepted everywhere.
		const COMMON = 1 << 7;
	}
}

impl IterParams {
	#[must_use]
	pub fn from_key(key: &str) -> Option<Self> {
		let ret = match key {
			"limit" => Self::LIMIT,
			"count" => Self::COUNT,
			"percent" => Self::PERCENT,
			"max" => Self::MAX,
			"weight" => Self::WEIGHT,
			"order_by" => Self::ORDER_BY,
			"position" => Self::POSITION,
			"alternative_limit" | "custom" => Self::COMMON,
			_ => return None,
		};

		Some(ret)
	}

	#[must_use]
	pub fn key(self) -> &'static str {
		match self {
			Self::LIMIT => "limit",
			Self::COUNT => "count",
			Self::PERCENT => "percent",
			Self::MAX => "max",
			Self::WEIGHT => "weight",
			Self::ORDER_BY => "order_by",
			Self::POSITION => "position",
			_ => "custom",
		}
	}
}

impl IteratorKind {
	#[must_use]
	pub fn prefix(self) -> &'static str {
		match self {
			Self::Any => "any_",
			Self::Every => "every_",
			Self::Random => "random_",
			Self::Ordered => "ordered_",
		}
	}

	/// `any_` tests; the others mutate.
	#[must_use]
	pub fn context(self) -> Context {
		match self {
			Self::Any => Context::Trigger,
			Self::Every | Self::Random | Self::Ordered => Context::Effect,
		}
	}

	#[must_use]
	pub fn class(self) -> NameClass {
		match self.context() {
			Context::Trigger => NameClass::Trigger,
			_ => NameClass::Effect,
		}
	}

	#[must_use]
	pub fn allowed_params(self) -> IterParams {
		let ret = match self {
			Self::Any => IterParams::LIMIT | IterParams::COUNT | IterParams::PERCENT,
			Self::Every => IterParams::LIMIT | IterParams::MAX,
			Self::Random => IterParams::LIMIT | IterParams::WEIGHT,
			Self::Ordered => {
				IterParams::ORDER_BY | IterParams::POSITION | IterParams::MAX | IterParams::LIMIT
			}
		};

		ret | IterParams::COMMON
	}

	#[must_use]
	pub fn required_params(self) -> IterParams {
		match self {
			Self::Ordered => IterParams::ORDER_BY,
			_ => IterParams::empty(),
		}
	}

	/// At most one of these may be given at once.
	#[must_use]
	pub fn exclusive_params(self) -> IterParams {
		match self {
			Self::Any => IterParams::COUNT | IterParams::PERCENT,
			_ => IterParams::empty(),
		}
	}
}

/// Splits `any_vassal` into `(IteratorKind::Any, "vassal")`.
/// Does not check that the list exists.
#[must_use]
pub fn split_iterator(word: &str) -> Option<(IteratorKind, &str)> {
	static ITER: OnceLock<Regex> = OnceLock::new();

	let caps = ITER
		.get_or_init(|| Regex::new(r"^(any|every|random|ordered)_(.+)$").unwrap())
		.captures(word)?;

	let kind = match caps.get(1)?.as_str() {
		"any" => IteratorKind::Any,
		"every" => IteratorKind::Every,
		"random" => IteratorKind::Random,
		_ => IteratorKind::Ordered,
	};

	Some((kind, caps.get(2)?.as_str()))
}

/// Like [`split_iterator`], but only if the list is known to the scope table.
#[must_use]
pub fn iterator<'w>(tables: &StaticTables, word: &'w str) -> Option<(IteratorKind, &'w str)> {
	split_iterator(word).filter(|(_, list)| tables.scopes.is_known_list(list))
}

/// How a block key affects the context of the block's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Introduces {
	Context(Context),
	Inherit,
}

#[must_use]
fn introduces(tables: &StaticTables, ast: &Ast, block: NodeId) -> Introduces {
	let Some(key) = ast.key(block) else {
		return Introduces::Inherit;
	};

	let config = &tables.config;

	if config.trigger_keys.iter().any(|k| k == key) {
		return Introduces::Context(Context::Trigger);
	}

	if config.effect_keys.iter().any(|k| k == key) {
		return Introduces::Context(Context::Effect);
	}

	if let Some((iter, _)) = iterator(tables, key) {
		return Introduces::Context(iter.context());
	}

	if config.transparent_keys.iter().any(|k| k == key) || crate::lex::is_number(key) {
		return Introduces::Inherit;
	}

	if ast.node(block).parent().is_some() && scope::chain_text(tables, ChainSite::BlockKey, key).is_some() {
		return Introduces::Inherit;
	}

	Introduces::Context(Context::Opaque)
}

/// The context in effect where `node` appears, found by walking its ancestors.
#[must_use]
pub fn classify(tables: &StaticTables, ast: &Ast, node: NodeId) -> Context {
	for ancestor in ast.ancestors(node) {
		if let Introduces::Context(ctx) = introduces(tables, ast, ancestor) {
			return ctx;
		}
	}

	Context::Opaque
}

/// [`classify`], precomputed for every node in one linear pass.
#[derive(Debug)]
pub struct ContextMap {
	/// The context inside each node; meaningful only for containers.
	inner: Vec<Context>,
}

impl ContextMap {
	#[must_use]
	pub fn new(tables: &StaticTables, ast: &Ast) -> Self {
		let mut inner = Vec::with_capacity(ast.len());

		for (id, node) in ast.nodes() {
			let outer = node
				.parent()
				.map_or(Context::Opaque, |p| inner[p.index()]);

			let ctx = if node.is_container() {
				match introduces(tables, ast, id) {
					Introduces::Context(ctx) => ctx,
					Introduces::Inherit => outer,
				}
			} else {
				outer
			};

			inner.push(ctx);
		}

		Self { inner }
	}

	/// The context in effect where `node` appears.
	#[must_use]
	pub fn of(&self, ast: &Ast, node: NodeId) -> Context {
		ast.node(node)
			.parent()
			.map_or(Context::Opaque, |p| self.inner[p.index()])
	}

	/// The context in effect inside the container `node`.
	#[must_use]
	pub fn inside(&self, node: NodeId) -> Context {
		self.inner[node.index()]
	}
}

#[cfg(test)]
mod test {
	use indoc::indoc;

	use super::*;
	use crate::{data::test::tables, parse::parse};

	#[must_use]
	fn find(ast: &Ast, key: &str) -> NodeId {
		ast.nodes()
			.find_map(|(id, _)| (ast.key(id) == Some(key)).then_some(id))
			.unwrap()
	}

	#[test]
	fn split() {
		assert_eq!(split_iterator("any_vassal"), Some((IteratorKind::Any, "vassal")));
		assert_eq!(
			split_iterator("ordered_de_jure_vassal"),
			Some((IteratorKind::Ordered, "de_jure_vassal"))
		);
		assert_eq!(split_iterator("any_"), None);
		assert_eq!(split_iterator("anything"), None);
		assert!(iterator(&tables(), "random_list").is_none());
	}

	#[test]
	fn ancestor_walk() {
		let tables = tables();

		let ast = parse(indoc! {"
			my_event = {
				trigger = {
					liege = { a = yes }
					OR = { b = yes }
				}
				immediate = {
					if = {
						limit = { c = yes }
						d = yes
					}
					every_vassal = { e = yes }
					any_courtier = { f = yes }
					add_opinion = { g = yes }
					random_list = { 10 = { h = yes } }
				}
				i = yes
			}
		"});

		let expected = [
			("a", Context::Trigger),
			("b", Context::Trigger),
			("c", Context::Trigger),
			("d", Context::Effect),
			("e", Context::Effect),
			("f", Context::Trigger),
			("g", Context::Opaque),
			("h", Context::Effect),
			("i", Context::Opaque),
			("my_event", Context::Opaque),
		];

		let map = ContextMap::new(&tables, &ast);

		for (key, ctx) in expected {
			let node = find(&ast, key);
			assert_eq!(classify(&tables, &ast, node), ctx, "`{key}`");
			assert_eq!(map.of(&ast, node), ctx, "`{key}` (linear)");
		}
	}

	#[test]
	fn iterator_contracts() {
		assert!(IteratorKind::Any
			.exclusive_params()
			.contains(IterParams::COUNT | IterParams::PERCENT));
		assert_eq!(IteratorKind::Ordered.required_params(), IterParams::ORDER_BY);
		assert!(!IteratorKind::Every.allowed_params().contains(IterParams::WEIGHT));
		assert!(IteratorKind::Random.allowed_params().contains(IterParams::WEIGHT));
		assert_eq!(IteratorKind::Any.context(), Context::Trigger);
		assert_eq!(IterParams::from_key("order_by"), Some(IterParams::ORDER_BY));
		assert_eq!(IterParams::POSITION.key(), "position");
	}
}
