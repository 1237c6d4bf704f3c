//! Document state, debouncing, and hand-off of analysis to worker threads.

use std::{
	hash::{Hash, Hasher},
	sync::Arc,
	time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};
use lsp_server::{Connection, Message, Notification};
use lsp_types::{notification::PublishDiagnostics, PublishDiagnosticsParams, Url};
use parking_lot::Mutex;
use pdx_ls::{
	data::{AnalysisConfig, StaticTables},
	lines::LineIndex,
	Analyzer,
};
use rustc_hash::{FxHashMap, FxHasher};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::UnitResult;

/// The settings section clients are expected to use.
pub(crate) const SETTINGS_SECTION: &str = "pdxls";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Settings {
	/// How long to wait after the last edit to a document before analyzing it.
	pub(crate) debounce_ms: Option<u64>,
	pub(crate) root_scope: Option<String>,
	pub(crate) report_unknown_without_index: Option<bool>,
}

impl Settings {
	const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

	/// Accepts either the section itself or an object containing it.
	#[must_use]
	pub(crate) fn from_value(value: &serde_json::Value) -> Option<Self> {
		let section = value.get(SETTINGS_SECTION).unwrap_or(value);
		serde_json::from_value(section.clone()).ok()
	}

	#[must_use]
	pub(crate) fn debounce(&self) -> Duration {
		self.debounce_ms
			.map_or(Self::DEFAULT_DEBOUNCE, Duration::from_millis)
	}
}

#[derive(Debug)]
pub(crate) struct Document {
	pub(crate) text: String,
	pub(crate) version: i32,
	/// When this document should next be analyzed, if it needs to be.
	pub(crate) due: Option<Instant>,
}

/// The product of one worker job.
#[derive(Debug)]
pub(crate) struct Outcome {
	pub(crate) uri: Url,
	pub(crate) version: i32,
	pub(crate) hash: u64,
	pub(crate) diagnostics: Vec<lsp_types::Diagnostic>,
}

#[derive(Debug)]
pub(crate) struct Core {
	pub(crate) docs: FxHashMap<Url, Document>,
	pub(crate) settings: Settings,
	tables: Arc<StaticTables>,
	/// The content hash and diagnostics of each document's last analysis.
	cache: FxHashMap<Url, (u64, Vec<lsp_types::Diagnostic>)>,
	/// The newest version of each open document. Workers read this to abandon
	/// jobs which have been superseded.
	latest: Arc<Mutex<FxHashMap<Url, i32>>>,
	pub(crate) outcome_tx: Sender<Outcome>,
	pub(crate) outcome_rx: Receiver<Outcome>,
}

impl Core {
	pub(crate) fn new(settings: Settings) -> Result<Self, crate::Error> {
		let tables = Arc::new(build_tables(&settings)?);
		let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();

		Ok(Self {
			docs: FxHashMap::default(),
			settings,
			tables,
			cache: FxHashMap::default(),
			latest: Arc::new(Mutex::new(FxHashMap::default())),
			outcome_tx,
			outcome_rx,
		})
	}

	pub(crate) fn apply_settings(&mut self, settings: Settings) -> UnitResult {
		self.tables = Arc::new(build_tables(&settings)?);
		self.settings = settings;
		self.cache.clear();

		let now = Instant::now();

		for doc in self.docs.values_mut() {
			doc.due = Some(now);
		}

		info!("Settings applied; re-analyzing {} documents.", self.docs.len());
		Ok(())
	}

	pub(crate) fn open(&mut self, uri: Url, version: i32, text: String) {
		self.latest.lock().insert(uri.clone(), version);

		self.docs.insert(
			uri,
			Document {
				text,
				version,
				due: Some(Instant::now()),
			},
		);
	}

	/// Marks a document as edited; analysis waits for the debounce period.
	pub(crate) fn touch(&mut self, uri: &Url, version: i32) {
		let debounce = self.settings.debounce();

		let Some(doc) = self.docs.get_mut(uri) else {
			return;
		};

		doc.version = version;
		doc.due = Some(Instant::now() + debounce);
		self.latest.lock().insert(uri.clone(), version);
	}

	pub(crate) fn close(&mut self, conn: &Connection, uri: Url) -> UnitResult {
		self.docs.remove(&uri);
		self.cache.remove(&uri);
		self.latest.lock().remove(&uri);
		publish(conn, uri, vec![], None)
	}

	/// The soonest moment at which some document needs analysis.
	#[must_use]
	pub(crate) fn next_due(&self) -> Option<Instant> {
		self.docs.values().filter_map(|doc| doc.due).min()
	}

	/// Starts analysis of every document whose debounce period has elapsed.
	pub(crate) fn dispatch_due(&mut self, conn: &Connection) -> UnitResult {
		let now = Instant::now();

		for (uri, doc) in self.docs.iter_mut() {
			if !doc.due.is_some_and(|due| due <= now) {
				continue;
			}

			doc.due = None;
			let hash = content_hash(&doc.text);

			if let Some((cached, diags)) = self.cache.get(uri) {
				if *cached == hash {
					debug!("Unchanged content; reusing diagnostics for: {uri}");
					publish(conn, uri.clone(), diags.clone(), Some(doc.version))?;
					continue;
				}
			}

			let job = Job {
				uri: uri.clone(),
				version: doc.version,
				hash,
				text: doc.text.clone(),
				tables: self.tables.clone(),
				root: self.settings.root_scope.clone(),
				latest: self.latest.clone(),
				sender: self.outcome_tx.clone(),
			};

			rayon::spawn(move || job.run());
		}

		Ok(())
	}

	/// Publishes a worker's results, unless a newer version has arrived since.
	pub(crate) fn finish(&mut self, conn: &Connection, outcome: Outcome) -> UnitResult {
		let Some(doc) = self.docs.get(&outcome.uri) else {
			return Ok(());
		};

		if doc.version != outcome.version {
			debug!(
				"Discarding stale diagnostics for {} (v{} < v{}).",
				outcome.uri, outcome.version, doc.version
			);

			return Ok(());
		}

		self.cache.insert(
			outcome.uri.clone(),
			(outcome.hash, outcome.diagnostics.clone()),
		);

		publish(conn, outcome.uri, outcome.diagnostics, Some(outcome.version))
	}
}

struct Job {
	uri: Url,
	version: i32,
	hash: u64,
	text: String,
	tables: Arc<StaticTables>,
	root: Option<String>,
	latest: Arc<Mutex<FxHashMap<Url, i32>>>,
	sender: Sender<Outcome>,
}

impl Job {
	#[must_use]
	fn is_current(&self) -> bool {
		self.latest.lock().get(&self.uri) == Some(&self.version)
	}

	fn run(self) {
		if !self.is_current() {
			return;
		}

		let root = self.root.as_deref().and_then(|r| self.tables.scopes.kind(r));
		let analysis = Analyzer::new(&self.tables).with_root(root).analyze(&self.text);

		if !self.is_current() {
			return;
		}

		let lndx = LineIndex::new(&self.text);

		let outcome = Outcome {
			uri: self.uri.clone(),
			version: self.version,
			hash: self.hash,
			diagnostics: analysis.diagnostics.iter().map(|d| d.to_lsp(&lndx)).collect(),
		};

		if self.sender.send(outcome).is_err() {
			error!("Analysis finished after the server loop exited: {}", self.uri);
		}
	}
}

fn build_tables(settings: &Settings) -> Result<StaticTables, pdx_ls::data::DataError> {
	let tables = StaticTables::builtin()?;

	let Some(report) = settings.report_unknown_without_index else {
		return Ok(tables);
	};

	let config = AnalysisConfig {
		report_unknown_without_index: report,
		..tables.config.clone()
	};

	tables.with_config(config)
}

#[must_use]
fn content_hash(text: &str) -> u64 {
	let mut hasher = FxHasher::default();
	text.hash(&mut hasher);
	hasher.finish()
}

pub(crate) fn publish(
	conn: &Connection,
	uri: Url,
	diagnostics: Vec<lsp_types::Diagnostic>,
	version: Option<i32>,
) -> UnitResult {
	let params = serde_json::to_value(PublishDiagnosticsParams {
		uri,
		diagnostics,
		version,
	})?;

	conn.sender.send(Message::Notification(Notification {
		method: <PublishDiagnostics as lsp_types::notification::Notification>::METHOD.to_string(),
		params,
	}))?;

	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn settings() {
		let value = serde_json::json!({
			"pdxls": { "debounceMs": 50, "rootScope": "landed_title" }
		});

		let settings = Settings::from_value(&value).unwrap();
		assert_eq!(settings.debounce(), Duration::from_millis(50));
		assert_eq!(settings.root_scope.as_deref(), Some("landed_title"));
		assert_eq!(Settings::default().debounce(), Settings::DEFAULT_DEBOUNCE);
	}

	#[test]
	fn last_write_wins() {
		let (server, client) = Connection::memory();
		let mut core = Core::new(Settings::default()).unwrap();
		let uri = Url::parse("file:///events/test.txt").unwrap();

		core.open(uri.clone(), 1, "trigger = { add_gold = 1 }".to_string());
		core.touch(&uri, 2);

		core.finish(
			&server,
			Outcome {
				uri: uri.clone(),
				version: 1,
				hash: 0,
				diagnostics: vec![],
			},
		)
		.unwrap();

		assert!(client.receiver.try_recv().is_err());

		core.finish(
			&server,
			Outcome {
				uri,
				version: 2,
				hash: 0,
				diagnostics: vec![],
			},
		)
		.unwrap();

		assert!(client.receiver.try_recv().is_ok());
	}
}
