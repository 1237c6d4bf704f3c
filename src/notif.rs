//! Routines acting on [`Core`] for handling client notifications.

use std::ops::ControlFlow;

use lsp_server::{Connection, ExtractError, Notification};
use lsp_types::notification::{
	DidChangeConfiguration, DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument,
	DidSaveTextDocument,
};
use pdx_ls::lines;
use tracing::{debug, warn};

use crate::{
	core::{Core, Settings},
	Error, UnitResult,
};

pub(super) fn handle(
	core: &mut Core,
	conn: &Connection,
	mut notif: Notification,
) -> ControlFlow<UnitResult, Notification> {
	notif = try_notif::<DidOpenTextDocument, _>(notif, |params| {
		let doc = params.text_document;
		debug!("Opened: {} (v{})", doc.uri, doc.version);
		core.open(doc.uri, doc.version, doc.text);
		Ok(())
	})?;

	notif = try_notif::<DidChangeTextDocument, _>(notif, |params| {
		let uri = params.text_document.uri;

		let Some(doc) = core.docs.get_mut(&uri) else {
			warn!("Change to a document which was never opened: {uri}");
			return Ok(());
		};

		lines::splice_changes(&mut doc.text, params.content_changes);
		core.touch(&uri, params.text_document.version);
		Ok(())
	})?;

	notif = try_notif::<DidCloseTextDocument, _>(notif, |params| {
		core.close(conn, params.text_document.uri)
	})?;

	notif = try_notif::<DidSaveTextDocument, _>(notif, |_| Ok(()))?;

	notif = try_notif::<DidChangeConfiguration, _>(notif, |params| {
		#[cfg(debug_assertions)]
		tracing::debug!("Config changed: {:#?}", params.settings);

		let Some(settings) = Settings::from_value(&params.settings) else {
			warn!("Ignoring malformed settings.");
			return Ok(());
		};

		core.apply_settings(settings)
	})?;

	ControlFlow::Continue(notif)
}

#[must_use]
fn try_notif<N, F>(notif: Notification, callback: F) -> ControlFlow<UnitResult, Notification>
where
	N: lsp_types::notification::Notification,
	F: FnOnce(N::Params) -> UnitResult,
{
	match notif.extract::<N::Params>(N::METHOD) {
		Ok(params) => ControlFlow::Break(callback(params)),
		Err(err) => match err {
			ExtractError::MethodMismatch(t) => ControlFlow::Continue(t),
			ExtractError::JsonError { method: _, error } => {
				ControlFlow::Break(Err(Error::Process {
					ctx: format!("`{}` notification", N::METHOD),
					source: Some(Box::new(error)),
				}))
			}
		},
	}
}
