//! # PDX-LS
//!
//! A language server for brace-delimited game-logic scripts, wrapping the
//! [`pdx_ls`] analysis core.

mod core;
mod error;
mod notif;
mod request;
mod setup;

use std::ops::ControlFlow;

use lsp_server::{Connection, Message};
use lsp_types::InitializeParams;
use tracing::{error, info};

use crate::core::{Core, Settings};

pub(crate) use crate::error::Error;

pub(crate) type ErrorBox = Box<dyn std::error::Error + Send + Sync>;
pub(crate) type UnitResult = Result<(), Error>;

fn main() -> UnitResult {
	setup::logging();

	info!("Initializing...");
	let (conn, threads) = Connection::stdio();
	let params = conn.initialize(serde_json::to_value(setup::capabilities())?)?;
	let params: InitializeParams = serde_json::from_value(params)?;

	let settings = params
		.initialization_options
		.as_ref()
		.and_then(Settings::from_value)
		.unwrap_or_default();

	let mut core = Core::new(settings)?;
	main_loop(&mut core, &conn)?;
	drop(conn);

	threads.join().map_err(|err| Error::Process {
		source: Some(Box::new(err)),
		ctx: "failed to join the I/O threads".to_string(),
	})?;

	info!("Shutdown complete.");
	Ok(())
}

fn main_loop(core: &mut Core, conn: &Connection) -> UnitResult {
	let outcomes = core.outcome_rx.clone();

	loop {
		let tick = match core.next_due() {
			Some(due) => crossbeam_channel::at(due),
			None => crossbeam_channel::never(),
		};

		crossbeam_channel::select! {
			recv(conn.receiver) -> msg => {
				let Ok(msg) = msg else {
					info!("Client disconnected.");
					return Ok(());
				};

				match msg {
					Message::Request(req) => {
						if conn.handle_shutdown(&req)? {
							info!("Server shutting down...");
							return Ok(());
						}

						match request::handle(core, req) {
							Ok(()) => {}
							Err(Error::Response(resp)) => {
								conn.sender.send(Message::Response(resp))?;
							}
							Err(err @ Error::Send(_)) => return Err(err),
							Err(err) => error!("{err}"),
						}
					}
					Message::Response(_) => {}
					Message::Notification(notif) => match notif::handle(core, conn, notif) {
						ControlFlow::Break(Err(err)) => error!("{err}"),
						ControlFlow::Continue(_) | ControlFlow::Break(_) => {}
					},
				}
			}
			recv(outcomes) -> outcome => {
				if let Ok(outcome) = outcome {
					if let Err(err) = core.finish(conn, outcome) {
						error!("{err}");
					}
				}
			}
			recv(tick) -> _ => {
				if let Err(err) = core.dispatch_due(conn) {
					error!("{err}");
				}
			}
		}
	}
}
