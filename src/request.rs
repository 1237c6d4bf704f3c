//! Routines acting on [`Core`] for handling client requests.
//!
//! Presentation features live outside this server; every request other than
//! `shutdown` (handled by the main loop) is answered as unsupported.

use lsp_server::{ErrorCode, Request};
use tracing::debug;

use crate::{core::Core, Error, UnitResult};

pub(super) fn handle(_: &mut Core, req: Request) -> UnitResult {
	debug!("Unsupported request: {}", req.method);

	Err(Error::Process {
		source: None,
		ctx: format!("`{}` is not supported", req.method),
	}
	.map_to_response(req.id, ErrorCode::MethodNotFound))
}
