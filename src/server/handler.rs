// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Application handler trait and the built-in responder.

use crate::core::Result;
use crate::mem::{Arena, ArenaBuf, FmtArg};
use crate::proto::Request;

/// Produces the response body for one assembled request.
///
/// Implementations allocate the response out of the connection's arena so
/// it is reclaimed with everything else when the connection rewinds. One
/// handler instance is shared across workers, so it must carry no
/// per-request state.
pub trait Handler: Send + Sync + 'static {
    /// Build the response payload for `request`.
    ///
    /// The returned buffer becomes the STDOUT stream verbatim, headers
    /// included. Errors here end the request with a closed connection
    /// rather than a reply.
    fn respond(&self, arena: &mut Arena, request: &Request) -> Result<ArenaBuf>;
}

/// Fixed-body responder: every request gets the same content type and
/// payload.
#[derive(Debug, Clone)]
pub struct OkHandler {
    content_type: Vec<u8>,
    body: Vec<u8>,
}

impl OkHandler {
    pub fn new(content_type: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

impl Default for OkHandler {
    fn default() -> Self {
        Self::new(&b"text/plain"[..], &b"OK\n"[..])
    }
}

impl Handler for OkHandler {
    fn respond(&self, arena: &mut Arena, _request: &Request) -> Result<ArenaBuf> {
        ArenaBuf::format(
            arena,
            b"Content-Type: %s\r\n\r\n%s",
            &[FmtArg::Bytes(&self.content_type), FmtArg::Bytes(&self.body)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handler_payload() {
        let mut arena = Arena::new(4096);
        let request = Request::new(8);
        let handler = OkHandler::default();

        let reply = handler.respond(&mut arena, &request).unwrap();
        assert_eq!(reply.as_slice(&arena), b"Content-Type: text/plain\r\n\r\nOK\n");
    }

    #[test]
    fn test_custom_handler_payload() {
        let mut arena = Arena::new(4096);
        let request = Request::new(8);
        let handler = OkHandler::new(&b"application/json"[..], &b"{}"[..]);

        let reply = handler.respond(&mut arena, &request).unwrap();
        assert_eq!(
            reply.as_slice(&arena),
            b"Content-Type: application/json\r\n\r\n{}"
        );
    }
}
