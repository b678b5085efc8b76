// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Connection lifecycle: read, parse, assemble, respond.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::core::{EngineConfig, EngineError, Result};
use crate::proto::encode_response;
use crate::server::handler::Handler;
use crate::server::pool::ConnState;

/// Run one connection to completion.
///
/// Reads into a fixed buffer, feeds the record parser until it yields a
/// record, and pushes records through the request assembler. A finished
/// request invokes the handler and writes the whole framed response in one
/// write. With keep-connection set the slot is rewound and the loop
/// continues, honoring any pipelined bytes already in the buffer; otherwise
/// the connection closes after the response.
///
/// Errors close the connection. Only I/O and startup errors are fatal to
/// the worker; protocol violations and arena exhaustion are scoped to this
/// connection.
pub async fn drive<S, H>(
    stream: &mut S,
    state: &mut ConnState,
    handler: &H,
    config: &EngineConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler + ?Sized,
{
    let mut buf = vec![0u8; config.recv_buffer_size];

    loop {
        let read = match timeout(config.idle_timeout, stream.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(timeout = ?config.idle_timeout, "closing idle connection");
                return Ok(());
            }
        };
        if read == 0 {
            // Peer closed. Anything half-parsed is abandoned with the slot.
            return Ok(());
        }

        let mut offset = 0;
        while offset < read {
            offset += state.parser.parse(&mut state.arena, &buf[offset..read])?;

            if state.parser.is_error() {
                return Err(EngineError::protocol(
                    "record parsing",
                    state.parser.fail_reason().unwrap_or("malformed record"),
                ));
            }

            let record = match state.parser.take_record() {
                Some(record) => record,
                None => continue,
            };
            state.request.process(&mut state.arena, record);

            if state.request.is_error() {
                return Err(EngineError::protocol(
                    "request assembly",
                    state.request.fail_reason().unwrap_or("invalid record order"),
                ));
            }
            if !state.request.is_finished() {
                continue;
            }

            let body = handler.respond(&mut state.arena, &state.request)?;
            let frame = encode_response(
                state.request.request_id(),
                body.as_slice(&state.arena),
                0,
            );
            stream.write_all(&frame).await?;

            if !state.request.keep_connection() {
                return Ok(());
            }
            // Next request reuses the slot from a clean arena. The parser
            // holds no arena handles here, so the rewind is safe.
            state.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handler::OkHandler;
    use crate::server::pool::SlotPool;
    use byteorder::{BigEndian, WriteBytesExt};
    use tokio::io::duplex;

    fn header(rtype: u8, request_id: u16, content: u16) -> Vec<u8> {
        let mut out = vec![1, rtype];
        WriteBytesExt::write_u16::<BigEndian>(&mut out, request_id).unwrap();
        WriteBytesExt::write_u16::<BigEndian>(&mut out, content).unwrap();
        out.push(0);
        out.push(0);
        out
    }

    fn begin_request(request_id: u16, flags: u8) -> Vec<u8> {
        let mut out = header(1, request_id, 8);
        out.extend_from_slice(&[0, 1, flags, 0, 0, 0, 0, 0]);
        out
    }

    fn minimal_request(request_id: u16, flags: u8) -> Vec<u8> {
        let mut out = begin_request(request_id, flags);
        out.extend_from_slice(&header(4, request_id, 0));
        out.extend_from_slice(&header(5, request_id, 0));
        out
    }

    const EXPECTED_REPLY_LEN: usize = 8 + 31 + 8 + 8 + 8;

    fn expected_reply(request_id: u16) -> Vec<u8> {
        let payload = b"Content-Type: text/plain\r\n\r\nOK\n";
        let mut out = header(6, request_id, payload.len() as u16);
        out.extend_from_slice(payload);
        out.extend_from_slice(&header(6, request_id, 0));
        out.extend_from_slice(&header(3, request_id, 8));
        out.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        out
    }

    fn test_state() -> ConnState {
        SlotPool::new(1).checkout(&EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_single_request_response() {
        let (mut client, mut server) = duplex(64 * 1024);
        let config = EngineConfig::default();
        let mut state = test_state();
        let handler = OkHandler::default();

        client.write_all(&minimal_request(1, 0)).await.unwrap();

        drive(&mut server, &mut state, &handler, &config)
            .await
            .unwrap();
        drop(server);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, expected_reply(1));
    }

    #[tokio::test]
    async fn test_keep_connection_serves_two_requests() {
        let (mut client, mut server) = duplex(64 * 1024);
        let config = EngineConfig::default();
        let mut state = test_state();
        let handler = OkHandler::default();

        // Both requests pipelined in one burst; the second drops the
        // keep flag so the server closes afterwards.
        let mut wire = minimal_request(1, 1);
        wire.extend_from_slice(&minimal_request(1, 0));
        client.write_all(&wire).await.unwrap();

        drive(&mut server, &mut state, &handler, &config)
            .await
            .unwrap();
        drop(server);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply.len(), EXPECTED_REPLY_LEN * 2);
        assert_eq!(&reply[..EXPECTED_REPLY_LEN], expected_reply(1).as_slice());
        assert_eq!(&reply[EXPECTED_REPLY_LEN..], expected_reply(1).as_slice());
    }

    #[tokio::test]
    async fn test_request_with_params_and_stdin() {
        let (mut client, mut server) = duplex(64 * 1024);
        let config = EngineConfig::default();
        let mut state = test_state();
        let handler = OkHandler::default();

        let mut wire = begin_request(1, 0);
        // One PARAMS record: "A" => "B" with 1-byte length fields.
        wire.extend_from_slice(&header(4, 1, 4));
        wire.extend_from_slice(&[1, 1, b'A', b'B']);
        wire.extend_from_slice(&header(4, 1, 0));
        wire.extend_from_slice(&header(5, 1, 4));
        wire.extend_from_slice(b"body");
        wire.extend_from_slice(&header(5, 1, 0));
        client.write_all(&wire).await.unwrap();

        drive(&mut server, &mut state, &handler, &config)
            .await
            .unwrap();
        drop(server);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, expected_reply(1));
    }

    #[tokio::test]
    async fn test_peer_close_before_request_is_clean() {
        let (client, mut server) = duplex(1024);
        let config = EngineConfig::default();
        let mut state = test_state();
        let handler = OkHandler::default();

        drop(client);
        let result = drive(&mut server, &mut state, &handler, &config).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_record_with_content_closes_with_error() {
        let (mut client, mut server) = duplex(1024);
        let config = EngineConfig::default();
        let mut state = test_state();
        let handler = OkHandler::default();

        let mut wire = header(99, 1, 4);
        wire.extend_from_slice(b"junk");
        client.write_all(&wire).await.unwrap();

        let err = drive(&mut server, &mut state, &handler, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Protocol { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_out_of_order_record_closes_with_error() {
        let (mut client, mut server) = duplex(1024);
        let config = EngineConfig::default();
        let mut state = test_state();
        let handler = OkHandler::default();

        // STDIN before BEGIN_REQUEST.
        let mut wire = header(5, 1, 3);
        wire.extend_from_slice(b"abc");
        client.write_all(&wire).await.unwrap();

        let err = drive(&mut server, &mut state, &handler, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_closes_connection() {
        let (_client, mut server) = duplex(1024);
        let config = EngineConfig::default();
        let mut state = test_state();
        let handler = OkHandler::default();

        // No bytes ever arrive; paused time jumps straight to the timeout.
        let result = drive(&mut server, &mut state, &handler, &config).await;
        assert!(result.is_ok());
    }
}
