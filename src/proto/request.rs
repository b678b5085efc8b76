// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Request assembler.
//!
//! Combines one BEGIN_REQUEST record, zero or more PARAMS records, and zero
//! or more STDIN records sharing a request id into one logical request. The
//! record ordering rules are enforced by a state machine:
//!
//! ```text
//! BEGIN ── BEGIN_REQUEST ──▶ PARAM_OR_STDIN
//! PARAM_OR_STDIN ── PARAMS(data) ──▶ PARAM_OR_STDIN
//! PARAM_OR_STDIN ── PARAMS(end)  ──▶ STDIN
//! PARAM_OR_STDIN ── STDIN(any)   ──▶ PARAM
//! PARAM ── PARAMS(data) ──▶ PARAM      PARAM ── PARAMS(end) ──▶ FINISHED
//! STDIN ── STDIN(data)  ──▶ STDIN      STDIN ── STDIN(end)  ──▶ FINISHED
//! ```
//!
//! Any other delivery, including records after FINISHED, is a protocol
//! violation and parks the request in ERROR. Parameters land in the
//! connection's [`ParamTable`]; stdin bytes accumulate in one growable
//! arena buffer.

use crate::mem::{Arena, ArenaBuf, ParamTable};
use crate::proto::record::{Record, RecordBody};

/// Lifecycle of one request on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Waiting for BEGIN_REQUEST
    Begin,
    /// Waiting for the first PARAMS or STDIN record
    ParamOrStdin,
    /// Inside the PARAMS stream (stdin already closed)
    Param,
    /// Inside the STDIN stream (params already closed)
    Stdin,
    /// Fully assembled; ready for the handler
    Finished,
    /// Protocol violation; terminal
    Error,
}

/// One in-flight FastCGI request.
#[derive(Debug)]
pub struct Request {
    state: RequestState,
    request_id: u16,
    role: u16,
    flags: u8,
    params: ParamTable,
    stdin: Option<ArenaBuf>,
    param_preallocate: usize,
    fail_reason: Option<&'static str>,
}

impl Request {
    /// Create an empty request whose parameter table starts at
    /// `param_preallocate` buckets.
    pub fn new(param_preallocate: usize) -> Self {
        Self {
            state: RequestState::Begin,
            request_id: 0,
            role: 0,
            flags: 0,
            params: ParamTable::new(param_preallocate, true),
            stdin: None,
            param_preallocate,
            fail_reason: None,
        }
    }

    /// Reinitialize for the next request on a kept-alive connection.
    ///
    /// The connection rewinds the arena separately; the old table and stdin
    /// buffer are dropped here because their storage is about to dangle.
    pub fn reset(&mut self) {
        *self = Self::new(self.param_preallocate);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Whether the request is fully assembled.
    pub fn is_finished(&self) -> bool {
        self.state == RequestState::Finished
    }

    /// Whether the request hit a protocol violation.
    pub fn is_error(&self) -> bool {
        self.state == RequestState::Error
    }

    /// Why the request entered the error state, if it did.
    pub fn fail_reason(&self) -> Option<&'static str> {
        self.fail_reason
    }

    /// Request id seeded from BEGIN_REQUEST.
    pub fn request_id(&self) -> u16 {
        self.request_id
    }

    /// Role requested by the client.
    pub fn role(&self) -> u16 {
        self.role
    }

    /// Whether the client asked to keep the connection after this request.
    pub fn keep_connection(&self) -> bool {
        self.flags & crate::proto::record::FLAG_KEEP_CONN != 0
    }

    /// Assembled parameter map.
    pub fn params(&self) -> &ParamTable {
        &self.params
    }

    /// Assembled stdin bytes.
    pub fn stdin_bytes<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        match &self.stdin {
            Some(buf) => buf.as_slice(arena),
            None => &[],
        }
    }

    fn fail(&mut self, reason: &'static str) {
        self.state = RequestState::Error;
        self.fail_reason = Some(reason);
    }

    /// Feed one finished record into the state machine.
    pub fn process(&mut self, arena: &mut Arena, record: Record) {
        if matches!(self.state, RequestState::Finished | RequestState::Error) {
            self.fail("record delivered to a completed request");
            return;
        }

        if self.state != RequestState::Begin && record.header.request_id != self.request_id {
            self.fail("request id mismatch within one request");
            return;
        }

        match self.state {
            RequestState::Begin => match record.body {
                RecordBody::BeginRequest(begin) => {
                    self.request_id = record.header.request_id;
                    self.role = begin.role;
                    self.flags = begin.flags;
                    self.state = RequestState::ParamOrStdin;
                }
                _ => self.fail("expected BEGIN_REQUEST first"),
            },

            RequestState::ParamOrStdin => match record.body {
                RecordBody::Params(pairs) if !record.is_terminator() => {
                    self.append_params(arena, &pairs);
                }
                RecordBody::Params(_) => self.state = RequestState::Stdin,
                RecordBody::Stdin(data) => {
                    if let Some(handle) = data {
                        self.append_stdin(arena, handle);
                    }
                    if self.state != RequestState::Error {
                        self.state = RequestState::Param;
                    }
                }
                _ => self.fail("expected PARAMS or STDIN"),
            },

            RequestState::Param => match record.body {
                RecordBody::Params(pairs) if !record.is_terminator() => {
                    self.append_params(arena, &pairs);
                }
                RecordBody::Params(_) => self.state = RequestState::Finished,
                _ => self.fail("expected PARAMS"),
            },

            RequestState::Stdin => match record.body {
                RecordBody::Stdin(Some(handle)) => self.append_stdin(arena, handle),
                RecordBody::Stdin(None) => self.state = RequestState::Finished,
                _ => self.fail("expected STDIN"),
            },

            RequestState::Finished | RequestState::Error => unreachable!(),
        }
    }

    /// Store decoded pairs, overwriting any prior value for a duplicate
    /// name.
    fn append_params(&mut self, arena: &mut Arena, pairs: &[crate::proto::record::ParamPair]) {
        for pair in pairs {
            let key = ArenaBuf::from_raw(pair.name);
            let value = ArenaBuf::from_raw(pair.value);
            if self.params.set(arena, key, value).is_err() {
                self.fail("parameter table allocation failed");
                return;
            }
        }
    }

    /// Grow the stdin buffer with one record's bytes.
    fn append_stdin(&mut self, arena: &mut Arena, handle: crate::mem::RawBuf) {
        match &mut self.stdin {
            None => self.stdin = Some(ArenaBuf::from_raw(handle)),
            Some(buf) => {
                if buf.append_handle(arena, handle).is_err() {
                    self.fail("stdin buffer allocation failed");
                }
            }
        }
    }
}
