// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! FastCGI record model and response framing.
//!
//! ## Record Structure
//!
//! Every record starts with an 8-byte header, all multi-byte integers
//! big-endian:
//! - version (1 byte, always 1)
//! - type (1 byte)
//! - request id (2 bytes)
//! - content length (2 bytes)
//! - padding length (1 byte)
//! - reserved (1 byte)
//!
//! Bodies handled by this engine:
//! - BEGIN_REQUEST (op=1): role(2), flags(1), reserved(5)
//! - PARAMS (op=4): name/value pairs with variable-length length fields
//! - STDIN (op=5): opaque bytes
//!
//! Bodies produced by this engine:
//! - STDOUT (op=6): response output stream
//! - END_REQUEST (op=3): app status(4), protocol status(1), reserved(3)

use byteorder::{BigEndian, WriteBytesExt};

use crate::mem::RawBuf;

/// Protocol version this engine speaks.
pub const FCGI_VERSION: u8 = 1;

/// Record header length on the wire.
pub const HEADER_LEN: usize = 8;

/// END_REQUEST body length on the wire.
pub const END_REQUEST_BODY_LEN: usize = 8;

/// BEGIN_REQUEST body length on the wire.
pub const BEGIN_REQUEST_BODY_LEN: usize = 8;

/// Largest content length a single record can carry.
pub const MAX_CONTENT_LEN: usize = u16::MAX as usize;

/// BEGIN_REQUEST flag bit: keep the connection open after the request.
pub const FLAG_KEEP_CONN: u8 = 1;

/// Responder role identifier.
pub const ROLE_RESPONDER: u16 = 1;

/// END_REQUEST protocol status: request completed normally.
pub const PROTOCOL_STATUS_REQUEST_COMPLETE: u8 = 0;

/// Record type tags this engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Starts a request (op=1)
    BeginRequest,
    /// Concludes a request (op=3)
    EndRequest,
    /// Supplies request parameters (op=4)
    Params,
    /// Supplies the request body (op=5)
    Stdin,
    /// Carries response output (op=6)
    Stdout,
    /// Anything else; rejected when it carries content
    Unknown(u8),
}

impl RecordType {
    /// Decode a wire type tag.
    pub fn from_wire(op: u8) -> Self {
        match op {
            1 => RecordType::BeginRequest,
            3 => RecordType::EndRequest,
            4 => RecordType::Params,
            5 => RecordType::Stdin,
            6 => RecordType::Stdout,
            other => RecordType::Unknown(other),
        }
    }

    /// Encode to the wire tag.
    pub fn to_wire(self) -> u8 {
        match self {
            RecordType::BeginRequest => 1,
            RecordType::EndRequest => 3,
            RecordType::Params => 4,
            RecordType::Stdin => 5,
            RecordType::Stdout => 6,
            RecordType::Unknown(op) => op,
        }
    }
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Wire protocol version (expected 1)
    pub version: u8,
    /// Record type
    pub rtype: RecordType,
    /// Request id shared by all records of one request
    pub request_id: u16,
    /// Body length excluding padding
    pub content_length: u16,
    /// Padding bytes after the body
    pub padding_length: u8,
    /// Reserved byte, carried but ignored
    pub reserved: u8,
}

impl RecordHeader {
    /// Header for a record this engine writes.
    pub fn outgoing(rtype: RecordType, request_id: u16, content_length: u16) -> Self {
        Self {
            version: FCGI_VERSION,
            rtype,
            request_id,
            content_length,
            padding_length: 0,
            reserved: 0,
        }
    }

    /// Append the 8 header bytes to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.push(self.rtype.to_wire());
        out.write_u16::<BigEndian>(self.request_id).expect("vec write");
        out.write_u16::<BigEndian>(self.content_length)
            .expect("vec write");
        out.push(self.padding_length);
        out.push(self.reserved);
    }
}

/// Decoded BEGIN_REQUEST body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeginBody {
    /// Requested role; this engine only serves [`ROLE_RESPONDER`]
    pub role: u16,
    /// Flag bits; bit 0 is [`FLAG_KEEP_CONN`]
    pub flags: u8,
}

/// One decoded PARAMS name/value pair; both sides are exact-size arena
/// allocations.
#[derive(Debug, Clone, Copy)]
pub struct ParamPair {
    /// Parameter name bytes
    pub name: RawBuf,
    /// Parameter value bytes
    pub value: RawBuf,
}

/// Type-specific record content.
#[derive(Debug)]
pub enum RecordBody {
    /// BEGIN_REQUEST role and flags
    BeginRequest(BeginBody),
    /// PARAMS pairs; empty for the stream terminator
    Params(Vec<ParamPair>),
    /// STDIN bytes; `None` for the stream terminator
    Stdin(Option<RawBuf>),
    /// Zero-content record of a type without a modeled body
    Empty,
}

/// One fully parsed record.
#[derive(Debug)]
pub struct Record {
    /// The 8-byte header
    pub header: RecordHeader,
    /// The decoded body
    pub body: RecordBody,
}

impl Record {
    /// Whether the record is a stream terminator (zero content length).
    pub fn is_terminator(&self) -> bool {
        self.header.content_length == 0
    }
}

/// Frame a complete response: the body split across one or more STDOUT
/// records, a zero-length STDOUT end-of-stream marker, and an END_REQUEST
/// record. The result is written to the socket in a single write so no
/// other traffic can interleave with it.
pub fn encode_response(request_id: u16, body: &[u8], app_status: u32) -> Vec<u8> {
    let stdout_records = body.len().div_ceil(MAX_CONTENT_LEN).max(1);
    let mut out = Vec::with_capacity(
        body.len() + (stdout_records + 2) * HEADER_LEN + END_REQUEST_BODY_LEN,
    );

    for chunk in body.chunks(MAX_CONTENT_LEN) {
        RecordHeader::outgoing(RecordType::Stdout, request_id, chunk.len() as u16)
            .encode_into(&mut out);
        out.extend_from_slice(chunk);
    }

    if body.is_empty() {
        // Degenerate case: the handler produced nothing, but the stream
        // still needs at least one data record before the terminator.
        RecordHeader::outgoing(RecordType::Stdout, request_id, 0).encode_into(&mut out);
    }

    // End-of-stream marker.
    RecordHeader::outgoing(RecordType::Stdout, request_id, 0).encode_into(&mut out);

    RecordHeader::outgoing(
        RecordType::EndRequest,
        request_id,
        END_REQUEST_BODY_LEN as u16,
    )
    .encode_into(&mut out);
    out.write_u32::<BigEndian>(app_status).expect("vec write");
    out.push(PROTOCOL_STATUS_REQUEST_COMPLETE);
    out.extend_from_slice(&[0u8; 3]);

    out
}
