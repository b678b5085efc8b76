// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Incremental FastCGI record parser.
//!
//! [`RecordParser`] decodes exactly one record per pass: the 8-byte header,
//! then the type-specific body, then padding. Input arrives in arbitrary
//! chunks; the parser consumes what it can, reports how many bytes it took,
//! and resumes from the exact field position on the next call, including
//! mid-multi-byte-field (a 2-byte length split across chunks is fine).
//!
//! `Finished` and `Error` are terminal: the parser consumes nothing further
//! until it is reinitialized, which [`RecordParser::take_record`] does
//! automatically when handing out a finished record.
//!
//! Name, value, and stdin runs are copied in bulk rather than byte-at-a-time;
//! every length field is still decoded one byte per step so resumption never
//! needs lookahead.

use crate::core::Result;
use crate::mem::{Arena, RawBuf};
use crate::proto::record::{
    BeginBody, ParamPair, Record, RecordBody, RecordHeader, RecordType,
};

/// Byte-position states, in strict wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Version,
    Type,
    RequestIdHi,
    RequestIdLo,
    ContentLenHi,
    ContentLenLo,
    PaddingLen,
    Reserved,

    BeginRoleHi,
    BeginRoleLo,
    BeginFlags,
    BeginSkip,

    ParamNameLen,
    ParamNameLenExt,
    ParamValueLen,
    ParamValueLenExt,
    ParamNameData,
    ParamValueData,

    StdinData,

    Padding,

    Finished,
    Error,
}

/// Resumable single-record parser.
#[derive(Debug)]
pub struct RecordParser {
    state: State,
    /// Bytes left in the current data/skip run.
    run_remaining: usize,
    /// Accumulator for 4-byte extended length fields.
    len_acc: u32,
    /// Content bytes consumed so far; checked against the header's
    /// content length to decide when a PARAMS body is complete.
    body_read: usize,

    version: u8,
    rtype: u8,
    request_id: u16,
    content_length: u16,
    padding_length: u8,
    reserved: u8,

    begin: BeginBody,
    param_name_len: u32,
    param_value_len: u32,
    param_name: Option<RawBuf>,
    param_value: Option<RawBuf>,
    params: Vec<ParamPair>,
    stdin: Option<RawBuf>,

    fail_reason: Option<&'static str>,
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordParser {
    /// Create a parser positioned at the start of a record header.
    pub fn new() -> Self {
        Self {
            state: State::Version,
            run_remaining: 0,
            len_acc: 0,
            body_read: 0,
            version: 0,
            rtype: 0,
            request_id: 0,
            content_length: 0,
            padding_length: 0,
            reserved: 0,
            begin: BeginBody::default(),
            param_name_len: 0,
            param_value_len: 0,
            param_name: None,
            param_value: None,
            params: Vec::new(),
            stdin: None,
            fail_reason: None,
        }
    }

    /// Reinitialize for the next record. The arena is shared with the
    /// connection and is not touched here.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether the current record is fully decoded.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Whether the parser hit a protocol violation.
    pub fn is_error(&self) -> bool {
        self.state == State::Error
    }

    /// Why the parser entered the error state, if it did.
    pub fn fail_reason(&self) -> Option<&'static str> {
        self.fail_reason
    }

    fn fail(&mut self, reason: &'static str) {
        self.state = State::Error;
        self.fail_reason = Some(reason);
    }

    /// Feed a chunk of input, returning how many bytes were consumed.
    ///
    /// Stops early when the record reaches `Finished` or `Error`; the caller
    /// re-feeds the remainder after [`RecordParser::take_record`]. Arena
    /// exhaustion surfaces as `Err` and parks the parser in the error state.
    pub fn parse(&mut self, arena: &mut Arena, input: &[u8]) -> Result<usize> {
        let mut consumed = 0;

        while consumed < input.len() {
            match self.state {
                State::Finished | State::Error => break,

                State::Version => {
                    self.version = input[consumed];
                    consumed += 1;
                    self.state = State::Type;
                }
                State::Type => {
                    self.rtype = input[consumed];
                    consumed += 1;
                    self.state = State::RequestIdHi;
                }
                State::RequestIdHi => {
                    self.request_id = u16::from(input[consumed]) << 8;
                    consumed += 1;
                    self.state = State::RequestIdLo;
                }
                State::RequestIdLo => {
                    self.request_id |= u16::from(input[consumed]);
                    consumed += 1;
                    self.state = State::ContentLenHi;
                }
                State::ContentLenHi => {
                    self.content_length = u16::from(input[consumed]) << 8;
                    consumed += 1;
                    self.state = State::ContentLenLo;
                }
                State::ContentLenLo => {
                    self.content_length |= u16::from(input[consumed]);
                    consumed += 1;
                    self.state = State::PaddingLen;
                }
                State::PaddingLen => {
                    self.padding_length = input[consumed];
                    consumed += 1;
                    self.state = State::Reserved;
                }
                State::Reserved => {
                    self.reserved = input[consumed];
                    consumed += 1;
                    if self.content_length == 0 {
                        // Terminator records finish right after the header.
                        self.state = State::Finished;
                    } else if let Err(err) = self.dispatch_body(arena) {
                        self.fail("arena exhausted");
                        return Err(err);
                    }
                }

                State::BeginRoleHi => {
                    self.begin.role = u16::from(input[consumed]) << 8;
                    consumed += 1;
                    self.state = State::BeginRoleLo;
                }
                State::BeginRoleLo => {
                    self.begin.role |= u16::from(input[consumed]);
                    consumed += 1;
                    self.state = State::BeginFlags;
                }
                State::BeginFlags => {
                    self.begin.flags = input[consumed];
                    consumed += 1;
                    self.run_remaining = 5;
                    self.state = State::BeginSkip;
                }
                State::BeginSkip => {
                    consumed += self.skip_run(&input[consumed..]);
                    if self.run_remaining == 0 {
                        self.state = State::Finished;
                    }
                }

                State::ParamNameLen => {
                    let byte = input[consumed];
                    consumed += 1;
                    self.body_read += 1;
                    if byte & 0x80 != 0 {
                        self.len_acc = u32::from(byte & 0x7f) << 24;
                        self.run_remaining = 3;
                        self.state = State::ParamNameLenExt;
                    } else {
                        self.param_name_len = u32::from(byte);
                        self.state = State::ParamValueLen;
                    }
                }
                State::ParamNameLenExt => {
                    let byte = input[consumed];
                    consumed += 1;
                    self.body_read += 1;
                    self.run_remaining -= 1;
                    self.len_acc |= u32::from(byte) << (8 * self.run_remaining);
                    if self.run_remaining == 0 {
                        self.param_name_len = self.len_acc;
                        self.state = State::ParamValueLen;
                    }
                }
                State::ParamValueLen => {
                    let byte = input[consumed];
                    consumed += 1;
                    self.body_read += 1;
                    if byte & 0x80 != 0 {
                        self.len_acc = u32::from(byte & 0x7f) << 24;
                        self.run_remaining = 3;
                        self.state = State::ParamValueLenExt;
                    } else {
                        self.param_value_len = u32::from(byte);
                        self.begin_param_name(arena)?;
                    }
                }
                State::ParamValueLenExt => {
                    let byte = input[consumed];
                    consumed += 1;
                    self.body_read += 1;
                    self.run_remaining -= 1;
                    self.len_acc |= u32::from(byte) << (8 * self.run_remaining);
                    if self.run_remaining == 0 {
                        self.param_value_len = self.len_acc;
                        self.begin_param_name(arena)?;
                    }
                }
                State::ParamNameData => {
                    let buf = self.param_name.unwrap_or(RawBuf::EMPTY);
                    consumed += self.copy_run(arena, buf, &input[consumed..]);
                    if self.run_remaining == 0 {
                        let value = arena.allocate(self.param_value_len as usize);
                        match value {
                            Ok(handle) => {
                                self.param_value = Some(handle);
                                self.run_remaining = self.param_value_len as usize;
                                self.state = State::ParamValueData;
                            }
                            Err(err) => {
                                self.fail("arena exhausted");
                                return Err(err);
                            }
                        }
                        if self.run_remaining == 0 {
                            self.finish_param();
                        }
                    }
                }
                State::ParamValueData => {
                    let buf = self.param_value.unwrap_or(RawBuf::EMPTY);
                    consumed += self.copy_run(arena, buf, &input[consumed..]);
                    if self.run_remaining == 0 {
                        self.finish_param();
                    }
                }

                State::StdinData => {
                    let buf = self.stdin.unwrap_or(RawBuf::EMPTY);
                    consumed += self.copy_run(arena, buf, &input[consumed..]);
                    if self.run_remaining == 0 {
                        self.enter_padding();
                    }
                }

                State::Padding => {
                    consumed += self.skip_run(&input[consumed..]);
                    if self.run_remaining == 0 {
                        self.state = State::Finished;
                    }
                }
            }
        }

        Ok(consumed)
    }

    /// Yield the finished record, if any, and reinitialize for the next one.
    pub fn take_record(&mut self) -> Option<Record> {
        if self.state != State::Finished {
            return None;
        }

        let rtype = RecordType::from_wire(self.rtype);
        let header = RecordHeader {
            version: self.version,
            rtype,
            request_id: self.request_id,
            content_length: self.content_length,
            padding_length: self.padding_length,
            reserved: self.reserved,
        };

        let body = match rtype {
            RecordType::BeginRequest => RecordBody::BeginRequest(self.begin),
            RecordType::Params => RecordBody::Params(std::mem::take(&mut self.params)),
            RecordType::Stdin => RecordBody::Stdin(self.stdin.take()),
            _ => RecordBody::Empty,
        };

        self.reset();
        Some(Record { header, body })
    }

    /// Pick the body sub-machine once the full header is in.
    fn dispatch_body(&mut self, arena: &mut Arena) -> Result<()> {
        match RecordType::from_wire(self.rtype) {
            RecordType::BeginRequest => self.state = State::BeginRoleHi,
            RecordType::Params => {
                self.body_read = 0;
                self.state = State::ParamNameLen;
            }
            RecordType::Stdin => {
                let handle = arena.allocate(self.content_length as usize)?;
                self.stdin = Some(handle);
                self.run_remaining = self.content_length as usize;
                self.state = State::StdinData;
            }
            _ => self.fail("unknown record type"),
        }
        Ok(())
    }

    /// Allocate the name buffer and enter the name-data run.
    fn begin_param_name(&mut self, arena: &mut Arena) -> Result<()> {
        match arena.allocate(self.param_name_len as usize) {
            Ok(handle) => {
                self.param_name = Some(handle);
                self.run_remaining = self.param_name_len as usize;
                self.state = State::ParamNameData;
                Ok(())
            }
            Err(err) => {
                self.fail("arena exhausted");
                Err(err)
            }
        }
    }

    /// A name/value pair is complete: record it and decide what comes next.
    fn finish_param(&mut self) {
        self.params.push(ParamPair {
            name: self.param_name.take().unwrap_or(RawBuf::EMPTY),
            value: self.param_value.take().unwrap_or(RawBuf::EMPTY),
        });

        let content = self.content_length as usize;
        if self.body_read == content {
            self.enter_padding();
        } else if self.body_read > content {
            self.fail("params overran declared content length");
        } else {
            self.state = State::ParamNameLen;
        }
    }

    fn enter_padding(&mut self) {
        if self.padding_length == 0 {
            self.state = State::Finished;
        } else {
            self.run_remaining = self.padding_length as usize;
            self.state = State::Padding;
        }
    }

    /// Consume up to `run_remaining` bytes without storing them.
    fn skip_run(&mut self, input: &[u8]) -> usize {
        let take = self.run_remaining.min(input.len());
        self.run_remaining -= take;
        take
    }

    /// Copy up to `run_remaining` bytes into `buf` at its current fill
    /// position and account them against the record body.
    fn copy_run(&mut self, arena: &mut Arena, buf: RawBuf, input: &[u8]) -> usize {
        let take = self.run_remaining.min(input.len());
        if take > 0 {
            let offset = buf.len() - self.run_remaining;
            arena.bytes_mut(buf)[offset..offset + take].copy_from_slice(&input[..take]);
            self.run_remaining -= take;
            self.body_read += take;
        }
        take
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineError;
    use crate::proto::record::FCGI_VERSION;
    use byteorder::{BigEndian, WriteBytesExt};

    fn header(rtype: u8, request_id: u16, content: u16, padding: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(FCGI_VERSION);
        out.push(rtype);
        out.write_u16::<BigEndian>(request_id).unwrap();
        out.write_u16::<BigEndian>(content).unwrap();
        out.push(padding);
        out.push(0);
        out
    }

    fn begin_record(request_id: u16, role: u16, flags: u8) -> Vec<u8> {
        let mut out = header(1, request_id, 8, 0);
        out.write_u16::<BigEndian>(role).unwrap();
        out.push(flags);
        out.extend_from_slice(&[0u8; 5]);
        out
    }

    fn params_record(request_id: u16, pairs: &[(&[u8], &[u8])], padding: u8) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in pairs {
            encode_len(&mut body, name.len());
            encode_len(&mut body, value.len());
            body.extend_from_slice(name);
            body.extend_from_slice(value);
        }
        let mut out = header(4, request_id, body.len() as u16, padding);
        out.extend_from_slice(&body);
        out.extend(std::iter::repeat(0u8).take(padding as usize));
        out
    }

    fn encode_len(out: &mut Vec<u8>, len: usize) {
        if len < 128 {
            out.push(len as u8);
        } else {
            out.write_u32::<BigEndian>(len as u32 | 0x8000_0000).unwrap();
        }
    }

    fn stdin_record(request_id: u16, data: &[u8], padding: u8) -> Vec<u8> {
        let mut out = header(5, request_id, data.len() as u16, padding);
        out.extend_from_slice(data);
        out.extend(std::iter::repeat(0u8).take(padding as usize));
        out
    }

    fn parse_all(parser: &mut RecordParser, arena: &mut Arena, input: &[u8]) -> usize {
        parser.parse(arena, input).unwrap()
    }

    #[test]
    fn test_begin_request_record() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let input = begin_record(1, 1, 1);

        let consumed = parse_all(&mut parser, &mut arena, &input);
        assert_eq!(consumed, input.len());
        assert!(parser.is_finished());

        let record = parser.take_record().unwrap();
        assert_eq!(record.header.request_id, 1);
        assert_eq!(record.header.content_length, 8);
        match record.body {
            RecordBody::BeginRequest(begin) => {
                assert_eq!(begin.role, 1);
                assert_eq!(begin.flags, 1);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_zero_content_finishes_after_header() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let mut input = header(4, 1, 0, 0);
        input.extend_from_slice(b"trailing");

        let consumed = parse_all(&mut parser, &mut arena, &input);
        assert_eq!(consumed, 8, "terminator must not eat trailing bytes");

        let record = parser.take_record().unwrap();
        assert!(record.is_terminator());
        assert!(matches!(record.body, RecordBody::Params(ref p) if p.is_empty()));
    }

    #[test]
    fn test_unknown_type_stops_at_header() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let mut input = header(9, 1, 16, 0);
        input.extend_from_slice(&[0u8; 16]);

        let consumed = parse_all(&mut parser, &mut arena, &input);
        assert_eq!(consumed, 8);
        assert!(parser.is_error());
        assert_eq!(parser.fail_reason(), Some("unknown record type"));

        // Terminal: nothing further is consumed.
        assert_eq!(parse_all(&mut parser, &mut arena, &[1, 2, 3]), 0);
        assert!(parser.take_record().is_none());
    }

    #[test]
    fn test_params_short_lengths() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let input = params_record(1, &[(b"PATH", b"/tmp"), (b"METHOD", b"GET")], 0);

        let consumed = parse_all(&mut parser, &mut arena, &input);
        assert_eq!(consumed, input.len());

        let record = parser.take_record().unwrap();
        let RecordBody::Params(pairs) = record.body else {
            panic!("expected params body");
        };
        assert_eq!(pairs.len(), 2);
        assert_eq!(arena.bytes(pairs[0].name), b"PATH");
        assert_eq!(arena.bytes(pairs[0].value), b"/tmp");
        assert_eq!(arena.bytes(pairs[1].name), b"METHOD");
        assert_eq!(arena.bytes(pairs[1].value), b"GET");
    }

    #[test]
    fn test_params_extended_length() {
        let mut arena = Arena::new(8192);
        let mut parser = RecordParser::new();
        let long_value = vec![b'v'; 300];
        let input = params_record(1, &[(b"LONG", &long_value)], 0);

        parse_all(&mut parser, &mut arena, &input);
        let record = parser.take_record().unwrap();
        let RecordBody::Params(pairs) = record.body else {
            panic!("expected params body");
        };
        assert_eq!(arena.bytes(pairs[0].value).len(), 300);
        assert!(arena.bytes(pairs[0].value).iter().all(|&b| b == b'v'));
    }

    #[test]
    fn test_params_with_padding() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let input = params_record(1, &[(b"A", b"B")], 3);

        let consumed = parse_all(&mut parser, &mut arena, &input);
        assert_eq!(consumed, input.len());
        assert!(parser.is_finished());
    }

    #[test]
    fn test_params_empty_value() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let input = params_record(1, &[(b"EMPTY", b"")], 0);

        parse_all(&mut parser, &mut arena, &input);
        let record = parser.take_record().unwrap();
        let RecordBody::Params(pairs) = record.body else {
            panic!("expected params body");
        };
        assert_eq!(arena.bytes(pairs[0].name), b"EMPTY");
        assert!(pairs[0].value.is_empty());
    }

    #[test]
    fn test_params_overrun_is_error() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        // Declared content of 3 bytes, but the one pair needs 4.
        let mut input = header(4, 1, 3, 0);
        input.extend_from_slice(&[1, 1, b'k', b'v']);

        parse_all(&mut parser, &mut arena, &input);
        assert!(parser.is_error());
        assert_eq!(
            parser.fail_reason(),
            Some("params overran declared content length")
        );
    }

    #[test]
    fn test_stdin_record_with_padding() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let input = stdin_record(1, b"hello", 5);

        let consumed = parse_all(&mut parser, &mut arena, &input);
        assert_eq!(consumed, input.len());

        let record = parser.take_record().unwrap();
        let RecordBody::Stdin(Some(data)) = record.body else {
            panic!("expected stdin body");
        };
        assert_eq!(arena.bytes(data), b"hello");
    }

    #[test]
    fn test_byte_at_a_time_equals_single_chunk() {
        let requests: Vec<Vec<u8>> = vec![
            begin_record(1, 1, 0),
            params_record(1, &[(b"REQUEST_METHOD", b"POST"), (b"X", b"Y")], 2),
            stdin_record(1, b"body bytes", 1),
        ];

        for input in requests {
            let mut arena_whole = Arena::new(8192);
            let mut whole = RecordParser::new();
            assert_eq!(
                whole.parse(&mut arena_whole, &input).unwrap(),
                input.len()
            );
            let record_whole = whole.take_record().unwrap();

            let mut arena_split = Arena::new(8192);
            let mut split = RecordParser::new();
            let mut fed = 0;
            for byte in &input {
                fed += split
                    .parse(&mut arena_split, std::slice::from_ref(byte))
                    .unwrap();
            }
            assert_eq!(fed, input.len());
            let record_split = split.take_record().unwrap();

            assert_eq!(record_whole.header, record_split.header);
            match (&record_whole.body, &record_split.body) {
                (RecordBody::Params(a), RecordBody::Params(b)) => {
                    assert_eq!(a.len(), b.len());
                    for (pa, pb) in a.iter().zip(b) {
                        assert_eq!(arena_whole.bytes(pa.name), arena_split.bytes(pb.name));
                        assert_eq!(arena_whole.bytes(pa.value), arena_split.bytes(pb.value));
                    }
                }
                (RecordBody::Stdin(Some(a)), RecordBody::Stdin(Some(b))) => {
                    assert_eq!(arena_whole.bytes(*a), arena_split.bytes(*b));
                }
                (RecordBody::BeginRequest(a), RecordBody::BeginRequest(b)) => {
                    assert_eq!(a, b);
                }
                (a, b) => panic!("body mismatch: {a:?} vs {b:?}"),
            }
        }
    }

    #[test]
    fn test_resume_across_length_field_boundary() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();
        let input = stdin_record(0x0102, b"ab", 0);

        // Split in the middle of the 2-byte content length field.
        let split_at = 5;
        let first = parser.parse(&mut arena, &input[..split_at]).unwrap();
        assert_eq!(first, split_at);
        assert!(!parser.is_finished());

        let second = parser.parse(&mut arena, &input[split_at..]).unwrap();
        assert_eq!(first + second, input.len());

        let record = parser.take_record().unwrap();
        assert_eq!(record.header.request_id, 0x0102);
        assert_eq!(record.header.content_length, 2);
    }

    #[test]
    fn test_take_record_resets_for_next_record() {
        let mut arena = Arena::new(4096);
        let mut parser = RecordParser::new();

        let mut input = begin_record(1, 1, 0);
        input.extend_from_slice(&stdin_record(1, b"x", 0));

        let consumed = parse_all(&mut parser, &mut arena, &input);
        assert_eq!(consumed, 16, "parser stops at the first finished record");
        parser.take_record().unwrap();

        let rest = parse_all(&mut parser, &mut arena, &input[consumed..]);
        assert_eq!(consumed + rest, input.len());
        let record = parser.take_record().unwrap();
        assert_eq!(record.header.rtype, RecordType::Stdin);
    }

    #[test]
    fn test_arena_exhaustion_surfaces_and_parks_parser() {
        let mut arena = Arena::with_limit(16, 16);
        let mut parser = RecordParser::new();
        let input = stdin_record(1, &[0u8; 1024], 0);

        let err = parser.parse(&mut arena, &input).unwrap_err();
        assert!(matches!(err, EngineError::ArenaExhausted { .. }));
        assert!(parser.is_error());
    }
}
