// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! FastCGI wire protocol: record model, incremental parser, request
//! assembly, and response framing.

pub mod parser;
pub mod record;
pub mod request;

pub use parser::RecordParser;
pub use record::{encode_response, Record, RecordBody, RecordHeader, RecordType};
pub use request::{Request, RequestState};
