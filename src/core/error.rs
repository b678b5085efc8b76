// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Error types for the FastCGI engine.
//!
//! The taxonomy follows the failure classes the engine distinguishes at
//! runtime:
//! - Transport errors (accept/read/write) close one connection
//! - Arena exhaustion aborts the in-flight request
//! - Protocol violations close the connection without a response
//! - Pool exhaustion refuses the new connection
//!
//! None of these are fatal to a worker. Only startup failures (bind/listen,
//! runtime construction) abort the process.

use std::fmt;

/// Errors that can occur while serving FastCGI traffic.
#[derive(Debug)]
pub enum EngineError {
    /// Per-connection arena refused an allocation.
    ArenaExhausted {
        /// Bytes requested by the failed allocation
        requested: usize,
        /// Configured byte limit for the arena
        limit: usize,
    },

    /// Malformed record or a record delivered in the wrong state.
    Protocol {
        /// Parser or assembler stage that rejected the input
        context: &'static str,
        /// What was wrong
        message: String,
    },

    /// No free slot in the connection pool.
    PoolExhausted {
        /// Configured pool capacity
        capacity: usize,
    },

    /// Socket-level failure.
    Io(std::io::Error),

    /// Process-fatal startup failure (bind, listen, runtime build).
    Startup {
        /// Startup step that failed
        stage: &'static str,
        /// Underlying error message
        message: String,
    },
}

impl EngineError {
    /// Create an arena exhaustion error.
    pub fn arena_exhausted(requested: usize, limit: usize) -> Self {
        EngineError::ArenaExhausted { requested, limit }
    }

    /// Create a protocol violation error.
    pub fn protocol(context: &'static str, message: impl Into<String>) -> Self {
        EngineError::Protocol {
            context,
            message: message.into(),
        }
    }

    /// Create a startup error.
    pub fn startup(stage: &'static str, message: impl Into<String>) -> Self {
        EngineError::Startup {
            stage,
            message: message.into(),
        }
    }

    /// Whether this error should tear down the whole process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Startup { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ArenaExhausted { requested, limit } => {
                write!(
                    f,
                    "arena exhausted: requested {requested} bytes with a limit of {limit}"
                )
            }
            EngineError::Protocol { context, message } => {
                write!(f, "protocol violation in {context}: {message}")
            }
            EngineError::PoolExhausted { capacity } => {
                write!(f, "connection pool exhausted ({capacity} slots)")
            }
            EngineError::Io(err) => write!(f, "I/O error: {err}"),
            EngineError::Startup { stage, message } => {
                write!(f, "startup failure during {stage}: {message}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_arena_exhausted_display() {
        let err = EngineError::arena_exhausted(4096, 1024);
        assert_eq!(
            err.to_string(),
            "arena exhausted: requested 4096 bytes with a limit of 1024"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_protocol_display() {
        let err = EngineError::protocol("parser", "unknown record type 9");
        assert_eq!(
            err.to_string(),
            "protocol violation in parser: unknown record type 9"
        );
    }

    #[test]
    fn test_startup_is_fatal() {
        let err = EngineError::startup("bind", "address in use");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "startup failure during bind: address in use"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_pool_exhausted_display() {
        let err = EngineError::PoolExhausted { capacity: 1024 };
        assert_eq!(err.to_string(), "connection pool exhausted (1024 slots)");
    }
}
