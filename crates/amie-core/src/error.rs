// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine-level error type.
//!
//! Errors split into two classes. Fatal errors mean the reconciler's contract
//! with the AMIE protocol is incomplete and the process must stop. Everything
//! else is retryable and aborts only the current sweep.

use crate::store::StoreError;
use crate::transport::TransportError;

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that escape a component into the scheduler.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A packet type with no handler arrived.
    #[error(
        "We do not know how to handle packets of type '{packet_type}' \
         (packet_rec_id {packet_rec_id}, trans_rec_id {trans_rec_id})"
    )]
    UnrecognizedPacketType {
        packet_type: String,
        packet_rec_id: String,
        trans_rec_id: String,
    },

    /// A known packet type whose handler is deliberately not implemented.
    #[error("{packet_type} not implemented (packet_rec_id {packet_rec_id})")]
    NotImplemented {
        packet_type: String,
        packet_rec_id: String,
    },

    /// The packet store could not be used.
    #[error("packet store error: {0}")]
    Storage(#[from] StoreError),

    /// The AMIE transport could not be used.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The engine was assembled without a required component.
    #[error("engine misconfigured: {0}")]
    Misconfigured(String),
}

impl EngineError {
    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedPacketType { .. } | Self::NotImplemented { .. } | Self::Misconfigured(_)
        )
    }

    /// Stable code for log correlation.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnrecognizedPacketType { .. } => "UNRECOGNIZED_PACKET_TYPE",
            Self::NotImplemented { .. } => "NOT_IMPLEMENTED",
            Self::Storage(_) => "STORAGE_UNAVAILABLE",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Misconfigured(_) => "MISCONFIGURED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let cases = vec![
            (
                EngineError::UnrecognizedPacketType {
                    packet_type: "request_mystery".to_string(),
                    packet_rec_id: "1".to_string(),
                    trans_rec_id: "2".to_string(),
                },
                true,
                "UNRECOGNIZED_PACKET_TYPE",
            ),
            (
                EngineError::NotImplemented {
                    packet_type: "request_person_merge".to_string(),
                    packet_rec_id: "1".to_string(),
                },
                true,
                "NOT_IMPLEMENTED",
            ),
            (
                EngineError::Storage(StoreError::Unavailable {
                    operation: "query",
                    details: "disk I/O error".to_string(),
                }),
                false,
                "STORAGE_UNAVAILABLE",
            ),
            (
                EngineError::Transport(TransportError::Status {
                    status: 503,
                    body: "maintenance".to_string(),
                }),
                false,
                "TRANSPORT_ERROR",
            ),
        ];

        for (error, fatal, code) in cases {
            assert_eq!(error.is_fatal(), fatal, "{:?}", error);
            assert_eq!(error.error_code(), code);
        }
    }

    #[test]
    fn test_unrecognized_display() {
        let err = EngineError::UnrecognizedPacketType {
            packet_type: "request_mystery".to_string(),
            packet_rec_id: "81".to_string(),
            trans_rec_id: "42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "We do not know how to handle packets of type 'request_mystery' \
             (packet_rec_id 81, trans_rec_id 42)"
        );
    }

    #[test]
    fn test_storage_display() {
        let err = EngineError::from(StoreError::Unavailable {
            operation: "connect",
            details: "unable to open database file".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "packet store error: storage unavailable during 'connect': unable to open database file"
        );
    }
}
