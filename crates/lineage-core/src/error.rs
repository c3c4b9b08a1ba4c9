//! Error types for `lineage-core`.
//!
//! These are the domain conditions every backend must be able to report in a
//! distinguishable way. Backends wrap them in their own error type and expose
//! them again through [`DomainError`].

use thiserror::Error;
use uuid::Uuid;

use crate::{event::ExpectedVersion, model::EntityKind};

#[derive(Debug, Error)]
pub enum Error {
  /// The stream's current version did not match the caller's expectation.
  /// Recoverable: refetch the aggregate and retry.
  #[error(
    "concurrency conflict on stream {stream_id}: expected {expected}, found \
     version {actual}"
  )]
  ConcurrencyConflict {
    stream_id: Uuid,
    expected:  ExpectedVersion,
    actual:    i64,
  },

  #[error("stream not found: {0}")]
  StreamNotFound(Uuid),

  #[error("event not found: {0}")]
  EventNotFound(Uuid),

  #[error("snapshot not found: {0}")]
  SnapshotNotFound(Uuid),

  #[error("{kind} not found: {id}")]
  EntityNotFound { kind: EntityKind, id: Uuid },

  #[error("unknown stream type: {0:?}")]
  UnknownStreamType(String),

  #[error("unknown event type: {0:?}")]
  UnknownEventType(String),

  #[error("cannot decode {event_type} payload: {source}")]
  Decoding {
    event_type: String,
    #[source]
    source:     serde_json::Error,
  },

  #[error("cannot encode {event_type} payload: {source}")]
  Encoding {
    event_type: String,
    #[source]
    source:     serde_json::Error,
  },

  #[error("event {event_type} belongs on a {expected} stream, not {actual}")]
  StreamTypeMismatch {
    event_type: String,
    expected:   String,
    actual:     String,
  },

  #[error("invalid change to field {field:?}: {reason}")]
  InvalidChange { field: String, reason: String },

  #[error("invalid query: {0}")]
  InvalidQuery(String),
}

impl Error {
  /// `true` for the absent-identifier family of errors.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::StreamNotFound(_)
        | Self::EventNotFound(_)
        | Self::SnapshotNotFound(_)
        | Self::EntityNotFound { .. }
    )
  }

  /// `true` when the payload could not be understood by this build's codec.
  /// Rebuilds skip such events; live appends fail on them.
  pub fn is_codec_failure(&self) -> bool {
    matches!(self, Self::UnknownEventType(_) | Self::Decoding { .. })
  }
}

/// Lets callers generic over a backend branch on domain conditions without
/// knowing the backend's concrete error type.
pub trait DomainError {
  /// The domain condition behind this error, if it is one.
  fn as_core(&self) -> Option<&Error>;
}

impl DomainError for Error {
  fn as_core(&self) -> Option<&Error> { Some(self) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
