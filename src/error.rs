use thiserror::Error;

use crate::types::{ObjectId, ObjectType};

/// A message that could not be decoded at all. The whole message is dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no \"type\"")]
    MissingType,
    #[error("{kind} message has no \"data\"")]
    MissingData { kind: String },
    #[error("\"data\" of a TRACKING message is not an object")]
    DataNotObject,
}

/// A single batch entry that was dropped. The rest of the batch still applies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    #[error("object {id} has unknown category code {code}")]
    UnknownCategory { id: ObjectId, code: i64 },
    #[error("object {id} is a {object_type}, which has no appearance")]
    NoAppearance { id: ObjectId, object_type: ObjectType },
    #[error("object {id} is malformed: {reason}")]
    Malformed { id: ObjectId, reason: String },
}
