//! Errors raised while hydrating server records

use crate::post::PostId;
use thiserror::Error;

/// A record that cannot be turned into a post or blog.
///
/// These are isolated per record: the batch carrying one keeps merging.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has no usable Id")]
    MissingId,

    #[error("post {id}: missing {field}")]
    MissingField { id: PostId, field: &'static str },

    #[error("post {id}: unparseable {field}: {value}")]
    Unparseable {
        id: PostId,
        field: &'static str,
        value: String,
    },

    #[error("blog record: {0}")]
    Blog(String),

    #[error("response holds no post list")]
    NotAPostList,
}

impl RecordError {
    /// Id of the offending post, when the record got that far.
    pub fn post_id(&self) -> Option<&PostId> {
        match self {
            RecordError::MissingField { id, .. } | RecordError::Unparseable { id, .. } => Some(id),
            _ => None,
        }
    }
}
