//! Failures of the CouchDB match store.

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias for CouchDB calls.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Errors raised while talking to CouchDB. `path` is the document or
/// database path the request targeted.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// A required environment variable is not set.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB HTTP client")]
    Client {
        /// Builder error.
        #[source]
        source: reqwest::Error,
    },
    /// The request never got an answer.
    #[error("CouchDB request to `{path}` failed")]
    Transport {
        /// Requested path.
        path: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered with a status the caller does not handle.
    #[error("CouchDB answered {status} for `{path}`")]
    UnexpectedStatus {
        /// Requested path.
        path: String,
        /// Status returned.
        status: StatusCode,
    },
    /// The document revision moved between read and write.
    #[error("CouchDB revision conflict on `{path}`")]
    RevisionConflict {
        /// Conflicting document path.
        path: String,
    },
    /// The response body was not valid JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    Decode {
        /// Requested path.
        path: String,
        /// Body decoding error.
        #[source]
        source: reqwest::Error,
    },
    /// A listed document could not be read as a match.
    #[error("CouchDB document `{path}` does not match the match schema")]
    Deserialize {
        /// Document path.
        path: String,
        /// Schema mismatch.
        #[source]
        source: serde_json::Error,
    },
    /// A document ID is not `match::<uuid>`.
    #[error("invalid match document ID `{doc_id}`: {kind}")]
    InvalidDocId {
        /// Offending ID.
        doc_id: String,
        /// What is wrong with it.
        kind: &'static str,
    },
}
