use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB calls.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB match store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required environment variable is not set.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Rejected URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server did not answer the first ping.
    #[error("MongoDB did not answer the connection ping")]
    InitialPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Indexed collection.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Upserting a match failed.
    #[error("failed to save match `{id}`")]
    SaveMatch {
        /// Match identifier.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading a match failed.
    #[error("failed to load match `{id}`")]
    LoadMatch {
        /// Match identifier.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Listing matches failed.
    #[error("failed to list matches")]
    ListMatches {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Deleting a match failed.
    #[error("failed to delete match `{id}`")]
    DeleteMatch {
        /// Match identifier.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing one player's sequence failed.
    #[error("failed to save sequence of `{player}` in match `{id}`")]
    SaveSequence {
        /// Match identifier.
        id: Uuid,
        /// Player whose sequence was written.
        player: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A stored `_id` is not a UUID.
    #[error("stored match document has an invalid id `{raw}`")]
    InvalidId {
        /// Stored value.
        raw: String,
    },
}
