use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the initial ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// Periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection name.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing part of a match failed.
    #[error("failed to save {part} of match `{id}`")]
    SaveMatch {
        /// Match being written.
        id: Uuid,
        /// Header, shots or tallies.
        part: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading part of a match failed.
    #[error("failed to load {part} of match `{id}`")]
    LoadMatch {
        /// Match being read.
        id: Uuid,
        /// Header, shots or tallies.
        part: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Listing headers failed.
    #[error("failed to list matches")]
    ListMatches {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The header kept changing underneath every save attempt.
    #[error("header of match `{id}` changed during {attempts} save attempt(s)")]
    HeaderContention {
        /// Match being written.
        id: Uuid,
        /// Attempts made before giving up.
        attempts: usize,
    },
    /// The view counter targeted a match that does not exist.
    #[error("match `{id}` does not exist")]
    MissingMatch {
        /// Requested match.
        id: Uuid,
    },
    /// A stored document carries an identifier that is not a UUID.
    #[error("document id `{raw}` is not a valid UUID")]
    InvalidDocument {
        /// Raw identifier.
        raw: String,
    },
}
