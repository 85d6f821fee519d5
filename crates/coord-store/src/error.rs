use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("namespace not found")]
    NamespaceNotFound,
    #[error("node not found")]
    NodeNotFound,
    #[error("pre-auth key not found")]
    PreAuthKeyNotFound,
    #[error("api key not found")]
    ApiKeyNotFound,
    #[error("route not found")]
    RouteNotFound,
    #[error("operator not found")]
    OperatorNotFound,
    #[error("no addresses available in the configured overlay prefixes")]
    NoAddressesAvailable,
    #[error("namespace name is invalid: {0}")]
    InvalidNamespaceName(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
