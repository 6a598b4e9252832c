use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed stored json in column {column}: {source}")]
    MalformedJson {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown system {0}")]
    UnknownSystem(i64),

    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),
}
