use std::result;

use common::error::CommonError;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("internal {0:?}")]
    Internal(String),
    /// A required collaborator is missing. Raised before any query is issued.
    #[error("configuration {0:?}")]
    Configuration(String),
    /// The database call failed. Carries the attempted SQL and parameters
    /// verbatim for diagnosis. Never retried.
    #[error("execution {message:?}")]
    Execution {
        message: String,
        sql: String,
        params: IndexMap<String, Value>,
    },
    #[error("common {0:?}")]
    Common(#[from] CommonError),
    #[error("other {0:?}")]
    Other(#[from] anyhow::Error),
}

impl QueryError {
    pub fn execution(
        message: impl ToString,
        sql: impl Into<String>,
        params: IndexMap<String, Value>,
    ) -> Self {
        QueryError::Execution {
            message: message.to_string(),
            sql: sql.into(),
            params,
        }
    }
}
