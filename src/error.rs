use std::fmt;

use thiserror::Error;

/// Result code reported back to the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => -1,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The five operations of the harness contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Scan,
    Update,
    Insert,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Scan => "scan",
            Operation::Update => "update",
            Operation::Insert => "insert",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// Every attempt failed; carries the last error seen.
    #[error("{operation} of key {key:?} failed after {attempts} attempts: {source:#}")]
    Exhausted {
        operation: Operation,
        key: String,
        attempts: u32,
        source: anyhow::Error,
    },

    #[error("unable to connect to {hosts} after {attempts} attempts: {source:#}")]
    Connect {
        hosts: String,
        attempts: u32,
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cleanup failed: {0:#}")]
    Cleanup(anyhow::Error),
}

impl DbError {
    /// There is a single failure class; every error maps to the generic code.
    pub fn status(&self) -> Status {
        Status::Error
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Error.code(), -1);
    }

    #[test]
    fn every_error_is_generic_failure() {
        let err = DbError::Exhausted {
            operation: Operation::Read,
            key: "user1".to_string(),
            attempts: 3,
            source: anyhow::anyhow!("timed out"),
        };
        assert_eq!(err.status(), Status::Error);
        assert_eq!(
            err.to_string(),
            "read of key \"user1\" failed after 3 attempts: timed out"
        );
        assert_eq!(DbError::Config("x".into()).status().code(), -1);
    }
}
