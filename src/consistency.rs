use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::DbError;

/// Per-operation consistency requested from Cassandra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Any,
    #[default]
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
    Serial,
    LocalSerial,
}

impl ConsistencyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
            ConsistencyLevel::Serial => "SERIAL",
            ConsistencyLevel::LocalSerial => "LOCAL_SERIAL",
        }
    }

    /// Value of the `ConsistencyLevel` enum in cassandra.thrift.
    pub fn thrift_value(self) -> i32 {
        match self {
            ConsistencyLevel::One => 1,
            ConsistencyLevel::Quorum => 2,
            ConsistencyLevel::LocalQuorum => 3,
            ConsistencyLevel::EachQuorum => 4,
            ConsistencyLevel::All => 5,
            ConsistencyLevel::Any => 6,
            ConsistencyLevel::Two => 7,
            ConsistencyLevel::Three => 8,
            ConsistencyLevel::Serial => 9,
            ConsistencyLevel::LocalSerial => 10,
            ConsistencyLevel::LocalOne => 11,
        }
    }

    #[cfg(feature = "cql")]
    pub fn to_driver(self) -> scylla::statement::Consistency {
        use scylla::statement::Consistency;
        match self {
            ConsistencyLevel::Any => Consistency::Any,
            ConsistencyLevel::One => Consistency::One,
            ConsistencyLevel::Two => Consistency::Two,
            ConsistencyLevel::Three => Consistency::Three,
            ConsistencyLevel::Quorum => Consistency::Quorum,
            ConsistencyLevel::All => Consistency::All,
            ConsistencyLevel::LocalQuorum => Consistency::LocalQuorum,
            ConsistencyLevel::EachQuorum => Consistency::EachQuorum,
            ConsistencyLevel::LocalOne => Consistency::LocalOne,
            ConsistencyLevel::Serial => Consistency::Serial,
            ConsistencyLevel::LocalSerial => Consistency::LocalSerial,
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_uppercase().as_str() {
            "ANY" => ConsistencyLevel::Any,
            "ONE" => ConsistencyLevel::One,
            "TWO" => ConsistencyLevel::Two,
            "THREE" => ConsistencyLevel::Three,
            "QUORUM" => ConsistencyLevel::Quorum,
            "ALL" => ConsistencyLevel::All,
            "LOCAL_QUORUM" => ConsistencyLevel::LocalQuorum,
            "EACH_QUORUM" => ConsistencyLevel::EachQuorum,
            "LOCAL_ONE" => ConsistencyLevel::LocalOne,
            "SERIAL" => ConsistencyLevel::Serial,
            "LOCAL_SERIAL" => ConsistencyLevel::LocalSerial,
            other => {
                return Err(DbError::Config(format!(
                    "unknown consistency level {other:?}"
                )))
            }
        };
        Ok(level)
    }
}
