//! Binding configuration.
//!
//! Settings arrive as Java-style properties, either from files (`-P`) or from
//! individual `-p key=value` overrides, using the property names the
//! Cassandra bindings have always used (`hosts`, `cassandra.keyspace`, ...).

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::consistency::ConsistencyLevel;
use crate::error::DbError;
use crate::retry::RetryPolicy;

pub const HOSTS_PROPERTY: &str = "hosts";
pub const PORT_PROPERTY: &str = "port";
pub const DEBUG_PROPERTY: &str = "debug";

pub const KEYSPACE_PROPERTY: &str = "cassandra.keyspace";
pub const KEYSPACE_PROPERTY_DEFAULT: &str = "usertable";

pub const COLUMN_FAMILY_PROPERTY: &str = "cassandra.columnfamily";
pub const COLUMN_FAMILY_PROPERTY_DEFAULT: &str = "data";

pub const KEY_COLUMN_NAME_PROPERTY: &str = "cassandra.key.column";
pub const KEY_COLUMN_NAME_PROPERTY_DEFAULT: &str = "key";

pub const CONNECTION_RETRY_PROPERTY: &str = "cassandra.connectionretries";
pub const CONNECTION_RETRY_PROPERTY_DEFAULT: u32 = 300;

pub const OPERATION_RETRY_PROPERTY: &str = "cassandra.operationretries";
pub const OPERATION_RETRY_PROPERTY_DEFAULT: u32 = 300;

pub const OPERATION_RETRY_DELAY_PROPERTY: &str = "cassandra.retrydelayms";
pub const OPERATION_RETRY_DELAY_PROPERTY_DEFAULT: u64 = 500;

pub const CONNECTION_RETRY_DELAY_PROPERTY: &str = "cassandra.connectiondelayms";
pub const CONNECTION_RETRY_DELAY_PROPERTY_DEFAULT: u64 = 1000;

pub const USERNAME_PROPERTY: &str = "cassandra.username";
pub const PASSWORD_PROPERTY: &str = "cassandra.password";

pub const READ_CONSISTENCY_LEVEL_PROPERTY: &str = "cassandra.readconsistencylevel";
pub const WRITE_CONSISTENCY_LEVEL_PROPERTY: &str = "cassandra.writeconsistencylevel";
pub const SCAN_CONSISTENCY_LEVEL_PROPERTY: &str = "cassandra.scanconsistencylevel";
pub const DELETE_CONSISTENCY_LEVEL_PROPERTY: &str = "cassandra.deleteconsistencylevel";

pub const COMPRESSION_PROPERTY: &str = "cassandra.compression";

/// Flat string properties, later entries overriding earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `key=value` / `key: value` format, skipping blank lines and
    /// `#` / `!` comments.
    pub fn parse(text: &str) -> Self {
        let mut props = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let split = line.find(['=', ':']);
            let (key, value) = match split {
                Some(idx) => (&line[..idx], &line[idx + 1..]),
                None => (line, ""),
            };
            props.set(key.trim(), value.trim());
        }
        props
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse a single `key=value` override.
    pub fn parse_override(pair: &str) -> Result<(String, String), DbError> {
        match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(DbError::Config(format!(
                "expected key=value, got {pair:?}"
            ))),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn merge(&mut self, other: Properties) {
        self.values.extend(other.values);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, DbError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| DbError::Config(format!("invalid value {raw:?} for {key}"))),
        }
    }

    fn consistency(&self, key: &str) -> Result<ConsistencyLevel, DbError> {
        match self.get(key) {
            None => Ok(ConsistencyLevel::One),
            Some(raw) => raw.parse(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}

/// CQL frame compression negotiated by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Snappy,
    Lz4,
}

impl FromStr for Compression {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "false" => Ok(Compression::None),
            "snappy" | "true" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            other => Err(DbError::Config(format!("unknown compression {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsistencyLevels {
    pub read: ConsistencyLevel,
    pub write: ConsistencyLevel,
    pub scan: ConsistencyLevel,
    pub delete: ConsistencyLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct CassandraConfig {
    pub hosts: Vec<String>,
    pub port: Option<u16>,
    pub keyspace: String,
    pub column_family: String,
    pub key_column: String,
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
    pub consistency: ConsistencyLevels,
    pub connection_retries: u32,
    pub connection_retry_delay: Duration,
    pub operation_retries: u32,
    pub operation_retry_delay: Duration,
    pub compression: Compression,
    /// Thrift reads `cassandra.compression` as a boolean: `true` sends CQL3
    /// queries gzip-compressed.
    pub thrift_compression: bool,
    pub debug: bool,
}

impl CassandraConfig {
    pub fn from_properties(props: &Properties) -> Result<Self, DbError> {
        let hosts = props
            .get(HOSTS_PROPERTY)
            .map(|h| {
                h.split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let port = match props.get(PORT_PROPERTY) {
            None => None,
            Some(raw) => Some(raw.parse().map_err(|_| {
                DbError::Config(format!("invalid value {raw:?} for {PORT_PROPERTY}"))
            })?),
        };

        let username = props.get(USERNAME_PROPERTY).map(str::to_string);
        let password = props.get(PASSWORD_PROPERTY).map(str::to_string);

        Ok(Self {
            hosts,
            port,
            keyspace: props
                .get_or(KEYSPACE_PROPERTY, KEYSPACE_PROPERTY_DEFAULT)
                .to_string(),
            column_family: props
                .get_or(COLUMN_FAMILY_PROPERTY, COLUMN_FAMILY_PROPERTY_DEFAULT)
                .to_string(),
            key_column: props
                .get_or(KEY_COLUMN_NAME_PROPERTY, KEY_COLUMN_NAME_PROPERTY_DEFAULT)
                .to_string(),
            username,
            password,
            consistency: ConsistencyLevels {
                read: props.consistency(READ_CONSISTENCY_LEVEL_PROPERTY)?,
                write: props.consistency(WRITE_CONSISTENCY_LEVEL_PROPERTY)?,
                scan: props.consistency(SCAN_CONSISTENCY_LEVEL_PROPERTY)?,
                delete: props.consistency(DELETE_CONSISTENCY_LEVEL_PROPERTY)?,
            },
            connection_retries: props
                .parse_or(CONNECTION_RETRY_PROPERTY, CONNECTION_RETRY_PROPERTY_DEFAULT)?,
            connection_retry_delay: Duration::from_millis(props.parse_or(
                CONNECTION_RETRY_DELAY_PROPERTY,
                CONNECTION_RETRY_DELAY_PROPERTY_DEFAULT,
            )?),
            operation_retries: props
                .parse_or(OPERATION_RETRY_PROPERTY, OPERATION_RETRY_PROPERTY_DEFAULT)?,
            operation_retry_delay: Duration::from_millis(props.parse_or(
                OPERATION_RETRY_DELAY_PROPERTY,
                OPERATION_RETRY_DELAY_PROPERTY_DEFAULT,
            )?),
            compression: props.parse_or(COMPRESSION_PROPERTY, Compression::default())?,
            thrift_compression: props
                .get(COMPRESSION_PROPERTY)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            debug: props.parse_or(DEBUG_PROPERTY, false)?,
        })
    }

    /// Credentials are only used when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }

    /// Contact points as `host:port`, leaving hosts that already carry a
    /// port untouched.
    pub fn contact_points(&self, default_port: u16) -> Vec<String> {
        let port = self.port.unwrap_or(default_port);
        self.hosts
            .iter()
            .map(|h| {
                if h.contains(':') {
                    h.clone()
                } else {
                    format!("{h}:{port}")
                }
            })
            .collect()
    }

    pub fn require_hosts(&self) -> Result<(), DbError> {
        if self.hosts.is_empty() {
            return Err(DbError::Config(format!(
                "required property \"{HOSTS_PROPERTY}\" missing"
            )));
        }
        Ok(())
    }

    pub fn operation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.operation_retries, self.operation_retry_delay)
    }

    pub fn connection_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connection_retries, self.connection_retry_delay)
    }
}
