#![cfg(feature = "thrift")]
//! Bindings over the legacy Thrift RPC interface.
//!
//! The Thrift runtime is blocking, so each binding owns one connection behind
//! a mutex and runs every call on the blocking pool.

pub mod cql3;
pub mod protocol;
pub mod template;
pub mod types;

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::CassandraConfig;
use crate::error::DbError;
use protocol::{Connection, ThriftError};
use types::AuthenticationRequest;

pub use cql3::ThriftCqlStore;
pub use protocol::DEFAULT_PORT;
pub use template::{ColumnFamilyTemplate, ThriftTemplateStore};

/// Where and as whom to connect.
#[derive(Debug, Clone)]
struct Target {
    address: String,
    keyspace: String,
    credentials: Option<(String, String)>,
}

fn open(target: &Target) -> Result<Connection, ThriftError> {
    let mut connection = protocol::connect(&target.address)?;
    if let Some((username, password)) = &target.credentials {
        connection.login(&AuthenticationRequest::new(username, password))?;
    }
    connection.set_keyspace(&target.keyspace)?;
    Ok(connection)
}

/// One node connection shared by the calls of a single binding instance.
///
/// A call that fails mid-message drops the connection; the next call opens a
/// fresh one to the same node.
pub struct ThriftSession {
    connection: Arc<Mutex<Option<Connection>>>,
    target: Arc<Target>,
}

impl ThriftSession {
    /// Connect to one host picked at random from the configured list.
    pub async fn connect(config: &CassandraConfig) -> Result<Self, DbError> {
        config.require_hosts()?;
        let hosts = config.contact_points(DEFAULT_PORT);
        let address = hosts
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| DbError::Config("no hosts to connect to".to_string()))?;

        let target = Arc::new(Target {
            address: address.clone(),
            keyspace: config.keyspace.clone(),
            credentials: config
                .credentials()
                .map(|(u, p)| (u.to_string(), p.to_string())),
        });

        let (attempts, connection) = config
            .connection_policy()
            .run(|| {
                let target = Arc::clone(&target);
                async move {
                    let connection =
                        tokio::task::spawn_blocking(move || open(&target)).await??;
                    Ok::<_, anyhow::Error>(connection)
                }
            })
            .await;
        let connection = connection.map_err(|source| {
            warn!(host = %address, attempts, "unable to connect");
            DbError::Connect {
                hosts: address.clone(),
                attempts,
                source,
            }
        })?;

        info!(host = %address, keyspace = %config.keyspace, "connected over thrift");
        Ok(Self {
            connection: Arc::new(Mutex::new(Some(connection))),
            target,
        })
    }

    pub fn address(&self) -> &str {
        &self.target.address
    }

    /// Run `f` against the connection on the blocking pool, reopening it
    /// first if an earlier call broke it.
    pub async fn call<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T, ThriftError> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let target = Arc::clone(&self.target);
        tokio::task::spawn_blocking(move || -> anyhow::Result<T> {
            let mut slot = connection
                .lock()
                .map_err(|_| anyhow!("thrift connection lock poisoned"))?;
            Ok(with_connection(&mut *slot, || open(&target), f)?)
        })
        .await?
    }
}

/// Take the connection out of `slot` (opening one if it is empty), run `f`,
/// and put it back unless `f` left it mid-message.
fn with_connection<C, T, O, F>(slot: &mut Option<C>, open: O, f: F) -> Result<T, ThriftError>
where
    O: FnOnce() -> Result<C, ThriftError>,
    F: FnOnce(&mut C) -> Result<T, ThriftError>,
{
    let mut connection = match slot.take() {
        Some(connection) => connection,
        None => {
            info!("reopening thrift connection");
            open()?
        }
    };
    match f(&mut connection) {
        Err(err) if err.breaks_connection() => {
            warn!(error = %err, "dropping thrift connection");
            Err(err)
        }
        result => {
            *slot = Some(connection);
            result
        }
    }
}

/// Column name as text; Cassandra names are UTF-8 in practice.
pub(crate) fn column_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Current time in microseconds, the unit Thrift write timestamps use.
pub(crate) fn timestamp_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol_error() -> ThriftError {
        ThriftError::Protocol {
            method: "get_slice",
            detail: "reply carried no result".to_string(),
        }
    }

    fn broken_pipe() -> ThriftError {
        ThriftError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }

    #[test]
    fn broken_connection_is_reopened_on_next_call() {
        let mut slot = Some(1u32);
        let mut opened = 0;

        let err = with_connection(&mut slot, || unreachable!(), |_| -> Result<(), _> {
            Err(broken_pipe())
        })
        .unwrap_err();
        assert!(err.breaks_connection());
        assert!(slot.is_none());

        let seen = with_connection(
            &mut slot,
            || {
                opened += 1;
                Ok(2)
            },
            |c| Ok(*c),
        )
        .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(opened, 1);
        assert_eq!(slot, Some(2));
    }

    #[test]
    fn rejected_replies_keep_the_connection() {
        let mut slot = Some(1u32);
        let err = with_connection(&mut slot, || unreachable!(), |_| -> Result<(), _> {
            Err(protocol_error())
        })
        .unwrap_err();
        assert!(!err.breaks_connection());
        assert_eq!(slot, Some(1));
    }

    #[test]
    fn failed_reopen_leaves_slot_empty() {
        let mut slot: Option<u32> = None;
        let err = with_connection(&mut slot, || Err(broken_pipe()), |c| Ok(*c)).unwrap_err();
        assert!(err.breaks_connection());
        assert!(slot.is_none());
    }
}
