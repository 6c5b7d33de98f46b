//! Client side of the Cassandra Thrift service for the calls the bindings
//! make. Messages go out as strict binary protocol over a framed transport.

use std::borrow::Cow;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TInputProtocol, TMessageIdentifier,
    TMessageType, TOutputProtocol, TStructIdentifier, TType,
};
use thrift::transport::{
    ReadHalf, TFramedReadTransport, TFramedWriteTransport, TIoChannel, TTcpChannel, WriteHalf,
};

use super::types::{
    compression, field, is_invalid, read_fields, read_list, write_binary, write_i32, write_i64,
    write_mutation_map, AuthenticationRequest, ColumnOrSuperColumn, ColumnParent, ColumnPath,
    CqlResult, KeyRange, KeySlice, MutationMap, SlicePredicate,
};

pub const DEFAULT_PORT: u16 = 9160;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ThriftError {
    #[error(transparent)]
    Thrift(#[from] thrift::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no address found for {0}")]
    Resolve(String),

    /// A declared exception of the called method.
    #[error("{method}: {name}{}", why.as_ref().map(|w| format!(" ({w})")).unwrap_or_default())]
    Remote {
        method: &'static str,
        name: &'static str,
        why: Option<String>,
    },

    #[error("{method}: server error {kind}: {message}")]
    Application {
        method: &'static str,
        kind: i32,
        message: String,
    },

    #[error("{method}: {detail}")]
    Protocol { method: &'static str, detail: String },
}

impl ThriftError {
    /// Transport and framing failures can leave part of a reply unread, so
    /// the connection must be reopened. Declared and application exceptions,
    /// and replies rejected after being read in full, leave it usable.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            ThriftError::Thrift(_) | ThriftError::Io(_) | ThriftError::Resolve(_)
        )
    }
}

const DATA_EXCEPTIONS: &[&str] = &[
    "InvalidRequestException",
    "UnavailableException",
    "TimedOutException",
];

const CQL_EXCEPTIONS: &[&str] = &[
    "InvalidRequestException",
    "UnavailableException",
    "TimedOutException",
    "SchemaDisagreementException",
];

const LOGIN_EXCEPTIONS: &[&str] = &["AuthenticationException", "AuthorizationException"];

const KEYSPACE_EXCEPTIONS: &[&str] = &["InvalidRequestException"];

pub type FramedInput = TBinaryInputProtocol<TFramedReadTransport<ReadHalf<TTcpChannel>>>;
pub type FramedOutput = TBinaryOutputProtocol<TFramedWriteTransport<WriteHalf<TTcpChannel>>>;

/// A live connection to one node.
pub type Connection = ServiceClient<FramedInput, FramedOutput>;

/// Open a framed binary connection to `address` (`host:port`).
pub fn connect(address: &str) -> Result<Connection, ThriftError> {
    let socket = address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ThriftError::Resolve(address.to_string()))?;
    let stream = TcpStream::connect_timeout(&socket, CONNECT_TIMEOUT)?;
    stream.set_nodelay(true)?;

    let (read, write) = TTcpChannel::with_stream(stream).split()?;
    let input = TBinaryInputProtocol::new(TFramedReadTransport::new(read), false);
    let output = TBinaryOutputProtocol::new(TFramedWriteTransport::new(write), true);
    Ok(ServiceClient::new(input, output))
}

/// Synchronous request/response client. One call in flight at a time.
pub struct ServiceClient<I, O> {
    input: I,
    output: O,
    sequence: i32,
}

impl<I: TInputProtocol, O: TOutputProtocol> ServiceClient<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self {
            input,
            output,
            sequence: 0,
        }
    }

    pub fn login(&mut self, request: &AuthenticationRequest) -> Result<(), ThriftError> {
        self.call_void("login", LOGIN_EXCEPTIONS, |o| {
            o.write_field_begin(&field("auth_request", TType::Struct, 1))?;
            request.write(o)?;
            o.write_field_end()
        })
    }

    pub fn set_keyspace(&mut self, keyspace: &str) -> Result<(), ThriftError> {
        self.call_void("set_keyspace", KEYSPACE_EXCEPTIONS, |o| {
            o.write_field_begin(&field("keyspace", TType::String, 1))?;
            o.write_string(keyspace)?;
            o.write_field_end()
        })
    }

    /// With `gzip` set the query travels zlib-deflated and flagged `GZIP`.
    pub fn execute_cql3_query(
        &mut self,
        query: &[u8],
        gzip: bool,
        consistency: i32,
    ) -> Result<CqlResult, ThriftError> {
        let (query, flag) = if gzip {
            (Cow::Owned(compression::deflate(query)?), compression::GZIP)
        } else {
            (Cow::Borrowed(query), compression::NONE)
        };
        self.call(
            "execute_cql3_query",
            CQL_EXCEPTIONS,
            |o| {
                write_binary(o, "query", 1, &query)?;
                write_i32(o, "compression", 2, flag)?;
                write_i32(o, "consistency", 3, consistency)
            },
            |i| CqlResult::read(i),
        )
    }

    pub fn get_slice(
        &mut self,
        key: &[u8],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: i32,
    ) -> Result<Vec<ColumnOrSuperColumn>, ThriftError> {
        self.call(
            "get_slice",
            DATA_EXCEPTIONS,
            |o| {
                write_binary(o, "key", 1, key)?;
                o.write_field_begin(&field("column_parent", TType::Struct, 2))?;
                parent.write(o)?;
                o.write_field_end()?;
                o.write_field_begin(&field("predicate", TType::Struct, 3))?;
                predicate.write(o)?;
                o.write_field_end()?;
                write_i32(o, "consistency_level", 4, consistency)
            },
            |i| read_list(i, ColumnOrSuperColumn::read),
        )
    }

    pub fn get_range_slices(
        &mut self,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        range: &KeyRange,
        consistency: i32,
    ) -> Result<Vec<KeySlice>, ThriftError> {
        self.call(
            "get_range_slices",
            DATA_EXCEPTIONS,
            |o| {
                o.write_field_begin(&field("column_parent", TType::Struct, 1))?;
                parent.write(o)?;
                o.write_field_end()?;
                o.write_field_begin(&field("predicate", TType::Struct, 2))?;
                predicate.write(o)?;
                o.write_field_end()?;
                o.write_field_begin(&field("range", TType::Struct, 3))?;
                range.write(o)?;
                o.write_field_end()?;
                write_i32(o, "consistency_level", 4, consistency)
            },
            |i| read_list(i, KeySlice::read),
        )
    }

    pub fn batch_mutate(
        &mut self,
        mutations: &MutationMap,
        consistency: i32,
    ) -> Result<(), ThriftError> {
        self.call_void("batch_mutate", DATA_EXCEPTIONS, |o| {
            o.write_field_begin(&field("mutation_map", TType::Map, 1))?;
            write_mutation_map(o, mutations)?;
            o.write_field_end()?;
            write_i32(o, "consistency_level", 2, consistency)
        })
    }

    pub fn remove(
        &mut self,
        key: &[u8],
        path: &ColumnPath,
        timestamp: i64,
        consistency: i32,
    ) -> Result<(), ThriftError> {
        self.call_void("remove", DATA_EXCEPTIONS, |o| {
            write_binary(o, "key", 1, key)?;
            o.write_field_begin(&field("column_path", TType::Struct, 2))?;
            path.write(o)?;
            o.write_field_end()?;
            write_i64(o, "timestamp", 3, timestamp)?;
            write_i32(o, "consistency_level", 4, consistency)
        })
    }

    fn call<T, W, R>(
        &mut self,
        method: &'static str,
        exceptions: &[&'static str],
        write_args: W,
        read_success: R,
    ) -> Result<T, ThriftError>
    where
        W: FnOnce(&mut dyn TOutputProtocol) -> thrift::Result<()>,
        R: FnMut(&mut dyn TInputProtocol) -> thrift::Result<T>,
    {
        let sequence = self.send(method, write_args)?;
        self.receive(method, sequence, exceptions, read_success)?
            .ok_or_else(|| ThriftError::Protocol {
                method,
                detail: "reply carried no result".to_string(),
            })
    }

    fn call_void<W>(
        &mut self,
        method: &'static str,
        exceptions: &[&'static str],
        write_args: W,
    ) -> Result<(), ThriftError>
    where
        W: FnOnce(&mut dyn TOutputProtocol) -> thrift::Result<()>,
    {
        let sequence = self.send(method, write_args)?;
        self.receive(method, sequence, exceptions, |_| Ok(()))?;
        Ok(())
    }

    fn send<W>(&mut self, method: &'static str, write_args: W) -> Result<i32, ThriftError>
    where
        W: FnOnce(&mut dyn TOutputProtocol) -> thrift::Result<()>,
    {
        self.sequence = self.sequence.wrapping_add(1);
        let o = &mut self.output;
        o.write_message_begin(&TMessageIdentifier::new(
            method,
            TMessageType::Call,
            self.sequence,
        ))?;
        o.write_struct_begin(&TStructIdentifier::new(format!("{method}_args")))?;
        write_args(&mut *o)?;
        o.write_field_stop()?;
        o.write_struct_end()?;
        o.write_message_end()?;
        o.flush()?;
        Ok(self.sequence)
    }

    /// Read the reply envelope. Field 0 is the return value; any other field
    /// is one of the method's declared exceptions, numbered from 1.
    fn receive<T, R>(
        &mut self,
        method: &'static str,
        sequence: i32,
        exceptions: &[&'static str],
        mut read_success: R,
    ) -> Result<Option<T>, ThriftError>
    where
        R: FnMut(&mut dyn TInputProtocol) -> thrift::Result<T>,
    {
        let i = &mut self.input;
        let message = i.read_message_begin()?;

        if message.message_type == TMessageType::Exception {
            let (kind, text) = read_application_exception(&mut *i)?;
            i.read_message_end()?;
            return Err(ThriftError::Application {
                method,
                kind,
                message: text,
            });
        }
        let mismatch = if message.message_type != TMessageType::Reply || message.name != method {
            Some(format!(
                "expected reply to {method}, got {:?} {}",
                message.message_type, message.name
            ))
        } else if message.sequence_number != sequence {
            Some(format!(
                "sequence mismatch: sent {sequence}, received {}",
                message.sequence_number
            ))
        } else {
            None
        };
        if let Some(detail) = mismatch {
            // drop the stray message so the next reply starts at a boundary
            i.skip(TType::Struct)?;
            i.read_message_end()?;
            return Err(ThriftError::Protocol { method, detail });
        }

        let mut success = None;
        let mut remote = None;
        let walked = read_fields(&mut *i, |i, id, ty| {
            if id == 0 {
                success = Some(read_success(i)?);
                return Ok(true);
            }
            if ty != TType::Struct {
                return Ok(false);
            }
            let name = usize::try_from(id)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| exceptions.get(idx).copied())
                .unwrap_or("UnknownException");
            remote = Some((name, read_exception_why(i)?));
            Ok(true)
        });
        match walked {
            Err(err) if is_invalid(&err) => {
                i.read_message_end()?;
                return Err(ThriftError::Protocol {
                    method,
                    detail: err.to_string(),
                });
            }
            walked => walked?,
        }
        i.read_message_end()?;

        match remote {
            Some((name, why)) => Err(ThriftError::Remote { method, name, why }),
            None => Ok(success),
        }
    }
}

/// Cassandra exceptions carry their message, when they have one, as a string
/// in field 1.
fn read_exception_why(i: &mut dyn TInputProtocol) -> thrift::Result<Option<String>> {
    let mut why = None;
    read_fields(i, |i, id, ty| {
        if (id, ty) == (1, TType::String) {
            why = Some(i.read_string()?);
            return Ok(true);
        }
        Ok(false)
    })?;
    Ok(why)
}

fn read_application_exception(i: &mut dyn TInputProtocol) -> thrift::Result<(i32, String)> {
    let mut message = String::new();
    let mut kind = 0;
    read_fields(i, |i, id, ty| {
        match (id, ty) {
            (1, TType::String) => message = i.read_string()?,
            (2, TType::I32) => kind = i.read_i32()?,
            _ => return Ok(false),
        }
        Ok(true)
    })?;
    Ok((kind, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thrift::types::tests::{encode, input, SharedBuffer};
    use crate::thrift::types::{Column, Mutation};
    use std::io::Cursor;

    type TestClient = ServiceClient<
        TBinaryInputProtocol<Cursor<Vec<u8>>>,
        TBinaryOutputProtocol<SharedBuffer>,
    >;

    fn client(reply: Vec<u8>) -> (TestClient, SharedBuffer) {
        let sent = SharedBuffer::default();
        let output = TBinaryOutputProtocol::new(sent.clone(), true);
        (ServiceClient::new(input(reply), output), sent)
    }

    fn reply<F>(method: &str, sequence: i32, body: F) -> Vec<u8>
    where
        F: FnOnce(&mut dyn TOutputProtocol) -> thrift::Result<()>,
    {
        encode(|o| {
            o.write_message_begin(&TMessageIdentifier::new(
                method,
                TMessageType::Reply,
                sequence,
            ))?;
            o.write_struct_begin(&TStructIdentifier::new("result"))?;
            body(&mut *o)?;
            o.write_field_stop()?;
            o.write_struct_end()?;
            o.write_message_end()
        })
    }

    #[test]
    fn void_call_succeeds_on_empty_result() {
        let (mut client, sent) = client(reply("set_keyspace", 1, |_| Ok(())));
        client.set_keyspace("usertable").unwrap();

        let mut request = input(sent.bytes());
        let message = request.read_message_begin().unwrap();
        assert_eq!(message.name, "set_keyspace");
        assert_eq!(message.message_type, TMessageType::Call);
        assert_eq!(message.sequence_number, 1);
    }

    #[test]
    fn cql_result_is_returned() {
        let body = reply("execute_cql3_query", 1, |o| {
            o.write_field_begin(&field("success", TType::Struct, 0))?;
            o.write_struct_begin(&TStructIdentifier::new("CqlResult"))?;
            write_i32(o, "type", 1, 2)?;
            o.write_field_stop()?;
            o.write_struct_end()?;
            o.write_field_end()
        });
        let (mut client, _) = client(body);
        let result = client
            .execute_cql3_query(b"DELETE FROM data WHERE key = 'x'", false, 1)
            .unwrap();
        assert!(result.rows.is_empty());
    }

    #[test]
    fn declared_exception_is_decoded() {
        let body = reply("execute_cql3_query", 1, |o| {
            o.write_field_begin(&field("ire", TType::Struct, 1))?;
            o.write_struct_begin(&TStructIdentifier::new("InvalidRequestException"))?;
            o.write_field_begin(&field("why", TType::String, 1))?;
            o.write_string("unconfigured table nope")?;
            o.write_field_end()?;
            o.write_field_stop()?;
            o.write_struct_end()?;
            o.write_field_end()
        });
        let (mut client, _) = client(body);

        let err = client
            .execute_cql3_query(b"SELECT * FROM nope", false, 1)
            .unwrap_err();
        match err {
            ThriftError::Remote { name, why, .. } => {
                assert_eq!(name, "InvalidRequestException");
                assert_eq!(why.as_deref(), Some("unconfigured table nope"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn timeout_without_message() {
        let body = reply("batch_mutate", 1, |o| {
            o.write_field_begin(&field("te", TType::Struct, 3))?;
            o.write_struct_begin(&TStructIdentifier::new("TimedOutException"))?;
            write_i32(o, "acknowledged_by", 1, 0)?;
            o.write_field_stop()?;
            o.write_struct_end()?;
            o.write_field_end()
        });
        let (mut client, _) = client(body);

        let mut mutations = MutationMap::new();
        mutations
            .entry(b"k".to_vec())
            .or_default()
            .insert("data".to_string(), vec![Mutation::insert(Column::new("a", "b", 1))]);
        let err = client.batch_mutate(&mutations, 1).unwrap_err();
        assert_eq!(err.to_string(), "batch_mutate: TimedOutException");
    }

    #[test]
    fn application_exception_is_reported() {
        let body = encode(|o| {
            o.write_message_begin(&TMessageIdentifier::new(
                "get_slice",
                TMessageType::Exception,
                1,
            ))?;
            o.write_struct_begin(&TStructIdentifier::new("TApplicationException"))?;
            o.write_field_begin(&field("message", TType::String, 1))?;
            o.write_string("Internal error processing get_slice")?;
            o.write_field_end()?;
            write_i32(o, "type", 2, 6)?;
            o.write_field_stop()?;
            o.write_struct_end()?;
            o.write_message_end()
        });
        let (mut client, _) = client(body);

        let err = client
            .get_slice(
                b"k",
                &ColumnParent::new("data"),
                &SlicePredicate::Range(crate::thrift::types::SliceRange::all()),
                1,
            )
            .unwrap_err();
        assert!(matches!(err, ThriftError::Application { kind: 6, .. }));
    }

    fn cql_result_reply(sequence: i32, result_type: i32) -> Vec<u8> {
        reply("execute_cql3_query", sequence, |o| {
            o.write_field_begin(&field("success", TType::Struct, 0))?;
            o.write_struct_begin(&TStructIdentifier::new("CqlResult"))?;
            write_i32(o, "type", 1, result_type)?;
            o.write_field_stop()?;
            o.write_struct_end()?;
            o.write_field_end()
        })
    }

    #[test]
    fn stale_sequence_is_rejected() {
        let replies = [
            reply("set_keyspace", 7, |_| Ok(())),
            reply("set_keyspace", 2, |_| Ok(())),
        ]
        .concat();
        let (mut client, _) = client(replies);
        let err = client.set_keyspace("usertable").unwrap_err();
        assert!(matches!(err, ThriftError::Protocol { .. }));
        assert!(!err.breaks_connection());

        // the stray reply was consumed whole
        client.set_keyspace("usertable").unwrap();
    }

    #[test]
    fn invalid_reply_leaves_the_next_one_readable() {
        let replies = [cql_result_reply(1, 9), cql_result_reply(2, 2)].concat();
        let (mut client, _) = client(replies);

        let err = client
            .execute_cql3_query(b"SELECT * FROM data", false, 1)
            .unwrap_err();
        assert!(err.to_string().contains("unknown CqlResultType 9"), "{err}");
        assert!(!err.breaks_connection());

        let result = client
            .execute_cql3_query(b"SELECT * FROM data", false, 1)
            .unwrap();
        assert_eq!(result.result_type, crate::thrift::types::CqlResultType::Void);
    }

    #[test]
    fn truncated_reply_breaks_the_connection() {
        let mut bytes = cql_result_reply(1, 2);
        bytes.truncate(bytes.len() - 3);
        let (mut client, _) = client(bytes);
        let err = client
            .execute_cql3_query(b"SELECT * FROM data", false, 1)
            .unwrap_err();
        assert!(err.breaks_connection(), "{err}");
    }

    #[test]
    fn gzip_queries_are_deflated() {
        use std::io::Read;

        let query = b"SELECT * FROM data WHERE key = 'BrianFrankCooper'";
        let (mut client, sent) = client(cql_result_reply(1, 2));
        client.execute_cql3_query(query, true, 1).unwrap();

        let mut request = input(sent.bytes());
        request.read_message_begin().unwrap();
        request.read_struct_begin().unwrap();
        assert_eq!(request.read_field_begin().unwrap().id, Some(1));
        let body = request.read_bytes().unwrap();
        request.read_field_end().unwrap();
        assert_eq!(request.read_field_begin().unwrap().id, Some(2));
        assert_eq!(request.read_i32().unwrap(), compression::GZIP);

        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(body.as_slice())
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, query.to_vec());
    }

    #[test]
    fn plain_queries_are_flagged_none() {
        let (mut client, sent) = client(cql_result_reply(1, 2));
        client.execute_cql3_query(b"SELECT 1", false, 1).unwrap();

        let mut request = input(sent.bytes());
        request.read_message_begin().unwrap();
        request.read_struct_begin().unwrap();
        request.read_field_begin().unwrap();
        assert_eq!(request.read_bytes().unwrap(), b"SELECT 1".to_vec());
        request.read_field_end().unwrap();
        request.read_field_begin().unwrap();
        assert_eq!(request.read_i32().unwrap(), compression::NONE);
    }

    #[test]
    fn missing_result_is_an_error() {
        let (mut client, _) = client(reply("get_range_slices", 1, |_| Ok(())));
        let range = KeyRange {
            start_key: b"a".to_vec(),
            end_key: Vec::new(),
            count: 2,
        };
        let err = client
            .get_range_slices(
                &ColumnParent::new("data"),
                &SlicePredicate::ColumnNames(vec![b"age".to_vec()]),
                &range,
                1,
            )
            .unwrap_err();
        assert!(matches!(err, ThriftError::Protocol { .. }));
    }
}
