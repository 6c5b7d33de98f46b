//! The slice of the Cassandra Thrift IDL the bindings need, with hand-written
//! binary codecs. Fields not listed here are skipped on read.

use std::collections::BTreeMap;

use thrift::protocol::{
    TFieldIdentifier, TInputProtocol, TListIdentifier, TMapIdentifier, TOutputProtocol,
    TStructIdentifier, TType,
};
use thiserror::Error;

pub(crate) fn field(name: &str, field_type: TType, id: i16) -> TFieldIdentifier {
    TFieldIdentifier::new(name, field_type, id)
}

/// A reply that decoded cleanly but breaks the IDL (a required field unset,
/// an unknown enum value). Raised only once the offending struct has been
/// read to its end, so the stream stays aligned for the next message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidReply(String);

pub(crate) fn invalid(detail: String) -> thrift::Error {
    thrift::Error::User(Box::new(InvalidReply(detail)))
}

pub(crate) fn is_invalid(err: &thrift::Error) -> bool {
    matches!(err, thrift::Error::User(inner) if inner.is::<InvalidReply>())
}

pub(crate) fn missing(structure: &str, name: &str) -> thrift::Error {
    invalid(format!("required field {structure}.{name} not set"))
}

/// Upper bound on capacity reserved from a wire length.
const MAX_PREALLOCATED: usize = 1024;

/// Walk the fields of a struct. `on_field` returns `false` for fields it does
/// not consume; those are skipped. An [`InvalidReply`] from `on_field` is held
/// until the struct end has been read.
pub(crate) fn read_fields<F>(i: &mut dyn TInputProtocol, mut on_field: F) -> thrift::Result<()>
where
    F: FnMut(&mut dyn TInputProtocol, i16, TType) -> thrift::Result<bool>,
{
    let mut deferred = None;
    i.read_struct_begin()?;
    loop {
        let ident = i.read_field_begin()?;
        if ident.field_type == TType::Stop {
            break;
        }
        let consumed = match ident.id {
            Some(id) => match on_field(&mut *i, id, ident.field_type) {
                Ok(consumed) => consumed,
                Err(err) if is_invalid(&err) => {
                    deferred.get_or_insert(err);
                    true
                }
                Err(err) => return Err(err),
            },
            None => false,
        };
        if !consumed {
            i.skip(ident.field_type)?;
        }
        i.read_field_end()?;
    }
    i.read_struct_end()?;
    deferred.map_or(Ok(()), Err)
}

/// Read a list, decoding every element even after one is invalid.
pub(crate) fn read_list<T, F>(i: &mut dyn TInputProtocol, mut element: F) -> thrift::Result<Vec<T>>
where
    F: FnMut(&mut dyn TInputProtocol) -> thrift::Result<T>,
{
    let ident = i.read_list_begin()?;
    let size = usize::try_from(ident.size).unwrap_or(0);
    let mut items = Vec::with_capacity(size.min(MAX_PREALLOCATED));
    let mut deferred = None;
    for _ in 0..size {
        match element(&mut *i) {
            Ok(item) => items.push(item),
            Err(err) if is_invalid(&err) => {
                deferred.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }
    }
    i.read_list_end()?;
    deferred.map_or(Ok(items), Err)
}

pub(crate) fn write_binary(
    o: &mut dyn TOutputProtocol,
    name: &str,
    id: i16,
    value: &[u8],
) -> thrift::Result<()> {
    o.write_field_begin(&field(name, TType::String, id))?;
    o.write_bytes(value)?;
    o.write_field_end()
}

pub(crate) fn write_i32(
    o: &mut dyn TOutputProtocol,
    name: &str,
    id: i16,
    value: i32,
) -> thrift::Result<()> {
    o.write_field_begin(&field(name, TType::I32, id))?;
    o.write_i32(value)?;
    o.write_field_end()
}

pub(crate) fn write_i64(
    o: &mut dyn TOutputProtocol,
    name: &str,
    id: i16,
    value: i64,
) -> thrift::Result<()> {
    o.write_field_begin(&field(name, TType::I64, id))?;
    o.write_i64(value)?;
    o.write_field_end()
}

fn write_string(o: &mut dyn TOutputProtocol, name: &str, id: i16, value: &str) -> thrift::Result<()> {
    o.write_field_begin(&field(name, TType::String, id))?;
    o.write_string(value)?;
    o.write_field_end()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Column {
    pub name: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
    pub ttl: Option<i32>,
}

impl Column {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            timestamp: Some(timestamp),
            ttl: None,
        }
    }

    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("Column"))?;
        write_binary(o, "name", 1, &self.name)?;
        if let Some(value) = &self.value {
            write_binary(o, "value", 2, value)?;
        }
        if let Some(timestamp) = self.timestamp {
            write_i64(o, "timestamp", 3, timestamp)?;
        }
        if let Some(ttl) = self.ttl {
            write_i32(o, "ttl", 4, ttl)?;
        }
        o.write_field_stop()?;
        o.write_struct_end()
    }

    pub fn read(i: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut name = None;
        let mut column = Column::default();
        read_fields(i, |i, id, ty| {
            match (id, ty) {
                (1, TType::String) => name = Some(i.read_bytes()?),
                (2, TType::String) => column.value = Some(i.read_bytes()?),
                (3, TType::I64) => column.timestamp = Some(i.read_i64()?),
                (4, TType::I32) => column.ttl = Some(i.read_i32()?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        column.name = name.ok_or_else(|| missing("Column", "name"))?;
        Ok(column)
    }
}

/// Only the plain-column arm is modelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOrSuperColumn {
    pub column: Option<Column>,
}

impl ColumnOrSuperColumn {
    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("ColumnOrSuperColumn"))?;
        if let Some(column) = &self.column {
            o.write_field_begin(&field("column", TType::Struct, 1))?;
            column.write(o)?;
            o.write_field_end()?;
        }
        o.write_field_stop()?;
        o.write_struct_end()
    }

    pub fn read(i: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut cosc = ColumnOrSuperColumn::default();
        read_fields(i, |i, id, ty| {
            if (id, ty) == (1, TType::Struct) {
                cosc.column = Some(Column::read(i)?);
                return Ok(true);
            }
            Ok(false)
        })?;
        Ok(cosc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnParent {
    pub column_family: String,
}

impl ColumnParent {
    pub fn new(column_family: impl Into<String>) -> Self {
        Self {
            column_family: column_family.into(),
        }
    }

    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("ColumnParent"))?;
        write_string(o, "column_family", 3, &self.column_family)?;
        o.write_field_stop()?;
        o.write_struct_end()
    }
}

/// Addresses a whole row when `column` is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPath {
    pub column_family: String,
    pub column: Option<Vec<u8>>,
}

impl ColumnPath {
    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("ColumnPath"))?;
        write_string(o, "column_family", 3, &self.column_family)?;
        if let Some(column) = &self.column {
            write_binary(o, "column", 5, column)?;
        }
        o.write_field_stop()?;
        o.write_struct_end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRange {
    pub start: Vec<u8>,
    pub finish: Vec<u8>,
    pub reversed: bool,
    pub count: i32,
}

impl SliceRange {
    /// Every column of the row.
    pub fn all() -> Self {
        Self {
            start: Vec::new(),
            finish: Vec::new(),
            reversed: false,
            count: i32::MAX,
        }
    }

    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("SliceRange"))?;
        write_binary(o, "start", 1, &self.start)?;
        write_binary(o, "finish", 2, &self.finish)?;
        o.write_field_begin(&field("reversed", TType::Bool, 3))?;
        o.write_bool(self.reversed)?;
        o.write_field_end()?;
        write_i32(o, "count", 4, self.count)?;
        o.write_field_stop()?;
        o.write_struct_end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlicePredicate {
    ColumnNames(Vec<Vec<u8>>),
    Range(SliceRange),
}

impl SlicePredicate {
    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("SlicePredicate"))?;
        match self {
            SlicePredicate::ColumnNames(names) => {
                o.write_field_begin(&field("column_names", TType::List, 1))?;
                o.write_list_begin(&TListIdentifier::new(TType::String, names.len() as i32))?;
                for name in names {
                    o.write_bytes(name)?;
                }
                o.write_list_end()?;
                o.write_field_end()?;
            }
            SlicePredicate::Range(range) => {
                o.write_field_begin(&field("slice_range", TType::Struct, 2))?;
                range.write(o)?;
                o.write_field_end()?;
            }
        }
        o.write_field_stop()?;
        o.write_struct_end()
    }
}

/// Key-bounded range; an empty `end_key` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub count: i32,
}

impl KeyRange {
    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("KeyRange"))?;
        write_binary(o, "start_key", 1, &self.start_key)?;
        write_binary(o, "end_key", 2, &self.end_key)?;
        write_i32(o, "count", 5, self.count)?;
        o.write_field_stop()?;
        o.write_struct_end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySlice {
    pub key: Vec<u8>,
    pub columns: Vec<ColumnOrSuperColumn>,
}

impl KeySlice {
    pub fn read(i: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut key = None;
        let mut columns = None;
        read_fields(i, |i, id, ty| {
            match (id, ty) {
                (1, TType::String) => key = Some(i.read_bytes()?),
                (2, TType::List) => columns = Some(read_list(i, ColumnOrSuperColumn::read)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(Self {
            key: key.ok_or_else(|| missing("KeySlice", "key"))?,
            columns: columns.ok_or_else(|| missing("KeySlice", "columns"))?,
        })
    }
}

/// Insertion arm only; row deletes go through `remove`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub column_or_supercolumn: ColumnOrSuperColumn,
}

impl Mutation {
    pub fn insert(column: Column) -> Self {
        Self {
            column_or_supercolumn: ColumnOrSuperColumn {
                column: Some(column),
            },
        }
    }

    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("Mutation"))?;
        o.write_field_begin(&field("column_or_supercolumn", TType::Struct, 1))?;
        self.column_or_supercolumn.write(o)?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()
    }
}

/// row key -> column family -> mutations
pub type MutationMap = BTreeMap<Vec<u8>, BTreeMap<String, Vec<Mutation>>>;

pub(crate) fn write_mutation_map(
    o: &mut dyn TOutputProtocol,
    map: &MutationMap,
) -> thrift::Result<()> {
    o.write_map_begin(&TMapIdentifier::new(TType::String, TType::Map, map.len() as i32))?;
    for (key, families) in map {
        o.write_bytes(key)?;
        o.write_map_begin(&TMapIdentifier::new(
            TType::String,
            TType::List,
            families.len() as i32,
        ))?;
        for (family, mutations) in families {
            o.write_string(family)?;
            o.write_list_begin(&TListIdentifier::new(TType::Struct, mutations.len() as i32))?;
            for mutation in mutations {
                mutation.write(o)?;
            }
            o.write_list_end()?;
        }
        o.write_map_end()?;
    }
    o.write_map_end()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationRequest {
    pub credentials: BTreeMap<String, String>,
}

impl AuthenticationRequest {
    pub fn new(username: &str, password: &str) -> Self {
        let credentials = [("username", username), ("password", password)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { credentials }
    }

    pub fn write(&self, o: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        o.write_struct_begin(&TStructIdentifier::new("AuthenticationRequest"))?;
        o.write_field_begin(&field("credentials", TType::Map, 1))?;
        o.write_map_begin(&TMapIdentifier::new(
            TType::String,
            TType::String,
            self.credentials.len() as i32,
        ))?;
        for (k, v) in &self.credentials {
            o.write_string(k)?;
            o.write_string(v)?;
        }
        o.write_map_end()?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CqlRow {
    pub key: Vec<u8>,
    pub columns: Vec<Column>,
}

impl CqlRow {
    pub fn read(i: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut row = CqlRow::default();
        read_fields(i, |i, id, ty| {
            match (id, ty) {
                (1, TType::String) => row.key = i.read_bytes()?,
                (2, TType::List) => row.columns = read_list(i, Column::read)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(row)
    }
}

/// Wire values of `Compression` for `execute_cql3_query`.
pub mod compression {
    use std::io::Write;

    use flate2::write::ZlibEncoder;

    pub const GZIP: i32 = 1;
    pub const NONE: i32 = 2;

    /// A `GZIP` query body is a zlib stream, which is what the server inflates.
    pub fn deflate(query: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(query)?;
        encoder.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqlResultType {
    Rows,
    Void,
    Int,
}

impl CqlResultType {
    fn from_i32(value: i32) -> thrift::Result<Self> {
        match value {
            1 => Ok(CqlResultType::Rows),
            2 => Ok(CqlResultType::Void),
            3 => Ok(CqlResultType::Int),
            other => Err(invalid(format!("unknown CqlResultType {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqlResult {
    pub result_type: CqlResultType,
    pub rows: Vec<CqlRow>,
    pub num: Option<i32>,
}

impl CqlResult {
    pub fn read(i: &mut dyn TInputProtocol) -> thrift::Result<Self> {
        let mut result_type = None;
        let mut rows = Vec::new();
        let mut num = None;
        read_fields(i, |i, id, ty| {
            match (id, ty) {
                (1, TType::I32) => result_type = Some(i.read_i32()?),
                (2, TType::List) => rows = read_list(i, CqlRow::read)?,
                (3, TType::I32) => num = Some(i.read_i32()?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        let result_type = result_type.ok_or_else(|| missing("CqlResult", "type"))?;
        Ok(Self {
            result_type: CqlResultType::from_i32(result_type)?,
            rows,
            num,
        })
    }
}
