use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow2::array::*;
use arrow2::chunk::Chunk;
use arrow2::datatypes::*;
use arrow2::io::parquet::read;
use arrow2::io::parquet::write::{
    transverse, CompressionOptions, Encoding, FileWriter, RowGroupIterator, Version, WriteOptions,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{FlattenError, Result};
use crate::table::{Column, Table};

/// Parquet page compression codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Uncompressed,
    #[default]
    Snappy,
    Zstd,
    Gzip,
    Lz4,
}

impl From<Compression> for CompressionOptions {
    fn from(value: Compression) -> Self {
        match value {
            Compression::Uncompressed => CompressionOptions::Uncompressed,
            Compression::Snappy => CompressionOptions::Snappy,
            Compression::Zstd => CompressionOptions::Zstd(None),
            Compression::Gzip => CompressionOptions::Gzip(None),
            Compression::Lz4 => CompressionOptions::Lz4Raw,
        }
    }
}

fn write_options(compression: Compression) -> WriteOptions {
    WriteOptions {
        write_statistics: true,
        compression: compression.into(),
        version: Version::V2,
        data_pagesize_limit: None,
    }
}

// ─────────────────────────────────────────────────────────────
//  PHYSICAL TYPE INFERENCE
// ─────────────────────────────────────────────────────────────

/// The single physical kind a column is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Nothing but missing markers and nulls; written as an all-null `Utf8`.
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl ColumnKind {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(ColumnKind::Null),
            Value::Bool(_) => Some(ColumnKind::Boolean),
            Value::Number(n) if n.is_i64() => Some(ColumnKind::Int64),
            Value::Number(_) => Some(ColumnKind::Float64),
            Value::String(_) => Some(ColumnKind::Utf8),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Integers widen to floats; every other pair of distinct kinds conflicts.
    fn merge(self, other: Self) -> Option<Self> {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Null, k) | (k, Null) => Some(k),
            (Int64, Float64) | (Float64, Int64) => Some(Float64),
            _ => None,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Null | ColumnKind::Utf8 => DataType::Utf8,
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Null => "null",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Int64 => "integer",
            ColumnKind::Float64 => "float",
            ColumnKind::Utf8 => "text",
        };
        f.write_str(name)
    }
}

/// Determines the one kind every value of the column can be stored as.
pub fn infer_kind(column: &Column) -> Result<ColumnKind> {
    let mut kind = ColumnKind::Null;
    for value in column.values.iter().flatten() {
        let next = ColumnKind::of(value).ok_or_else(|| {
            FlattenError::Serialization(format!(
                "column `{}` holds a nested value that was not normalized",
                column.name
            ))
        })?;
        kind = kind.merge(next).ok_or_else(|| {
            FlattenError::Serialization(format!(
                "column `{}` mixes {} and {} values",
                column.name, kind, next
            ))
        })?;
    }
    Ok(kind)
}

// ─────────────────────────────────────────────────────────────
//  TABLE -> ARROW2 CHUNK
// ─────────────────────────────────────────────────────────────

fn to_arrow2(table: &Table) -> Result<(Schema, Chunk<Arc<dyn Array>>)> {
    // Parquet needs at least one leaf column under the root group.
    if table.num_columns() == 0 {
        return Err(FlattenError::SchemaConflict("table has no columns".to_string()));
    }

    let rows = table.num_rows();
    let mut fields = Vec::with_capacity(table.num_columns());
    let mut arrays: Vec<Arc<dyn Array>> = Vec::with_capacity(table.num_columns());

    // ---- UTF8 builder ----
    macro_rules! build_utf8 {
        ($column:expr) => {{
            let mut col = MutableUtf8Array::<i32>::with_capacity(rows);
            for v in &$column.values {
                col.push(v.as_ref().and_then(Value::as_str));
            }
            col.as_arc()
        }};
    }

    // ---- Numeric primitive builder ----
    macro_rules! build_prim {
        ($column:expr, $ty:ty, $get:path) => {{
            let mut col = MutablePrimitiveArray::<$ty>::with_capacity(rows);
            for v in &$column.values {
                col.push(v.as_ref().and_then($get));
            }
            col.as_arc()
        }};
    }

    // ---- Boolean builder ----
    macro_rules! build_bool {
        ($column:expr) => {{
            let mut col = MutableBooleanArray::with_capacity(rows);
            for v in &$column.values {
                col.push(v.as_ref().and_then(Value::as_bool));
            }
            col.as_arc()
        }};
    }

    for column in table.columns() {
        if column.name.is_empty() {
            return Err(FlattenError::SchemaConflict(
                "empty column name cannot be stored".to_string(),
            ));
        }

        let kind = infer_kind(column)?;
        let array = match kind {
            ColumnKind::Null | ColumnKind::Utf8 => build_utf8!(column),
            ColumnKind::Boolean => build_bool!(column),
            ColumnKind::Int64 => build_prim!(column, i64, Value::as_i64),
            ColumnKind::Float64 => build_prim!(column, f64, Value::as_f64),
        };

        fields.push(Field::new(column.name.clone(), kind.data_type(), true));
        arrays.push(array);
    }

    let chunk = Chunk::try_new(arrays)?;
    Ok((Schema::from(fields), chunk))
}

// ─────────────────────────────────────────────────────────────
//  PARQUET OUTPUT
// ─────────────────────────────────────────────────────────────

/// Writes the table as a single-row-group parquet file, replacing any
/// existing file. Nothing is left on disk if the table cannot be encoded.
pub fn write_table(table: &Table, path: &Path, compression: Compression) -> Result<()> {
    let (schema, chunk) = to_arrow2(table)?;

    let file = File::create(path).map_err(|source| FlattenError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let written = write_chunk(file, schema, chunk, write_options(compression));
    if written.is_err() {
        let _ = fs::remove_file(path);
    }
    written?;

    tracing::debug!(
        path = %path.display(),
        rows = table.num_rows(),
        columns = table.num_columns(),
        "wrote parquet file"
    );
    Ok(())
}

fn write_chunk(
    file: File,
    schema: Schema,
    chunk: Chunk<Arc<dyn Array>>,
    options: WriteOptions,
) -> Result<()> {
    let mut writer = FileWriter::try_new(file, schema.clone(), options)?;

    // A zero-row table still gets a footer carrying its schema.
    if !chunk.is_empty() {
        let encodings = schema
            .fields
            .iter()
            .map(|f| transverse(&f.data_type, |_| Encoding::Plain))
            .collect();
        let row_groups =
            RowGroupIterator::try_new(std::iter::once(Ok(chunk)), &schema, options, encodings)?;
        for group in row_groups {
            writer.write(group?)?;
        }
    }

    writer.end(None)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────
//  INSPECTION (footer only)
// ─────────────────────────────────────────────────────────────

/// Schema and row count of a written artifact.
#[derive(Debug, Clone)]
pub struct ArtifactSchema {
    pub fields: Vec<Field>,
    pub num_rows: usize,
}

impl ArtifactSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Reads the parquet footer only; no column data is decoded.
pub fn read_schema(path: &Path) -> Result<ArtifactSchema> {
    let mut file = File::open(path).map_err(|e| FlattenError::from_io(path, e))?;

    let malformed = |e: arrow2::error::Error| FlattenError::MalformedInput {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let metadata = read::read_metadata(&mut file).map_err(malformed)?;
    let schema = read::infer_schema(&metadata).map_err(malformed)?;

    Ok(ArtifactSchema {
        fields: schema.fields,
        num_rows: metadata.num_rows,
    })
}

pub fn read_column_names(path: &Path) -> Result<Vec<String>> {
    Ok(read_schema(path)?.column_names())
}
