//! Flattens tshark JSON packet dumps into typed parquet tables.
//!
//! Each packet record is a tree of protocol layers. The pipeline turns every
//! record into one flat row (`layer.field` columns), unifies the columns of
//! all rows into one table, serializes columns that hold nested values to
//! JSON text so each column has a single physical type, and writes the table
//! as parquet.
//!
//! ```no_run
//! use std::path::Path;
//! use pcap_flatten::pipeline::{run, PipelineOptions};
//!
//! let report = run(Path::new("json/"), Path::new("parquet/"), &PipelineOptions::default())?;
//! for (input, err) in report.failed() {
//!     eprintln!("{}: {err}", input.display());
//! }
//! # Ok::<(), pcap_flatten::FlattenError>(())
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod flattener;
pub mod log;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod table;
pub mod writer;

pub use error::{FlattenError, Result};
pub use flattener::{column_name, flatten, Cell, FlatRow};
pub use normalizer::{normalize, normalize_column};
pub use record::NestedRecord;
pub use table::{Column, Table};
pub use writer::{read_column_names, read_schema, write_table, Compression};
