use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{FlattenError, Result};

/// One captured packet as emitted by `tshark -T json`.
///
/// ```json
/// {"_index": "packets-2024-01-01", "_type": "doc", "_score": null,
///  "_source": {"layers": {"frame": {...}, "ip": {...}}}}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NestedRecord {
    #[serde(rename = "_index", default)]
    pub index: Option<Value>,
    #[serde(rename = "_type", default)]
    pub kind: Option<Value>,
    #[serde(rename = "_score", default)]
    pub score: Option<Value>,
    #[serde(rename = "_source", default)]
    pub source: Source,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Source {
    /// Layer name -> layer content, in document order.
    #[serde(default)]
    pub layers: Map<String, Value>,
}

impl NestedRecord {
    pub fn layers(&self) -> &Map<String, Value> {
        &self.source.layers
    }
}

/// Parses a whole JSON array of records held in memory.
pub fn parse_records(json: &str) -> serde_json::Result<Vec<NestedRecord>> {
    serde_json::from_str(json)
}

/// Reads one input artifact. The file is consumed as a whole; a record that
/// does not fit the expected shape fails the entire file.
pub fn read_records(path: &Path) -> Result<Vec<NestedRecord>> {
    let file = File::open(path).map_err(|e| FlattenError::from_io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| FlattenError::MalformedInput {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
