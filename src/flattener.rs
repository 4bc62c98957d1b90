use ahash::RandomState;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde_json::Value;

use crate::record::NestedRecord;

/// `None` is the missing marker; `Some(Value::Null)` is an explicit JSON null.
pub type Cell = Option<Value>;

/// Column name -> value for one record, in first-insertion order.
pub type FlatRow = IndexMap<String, Cell, RandomState>;

pub const INDEX_COLUMN: &str = "_index";
pub const TYPE_COLUMN: &str = "_type";
pub const SCORE_COLUMN: &str = "_score";

// ─────────────────────────────────────────────────────────────
//  COLUMN NAMING
// ─────────────────────────────────────────────────────────────
//
// A field that repeats its layer's name collapses onto the bare layer
// name (`frame` / `frame` -> `frame`); everything else is dotted
// (`ip` / `src` -> `ip.src`). Only the direct field name is compared.
//
pub fn column_name(layer: &str, field: &str) -> String {
    if layer == field {
        layer.to_string()
    } else {
        format!("{layer}.{field}")
    }
}

// ─────────────────────────────────────────────────────────────
//  FLATTENING ONE RECORD
// ─────────────────────────────────────────────────────────────
//
// One level of expansion only: a layer that is a mapping contributes
// one column per field, a layer that is anything else contributes a
// single column named after the layer. Nested objects/arrays below a
// field are kept as-is and left for the normalizer.
//
impl NestedRecord {
    pub fn flatten(&self) -> FlatRow {
        let mut row = FlatRow::default();

        for (layer, content) in self.layers() {
            match content {
                Value::Object(fields) => {
                    for (field, value) in fields {
                        // Colliding names overwrite in place: last write wins,
                        // the column keeps its first position.
                        row.insert(column_name(layer, field), Some(value.clone()));
                    }
                }
                other => {
                    row.insert(layer.clone(), Some(other.clone()));
                }
            }
        }

        row.insert(INDEX_COLUMN.to_string(), self.index.clone());
        row.insert(TYPE_COLUMN.to_string(), self.kind.clone());
        row.insert(SCORE_COLUMN.to_string(), self.score.clone());

        row
    }
}

/// One row per record, same order as the input.
pub fn flatten(records: &[NestedRecord]) -> Vec<FlatRow> {
    records.par_iter().map(NestedRecord::flatten).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_records;
    use serde_json::json;

    fn flatten_one(json: &str) -> FlatRow {
        let records = parse_records(json).unwrap();
        assert_eq!(records.len(), 1);
        records[0].flatten()
    }

    fn keys(row: &FlatRow) -> Vec<&str> {
        row.keys().map(String::as_str).collect()
    }

    #[test]
    fn column_name_collapses_only_exact_matches() {
        assert_eq!(column_name("frame", "frame"), "frame");
        assert_eq!(column_name("ip", "src"), "ip.src");
        assert_eq!(column_name("frame", "frame.len"), "frame.frame.len");
        assert_eq!(column_name("TCP", "tcp"), "TCP.tcp");
    }

    #[test]
    fn frame_layer_scenario() {
        let row = flatten_one(
            r#"[{"_index":"i1","_type":"t1","_score":2,
                 "_source":{"layers":{"frame":{"frame":"X","frame.len":10}}}}]"#,
        );

        assert_eq!(keys(&row), ["frame", "frame.frame.len", "_index", "_type", "_score"]);
        assert_eq!(row["frame"], Some(json!("X")));
        assert_eq!(row["frame.frame.len"], Some(json!(10)));
        assert_eq!(row["_index"], Some(json!("i1")));
        assert_eq!(row["_type"], Some(json!("t1")));
        assert_eq!(row["_score"], Some(json!(2)));
    }

    #[test]
    fn mapping_layer_fields_are_dotted() {
        let row = flatten_one(
            r#"[{"_source":{"layers":{"ip":{"src":"10.0.0.1","dst":"10.0.0.2"}}}}]"#,
        );
        assert_eq!(keys(&row), ["ip.src", "ip.dst", "_index", "_type", "_score"]);
        assert_eq!(row["ip.src"], Some(json!("10.0.0.1")));
        assert_eq!(row["ip.dst"], Some(json!("10.0.0.2")));
    }

    #[test]
    fn non_mapping_layer_keeps_content_under_bare_name() {
        let row = flatten_one(
            r#"[{"_source":{"layers":{"data":"de:ad","tags":[1,2],"flag":null}}}]"#,
        );
        assert_eq!(row["data"], Some(json!("de:ad")));
        assert_eq!(row["tags"], Some(json!([1, 2])));
        assert_eq!(row["flag"], Some(Value::Null));
    }

    #[test]
    fn deeper_nesting_is_not_expanded() {
        let row = flatten_one(
            r#"[{"_source":{"layers":{"tcp":{"tcp.flags_tree":{"tcp.flags.syn":"1"}}}}}]"#,
        );
        assert_eq!(
            row["tcp.tcp.flags_tree"],
            Some(json!({"tcp.flags.syn": "1"}))
        );
    }

    #[test]
    fn record_without_layers_has_only_fixed_columns() {
        let row = flatten_one(r#"[{"_index":"i"}]"#);
        assert_eq!(keys(&row), ["_index", "_type", "_score"]);
        assert_eq!(row["_index"], Some(json!("i")));
        assert_eq!(row["_type"], None);
        assert_eq!(row["_score"], None);
    }

    #[test]
    fn colliding_columns_last_write_wins_in_first_position() {
        let row = flatten_one(
            r#"[{"_source":{"layers":{"a":{"b":1,"a":2},"a.b":"later"}}}]"#,
        );
        assert_eq!(&keys(&row)[..2], &["a.b", "a"]);
        assert_eq!(row["a.b"], Some(json!("later")));
        assert_eq!(row["a"], Some(json!(2)));
    }

    #[test]
    fn flatten_is_one_to_one_and_order_preserving() {
        let records = parse_records(
            r#"[{"_index":"0"},{"_index":"1"},{"_index":"2"},{"_index":"3"}]"#,
        )
        .unwrap();
        let rows = flatten(&records);
        assert_eq!(rows.len(), records.len());
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row["_index"], Some(json!(i.to_string())));
        }
    }
}
