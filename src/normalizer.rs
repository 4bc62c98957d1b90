use rayon::prelude::*;
use serde_json::Value;

use crate::flattener::Cell;
use crate::table::Table;

fn is_composite(cell: &Cell) -> bool {
    matches!(cell, Some(Value::Object(_) | Value::Array(_)))
}

/// Rewrites one column so it holds a single physical type.
///
/// If any present value is an object or array, every present value
/// (scalars and explicit nulls included) is replaced by its compact JSON
/// text. Missing cells stay missing. Columns without composites are not
/// touched, even when they mix scalar kinds; that is left to the writer.
///
/// Returns whether the column was rewritten.
pub fn normalize_column(values: &mut [Cell]) -> bool {
    if !values.iter().any(is_composite) {
        return false;
    }

    for cell in values.iter_mut() {
        if let Some(value) = cell.take() {
            *cell = Some(Value::String(value.to_string()));
        }
    }
    true
}

/// Normalizes every column of the table in place and returns the names of
/// the columns that were rewritten, in table order.
pub fn normalize(table: &mut Table) -> Vec<String> {
    let rewritten: Vec<String> = table
        .columns_mut()
        .par_iter_mut()
        .filter_map(|column| normalize_column(&mut column.values).then(|| column.name.clone()))
        .collect();

    for name in &rewritten {
        tracing::debug!(column = %name, "composite column serialized to text");
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use serde_json::json;

    #[test]
    fn mapping_and_number_both_become_text() {
        let mut values = vec![Some(json!({"b": 1, "a": [true]})), Some(json!(5))];
        assert!(normalize_column(&mut values));
        assert_eq!(
            values,
            vec![
                Some(json!(r#"{"b":1,"a":[true]}"#)),
                Some(json!("5")),
            ]
        );
    }

    #[test]
    fn every_present_value_is_encoded_and_missing_is_kept() {
        let mut values = vec![
            Some(json!([1, 2])),
            Some(json!("x")),
            Some(Value::Null),
            None,
            Some(json!(false)),
        ];
        assert!(normalize_column(&mut values));
        assert_eq!(
            values,
            vec![
                Some(json!("[1,2]")),
                Some(json!("\"x\"")),
                Some(json!("null")),
                None,
                Some(json!("false")),
            ]
        );
    }

    #[test]
    fn text_is_rendered_as_escaped_json() {
        let mut values = vec![Some(json!([])), Some(json!("say \"hi\"\n"))];
        assert!(normalize_column(&mut values));
        assert_eq!(values[1], Some(json!(r#""say \"hi\"\n""#)));
    }

    #[test]
    fn scalar_columns_are_untouched() {
        let original = vec![Some(json!(1)), Some(json!("mixed")), None];
        let mut values = original.clone();
        assert!(!normalize_column(&mut values));
        assert_eq!(values, original);
    }

    #[test]
    fn normalize_reports_rewritten_columns_in_order() {
        let mut table = Table::from_columns(vec![
            Column::new("a", vec![Some(json!({"k": "v"})), None]),
            Column::new("b", vec![Some(json!(1)), Some(json!(2))]),
            Column::new("c", vec![None, Some(json!([]))]),
        ])
        .unwrap();

        let rewritten = normalize(&mut table);

        assert_eq!(rewritten, ["a", "c"]);
        assert_eq!(table.column_names(), ["a", "b", "c"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(
            table.column("a").unwrap().values,
            vec![Some(json!(r#"{"k":"v"}"#)), None]
        );
        assert_eq!(
            table.column("b").unwrap().values,
            vec![Some(json!(1)), Some(json!(2))]
        );
        assert_eq!(table.column("c").unwrap().values, vec![None, Some(json!("[]"))]);
    }
}
