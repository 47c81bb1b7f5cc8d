use crate::data::datatable::{DataColumn, DataRow, DataTable, DataType, DataValue};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use serde_json::Value as JsonValue;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Rows sampled for column type inference
const TYPE_SAMPLE_ROWS: usize = 100;

/// Load a CSV file into a DataTable
pub fn load_csv_to_datatable<P: AsRef<Path>>(path: P, table_name: &str) -> Result<DataTable> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path.as_ref()))?;

    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut string_rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        string_rows.push(record.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    }

    let mut table = build_table(table_name, &headers, string_rows)?;
    table
        .metadata
        .insert("source_type".to_string(), "csv".to_string());
    table.metadata.insert(
        "source_path".to_string(),
        path.as_ref().display().to_string(),
    );

    info!(target: "data", "Loaded {} rows from {:?}", table.row_count(), path.as_ref());
    Ok(table)
}

/// Load a JSON file (an array of objects) into a DataTable.
/// Columns come from the keys of the first object.
pub fn load_json_to_datatable<P: AsRef<Path>>(path: P, table_name: &str) -> Result<DataTable> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open JSON file: {:?}", path.as_ref()))?;
    let reader = BufReader::new(file);

    let json_data: Vec<JsonValue> =
        serde_json::from_reader(reader).with_context(|| "Failed to parse JSON file")?;

    let Some(first) = json_data.first() else {
        return Ok(DataTable::new(table_name));
    };

    let headers: Vec<String> = first
        .as_object()
        .context("JSON data must be an array of objects")?
        .keys()
        .cloned()
        .collect();

    let string_rows = json_data
        .iter()
        .filter_map(|value| value.as_object())
        .map(|obj| {
            headers
                .iter()
                .map(|name| match obj.get(name) {
                    Some(JsonValue::Null) | None => String::new(),
                    Some(JsonValue::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mut table = build_table(table_name, &headers, string_rows)?;
    table
        .metadata
        .insert("source_type".to_string(), "json".to_string());
    table.metadata.insert(
        "source_path".to_string(),
        path.as_ref().display().to_string(),
    );

    info!(target: "data", "Loaded {} rows from {:?}", table.row_count(), path.as_ref());
    Ok(table)
}

fn build_table(table_name: &str, headers: &[String], string_rows: Vec<Vec<String>>) -> Result<DataTable> {
    let mut column_types = vec![DataType::Null; headers.len()];
    for row in string_rows.iter().take(TYPE_SAMPLE_ROWS) {
        for (col_idx, value) in row.iter().enumerate().take(headers.len()) {
            if !value.is_empty() {
                let inferred = DataType::infer_from_string(value);
                column_types[col_idx] = column_types[col_idx].merge(&inferred);
            }
        }
    }

    let mut table = DataTable::new(table_name);
    for (name, data_type) in headers.iter().zip(&column_types) {
        table.add_column(DataColumn::new(name.clone()).with_type(data_type.clone()));
    }

    for string_row in string_rows {
        let values: Vec<DataValue> = column_types
            .iter()
            .enumerate()
            .map(|(col_idx, data_type)| {
                string_row
                    .get(col_idx)
                    .map(|value| DataValue::from_string(value, data_type))
                    .unwrap_or(DataValue::Null)
            })
            .collect();
        table.add_row(DataRow::new(values)).map_err(|e| anyhow!(e))?;
    }

    table.infer_column_types();
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_csv() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "id,name,price,quantity")?;
        writeln!(temp_file, "1,Widget,9.99,100")?;
        writeln!(temp_file, "2,Gadget,19.99,50")?;
        writeln!(temp_file, "3,Doohickey,5.00,200")?;
        temp_file.flush()?;

        let table = load_csv_to_datatable(temp_file.path(), "products")?;

        assert_eq!(table.name, "products");
        assert_eq!(table.column_count(), 4);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.columns[0].data_type, DataType::Integer);
        assert_eq!(table.columns[1].data_type, DataType::String);
        assert_eq!(table.columns[2].data_type, DataType::Float);

        let value = table.get_value_by_name(0, "name").unwrap();
        assert_eq!(value.to_string(), "Widget");
        Ok(())
    }

    #[test]
    fn test_load_json() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(
            temp_file,
            r#"[
            {{"id": 1, "name": "Alice", "active": true, "score": 95.5}},
            {{"id": 2, "name": "Bob", "active": false, "score": 87.3}},
            {{"id": 3, "name": "Charlie", "active": true, "score": null}}
        ]"#
        )?;
        temp_file.flush()?;

        let table = load_json_to_datatable(temp_file.path(), "users")?;

        assert_eq!(table.column_count(), 4);
        assert_eq!(table.row_count(), 3);
        assert!(table.get_value_by_name(2, "score").unwrap().is_null());
        assert_eq!(
            table.get_value_by_name(0, "active"),
            Some(&DataValue::Boolean(true))
        );
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_csv_to_datatable("/definitely/not/here.csv", "x").is_err());
    }
}
