use anyhow::{anyhow, Result};
use futures::StreamExt;
use serde_json::{Map, Value};
use typedb_driver::concept::{value::Value as TypeDBValue, Concept};
use typedb_driver::{TransactionType, TypeDBDriver};

/// Runs a read query and returns one map per row, keyed by variable name.
pub async fn read_rows(
    driver: &TypeDBDriver,
    database: &str,
    query: &str,
) -> Result<Vec<Map<String, Value>>> {
    let transaction = driver
        .transaction(database, TransactionType::Read)
        .await
        .map_err(|e| anyhow!("Failed to create read transaction: {}", e))?;

    let answer = transaction
        .query(query)
        .await
        .map_err(|e| anyhow!("Failed to execute read query: {}", e))?;

    // Rows must be drained while the transaction is alive
    let mut rows = Vec::new();
    let mut stream = answer.into_rows();
    while let Some(row) = stream.next().await {
        let row = row.map_err(|e| anyhow!("Failed to get concept row: {}", e))?;
        let mut data = Map::new();
        for column in row.get_column_names() {
            if let Ok(Some(concept)) = row.get(column) {
                data.insert(column.clone(), concept_value(concept));
            }
        }
        rows.push(data);
    }
    Ok(rows)
}

/// Runs the given queries in one write transaction and commits.
pub async fn write_all(driver: &TypeDBDriver, database: &str, queries: &[String]) -> Result<()> {
    let transaction = driver
        .transaction(database, TransactionType::Write)
        .await
        .map_err(|e| anyhow!("Failed to create write transaction: {}", e))?;

    for query in queries {
        transaction
            .query(query.as_str())
            .await
            .map_err(|e| anyhow!("Failed to execute write query: {}", e))?;
    }

    transaction
        .commit()
        .await
        .map_err(|e| anyhow!("Failed to commit write transaction: {}", e))?;
    Ok(())
}

pub async fn define_schema(driver: &TypeDBDriver, database: &str, schema: &str) -> Result<()> {
    let transaction = driver
        .transaction(database, TransactionType::Schema)
        .await
        .map_err(|e| anyhow!("Failed to create schema transaction: {}", e))?;

    transaction
        .query(schema)
        .await
        .map_err(|e| anyhow!("Failed to execute schema query: {}", e))?;

    transaction
        .commit()
        .await
        .map_err(|e| anyhow!("Failed to commit schema transaction: {}", e))?;
    Ok(())
}

/// Attribute values become JSON scalars; anything else is rendered as text.
fn concept_value(concept: &Concept) -> Value {
    match concept {
        Concept::Attribute(attr) => match &attr.value {
            TypeDBValue::String(s) => Value::String(s.clone()),
            TypeDBValue::Integer(i) => Value::from(*i),
            TypeDBValue::Double(d) => Value::from(*d),
            TypeDBValue::Boolean(b) => Value::Bool(*b),
            other => Value::String(other.to_string()),
        },
        other => Value::String(other.to_string()),
    }
}

/// Escape a string for use inside a double-quoted TypeQL literal.
pub fn quote(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_backslashes_and_quotes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"{"a":"b\c"}"#), r#""{\"a\":\"b\\c\"}""#);
    }
}
