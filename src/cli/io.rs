//! JSON-lines output
//!
//! - First line: the result schema
//! - Then one JSON array per row
//! - UTF-8 only

use std::io::Write;

use serde::Serialize;
use serde_json::json;

use super::errors::CliResult;
use crate::record::{Schema, Tuple};

/// Write the result schema as `[{"name": "R.a", "type": "int"}, ...]`
pub fn write_schema<W: Write>(out: &mut W, schema: &Schema) -> CliResult<()> {
    let columns: Vec<_> = schema
        .attributes()
        .iter()
        .map(|a| json!({"name": a.to_string(), "type": a.data_type.to_string()}))
        .collect();
    serde_json::to_writer(&mut *out, &columns)?;
    writeln!(out)?;
    Ok(())
}

/// Write one result row as a JSON array
pub fn write_row<W: Write>(out: &mut W, tuple: &Tuple) -> CliResult<()> {
    let values: Vec<_> = tuple.values().iter().map(|v| v.to_json()).collect();
    serde_json::to_writer(&mut *out, &values)?;
    writeln!(out)?;
    Ok(())
}

/// Write any serializable value as one JSON line
pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Attribute, DataType, Value};

    #[test]
    fn test_schema_and_rows() {
        let schema = Schema::new(vec![
            Attribute::new("R", "a", DataType::Int),
            Attribute::new("R", "s", DataType::Text(4)),
        ]);
        let mut out = Vec::new();
        write_schema(&mut out, &schema).unwrap();
        write_row(&mut out, &Tuple::new(vec![Value::Int(3), Value::Text("hi".into())])).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            r#"[{"name":"R.a","type":"int"},{"name":"R.s","type":"text(4)"}]"#
        );
        assert_eq!(lines[1], r#"[3,"hi"]"#);
    }
}
