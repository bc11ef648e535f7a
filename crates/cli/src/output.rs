//! Result rendering for stdout.

use std::io::Write;

use anyhow::Result;
use serde_json::{json, Value};

use fleetbatch_core::BatchResult;

/// Render one result as a JSON line.
///
/// Plain mode prints the `{id: payload}` mapping. With `with_meta` the
/// mapping is wrapped together with its batch metadata.
pub fn render(result: &BatchResult, with_meta: bool) -> Result<String> {
    let mapping = Value::Object(result.to_mapping());
    let value = if with_meta {
        json!({
            "result": mapping,
            "meta": serde_json::to_value(&result.meta)?,
        })
    } else {
        mapping
    };
    Ok(serde_json::to_string(&value)?)
}

pub fn write_line<W: Write>(out: &mut W, result: &BatchResult, with_meta: bool) -> Result<()> {
    writeln!(out, "{}", render(result, with_meta)?)?;
    Ok(())
}
