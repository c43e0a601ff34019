//! Output formatting shared by the commands.

use std::io::Write;

use clap::ValueEnum;
use kmb_client::QueryResult;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable, tab-separated.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Writes `value` as pretty JSON followed by a newline.
pub fn json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Writes a query result as a header line and one tab-separated line per row.
pub fn table(out: &mut impl Write, result: &QueryResult) -> std::io::Result<()> {
    writeln!(out, "{}", result.columns().join("\t"))?;
    for row in result {
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    writeln!(out, "({} rows)", result.len())
}
