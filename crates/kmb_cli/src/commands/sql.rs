//! SQL commands: query, query-at, execute.

use std::io::Write;

use kmb_client::{Connection, Offset, Value};

use crate::output::{self, Format};

/// Runs a query, at `position` when one is given.
pub fn query(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    position: Option<Offset>,
    format: Format,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = match position {
        Some(position) => conn.query_at(sql, params, position)?,
        None => conn.query(sql, params)?,
    };
    match format {
        Format::Json => output::json(out, &result)?,
        Format::Text => output::table(out, &result)?,
    }
    Ok(())
}

/// Runs the execute command.
pub fn execute(
    conn: &Connection,
    sql: &str,
    params: &[Value],
    format: Format,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = conn.execute_with_position(sql, params)?;
    match format {
        Format::Json => output::json(out, &outcome)?,
        Format::Text => match outcome.log_offset {
            Some(position) => writeln!(
                out,
                "{} rows affected at position {position}",
                outcome.rows_affected
            )?,
            None => writeln!(out, "{} rows affected", outcome.rows_affected)?,
        },
    }
    Ok(())
}
