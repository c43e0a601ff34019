//! Errors command implementation.

use std::ffi::c_int;
use std::io::Write;

use kmb_ffi::{Engine, Status};
use serde::Serialize;

use crate::output::{self, Format};

/// One row of the status table.
#[derive(Debug, Serialize)]
pub struct StatusInfo {
    /// Wire code.
    pub code: c_int,
    /// Status name as known to this client.
    pub name: String,
    /// Engine message.
    pub message: String,
    /// Engine retryability verdict.
    pub retryable: bool,
}

/// Asks the engine about every defined status code.
pub fn collect(engine: &Engine) -> Vec<StatusInfo> {
    (0..=Status::MAX_CODE)
        .map(|code| StatusInfo {
            code,
            name: format!("{:?}", Status::from(code)),
            message: engine.error_message(code),
            retryable: engine.error_is_retryable(code),
        })
        .collect()
}

/// Runs the errors command.
pub fn run(
    engine: &Engine,
    format: Format,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = collect(engine);
    match format {
        Format::Json => output::json(out, &table)?,
        Format::Text => {
            for row in &table {
                let retry = if row.retryable { "retryable" } else { "-" };
                writeln!(
                    out,
                    "{:>3}  {:<20} {:<10} {}",
                    row.code, row.name, retry, row.message
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmb_testkit::loopback_engine;

    #[test]
    fn table_covers_every_code() {
        let table = collect(&loopback_engine());
        assert_eq!(table.len(), 20);
        assert_eq!(table[0].name, "Ok");
        assert_eq!(table[12].name, "Timeout");
        assert!(table[12].retryable);
        assert!(table[14].retryable);
        assert!(!table[3].retryable);
        assert_eq!(table[17].message, "stream already exists");
        assert_eq!(table.iter().filter(|r| r.retryable).count(), 2);
    }

    #[test]
    fn text_output_has_one_line_per_code() {
        let mut out = Vec::new();
        run(&loopback_engine(), Format::Text, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 20);
        assert!(text.lines().nth(12).unwrap().contains("retryable"));
    }
}
