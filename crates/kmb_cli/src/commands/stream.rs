//! Stream commands: create-stream, append, read.

use std::io::Write;

use kmb_client::{Connection, DataClass, Event, Offset, StreamId};
use serde::Serialize;

use crate::output::{self, Format};

/// A read event for output. Payloads are shown as lossy UTF-8.
#[derive(Debug, Serialize)]
pub struct EventInfo {
    /// Engine-reported offset, if any.
    pub offset: Option<u64>,
    /// Payload size in bytes.
    pub size: usize,
    /// Payload text.
    pub data: String,
}

impl From<&Event> for EventInfo {
    fn from(event: &Event) -> Self {
        Self {
            offset: event.offset.map(Offset::get),
            size: event.data.len(),
            data: String::from_utf8_lossy(&event.data).into_owned(),
        }
    }
}

#[derive(Serialize)]
struct Created<'a> {
    stream_id: u64,
    name: &'a str,
    data_class: DataClass,
}

#[derive(Serialize)]
struct Appended {
    stream_id: u64,
    first_offset: u64,
    event_count: usize,
}

/// Runs the create-stream command.
pub fn create(
    conn: &Connection,
    name: &str,
    data_class: DataClass,
    format: Format,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = conn.create_stream(name, data_class)?;
    match format {
        Format::Json => output::json(
            out,
            &Created {
                stream_id: id.get(),
                name,
                data_class,
            },
        )?,
        Format::Text => writeln!(out, "created stream {name} ({data_class}) with id {id}")?,
    }
    Ok(())
}

/// Runs the append command.
pub fn append(
    conn: &Connection,
    stream: StreamId,
    events: &[String],
    expected_offset: Option<Offset>,
    format: Format,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let first = conn.append(stream, events, expected_offset)?;
    match format {
        Format::Json => output::json(
            out,
            &Appended {
                stream_id: stream.get(),
                first_offset: first.get(),
                event_count: events.len(),
            },
        )?,
        Format::Text => writeln!(
            out,
            "appended {} events to stream {stream} at offset {first}",
            events.len()
        )?,
    }
    Ok(())
}

/// Runs the read command.
pub fn read(
    conn: &Connection,
    stream: StreamId,
    from: Offset,
    max_bytes: u64,
    format: Format,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let events: Vec<EventInfo> = conn
        .read(stream, from, max_bytes)?
        .iter()
        .map(EventInfo::from)
        .collect();

    match format {
        Format::Json => output::json(out, &events)?,
        Format::Text => {
            for event in &events {
                let offset = event
                    .offset
                    .map_or_else(|| "-".to_string(), |o| o.to_string());
                writeln!(out, "{offset}\t{}", event.data)?;
            }
            writeln!(out, "({} events)", events.len())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{connected, text};

    #[test]
    fn create_append_read_text() {
        let (_cluster, conn) = connected();
        let mut out = Vec::new();
        create(&conn, "orders", DataClass::NonPhi, Format::Text, &mut out).unwrap();
        assert_eq!(
            text(out),
            "created stream orders (non-phi) with id 1\n"
        );

        let mut out = Vec::new();
        let events = vec!["a".to_string(), "b".to_string()];
        append(&conn, StreamId(1), &events, None, Format::Text, &mut out).unwrap();
        assert_eq!(text(out), "appended 2 events to stream 1 at offset 0\n");

        let mut out = Vec::new();
        read(&conn, StreamId(1), Offset(0), 1024, Format::Text, &mut out).unwrap();
        assert_eq!(text(out), "0\ta\n1\tb\n(2 events)\n");
        conn.disconnect();
    }

    #[test]
    fn read_json() {
        let (_cluster, conn) = connected();
        let id = conn.create_stream("s", DataClass::Phi).unwrap();
        conn.append(id, &["hello"], None).unwrap();

        let mut out = Vec::new();
        read(&conn, id, Offset(0), 1024, Format::Json, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json[0]["offset"], 0);
        assert_eq!(json[0]["size"], 5);
        assert_eq!(json[0]["data"], "hello");
        conn.disconnect();
    }

    #[test]
    fn conflicts_surface_as_errors() {
        let (_cluster, conn) = connected();
        let id = conn.create_stream("s", DataClass::Phi).unwrap();
        let events = vec!["x".to_string()];
        let mut out = Vec::new();
        let err = append(&conn, id, &events, Some(Offset(5)), Format::Text, &mut out).unwrap_err();
        assert!(err.to_string().contains("OffsetConflict"));
        assert!(out.is_empty());
        conn.disconnect();
    }
}
