//! Stream operations: create, append, read.

use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{ClientResult, Error};
use crate::marshal::{c_string, decode_read};
use crate::types::{DataClass, Event, Offset, StreamId};

/// `max_bytes` used by callers without a specific budget (1 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Longest accepted stream name, in characters.
pub const MAX_STREAM_NAME_CHARS: usize = 256;

fn validate_stream_name(name: &str) -> ClientResult<()> {
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_STREAM_NAME_CHARS {
        return Err(Error::InvalidArgument(format!(
            "stream name must be 1-{MAX_STREAM_NAME_CHARS} characters, got {chars}"
        )));
    }
    Ok(())
}

impl Connection {
    /// Creates a stream.
    pub fn create_stream(&self, name: &str, data_class: DataClass) -> ClientResult<StreamId> {
        self.with_handle(|engine, handle| {
            validate_stream_name(name)?;
            let c_name = c_string("stream name", name)?;
            let id = engine
                .create_stream(handle, &c_name, data_class.as_raw())
                .map_err(|e| Error::from_boundary(engine, e))?;
            debug!(stream = name, stream_id = id, %data_class, "stream created");
            Ok(StreamId(id))
        })
    }

    /// Appends a non-empty batch and returns the offset of its first event.
    ///
    /// With `expected_offset` set, the engine rejects the append with
    /// [`ErrorKind::OffsetConflict`](crate::ErrorKind::OffsetConflict)
    /// unless the stream's next offset equals it. Engines without the
    /// expected-offset append extension reject a set `expected_offset`
    /// locally with `InvalidArgument`.
    pub fn append<E: AsRef<[u8]>>(
        &self,
        stream_id: StreamId,
        events: &[E],
        expected_offset: Option<Offset>,
    ) -> ClientResult<Offset> {
        self.with_handle(|engine, handle| {
            if events.is_empty() {
                return Err(Error::InvalidArgument(
                    "append requires at least one event".into(),
                ));
            }
            if expected_offset == Some(Offset(u64::MAX)) {
                return Err(Error::InvalidArgument(
                    "expected offset u64::MAX is reserved".into(),
                ));
            }
            if expected_offset.is_some() && !engine.supports_expected_offset() {
                return Err(Error::InvalidArgument(format!(
                    "engine {} does not support expected offsets",
                    engine.name()
                )));
            }

            let first = engine
                .append(handle, stream_id.get(), expected_offset.map(Offset::get), events)
                .map_err(|e| Error::from_boundary(engine, e))?;
            trace!(
                stream_id = stream_id.get(),
                event_count = events.len(),
                first_offset = first,
                "appended"
            );
            Ok(Offset(first))
        })
    }

    /// Reads events from `from_offset`, stopping around `max_bytes`.
    ///
    /// The engine always returns at least one event when any remain, so a
    /// small budget still makes progress. Page with the last event's
    /// offset plus one.
    pub fn read(
        &self,
        stream_id: StreamId,
        from_offset: Offset,
        max_bytes: u64,
    ) -> ClientResult<Vec<Event>> {
        self.with_handle(|engine, handle| {
            let guard = engine
                .read_events(handle, stream_id.get(), from_offset.get(), max_bytes)
                .map_err(|e| Error::from_boundary(engine, e))?;
            // The guard releases the record when this closure returns,
            // whether or not decoding succeeded.
            let events = decode_read(&guard)?;
            trace!(
                stream_id = stream_id.get(),
                from_offset = from_offset.get(),
                event_count = events.len(),
                "read"
            );
            Ok(events)
        })
    }
}
