//! kmb CLI
//!
//! Ad hoc operations against a kmb engine library.
//!
//! # Commands
//!
//! - `create-stream` - Create a stream
//! - `append` - Append events to a stream
//! - `read` - Read events from a stream
//! - `query` - Run a SQL query
//! - `query-at` - Run a SQL query at a log position
//! - `execute` - Run a DDL or DML statement
//! - `errors` - Print the engine's status code table

mod commands;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kmb_client::{ClientConfig, Connection, DataClass, Offset, StreamId, Value};
use kmb_ffi::{Engine, LibraryConfig, LoadResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use output::Format;

/// Command-line client for the kmb engine.
#[derive(Parser)]
#[command(name = "kmb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the engine library (overrides KMB_FFI_LIBRARY)
    #[arg(global = true, short, long)]
    library: Option<PathBuf>,

    /// Cluster address as host:port (repeatable)
    #[arg(global = true, short, long = "address", default_value = "127.0.0.1:5432")]
    addresses: Vec<String>,

    /// Tenant id
    #[arg(global = true, short, long, default_value = "1")]
    tenant: u64,

    /// Authentication token
    #[arg(global = true, long)]
    token: Option<String>,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: Format,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a stream
    CreateStream {
        /// Stream name
        name: String,

        /// Data class (phi, non-phi, deidentified)
        #[arg(short = 'c', long, default_value = "non-phi")]
        data_class: DataClass,
    },

    /// Append events to a stream
    Append {
        /// Stream id
        stream: u64,

        /// Event payloads, one per argument
        #[arg(required = true)]
        events: Vec<String>,

        /// Reject the append unless the stream's next offset is this
        #[arg(short, long)]
        expect_offset: Option<u64>,
    },

    /// Read events from a stream
    Read {
        /// Stream id
        stream: u64,

        /// First offset to read
        #[arg(long, default_value = "0")]
        from: u64,

        /// Approximate byte budget for the batch
        #[arg(short, long, default_value_t = kmb_client::DEFAULT_MAX_BYTES)]
        max_bytes: u64,
    },

    /// Run a SQL query
    Query {
        /// SQL text
        sql: String,

        /// Positional parameter as type:literal (repeatable)
        #[arg(short, long = "param")]
        params: Vec<Value>,
    },

    /// Run a SQL query against the state at a log position
    QueryAt {
        /// Log position
        position: u64,

        /// SQL text
        sql: String,

        /// Positional parameter as type:literal (repeatable)
        #[arg(short, long = "param")]
        params: Vec<Value>,
    },

    /// Run a DDL or DML statement
    Execute {
        /// SQL text
        sql: String,

        /// Positional parameter as type:literal (repeatable)
        #[arg(short, long = "param")]
        params: Vec<Value>,
    },

    /// Print the engine's message and retryability for every status code
    Errors,
}

/// Loads the engine library the user pointed at.
#[allow(unsafe_code)]
fn load_engine(library: &LibraryConfig) -> LoadResult<Arc<Engine>> {
    // SAFETY: the library named by --library or KMB_FFI_LIBRARY (or found
    // on the search path) is taken to be a kmb engine build; running
    // `kmb` against anything else is the operator's error.
    unsafe { kmb_ffi::init(library) }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut library = LibraryConfig::new();
    if let Some(path) = &cli.library {
        library = library.path_override(path);
    }
    let engine = load_engine(&library)?;
    debug!(engine = engine.name(), "engine ready");

    let mut out = std::io::stdout().lock();
    if let Commands::Errors = cli.command {
        return commands::errors::run(&engine, cli.format, &mut out);
    }

    let mut config = ClientConfig::new(cli.tenant).addresses(cli.addresses);
    if let Some(token) = cli.token {
        config = config.auth_token(token);
    }
    let conn = Connection::connect_with(engine, &config)?;

    let result = match cli.command {
        Commands::CreateStream { name, data_class } => {
            commands::stream::create(&conn, &name, data_class, cli.format, &mut out)
        }
        Commands::Append {
            stream,
            events,
            expect_offset,
        } => commands::stream::append(
            &conn,
            StreamId(stream),
            &events,
            expect_offset.map(Offset),
            cli.format,
            &mut out,
        ),
        Commands::Read {
            stream,
            from,
            max_bytes,
        } => commands::stream::read(
            &conn,
            StreamId(stream),
            Offset(from),
            max_bytes,
            cli.format,
            &mut out,
        ),
        Commands::Query { sql, params } => {
            commands::sql::query(&conn, &sql, &params, None, cli.format, &mut out)
        }
        Commands::QueryAt {
            position,
            sql,
            params,
        } => commands::sql::query(
            &conn,
            &sql,
            &params,
            Some(Offset(position)),
            cli.format,
            &mut out,
        ),
        Commands::Execute { sql, params } => {
            commands::sql::execute(&conn, &sql, &params, cli.format, &mut out)
        }
        Commands::Errors => Ok(()),
    };

    conn.disconnect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_and_params() {
        let cli = Cli::try_parse_from([
            "kmb",
            "--address",
            "a:1",
            "--address",
            "b:2",
            "--tenant",
            "7",
            "--format",
            "json",
            "query",
            "SELECT * FROM t WHERE id = $1 AND name = $2",
            "-p",
            "bigint:5",
            "-p",
            "text:ann",
        ])
        .unwrap();

        assert_eq!(cli.addresses, vec!["a:1", "b:2"]);
        assert_eq!(cli.tenant, 7);
        assert_eq!(cli.format, Format::Json);
        match cli.command {
            Commands::Query { params, .. } => {
                assert_eq!(params, vec![Value::BigInt(5), Value::Text("ann".into())]);
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Cli::try_parse_from(["kmb", "query", "SELECT 1", "-p", "bigint:x"]).is_err());
        assert!(Cli::try_parse_from(["kmb", "create-stream", "s", "-c", "secret"]).is_err());
        assert!(Cli::try_parse_from(["kmb", "append", "1"]).is_err());
    }

    #[test]
    fn append_takes_expected_offset() {
        let cli = Cli::try_parse_from(["kmb", "append", "3", "a", "b", "--expect-offset", "2"])
            .unwrap();
        match cli.command {
            Commands::Append {
                stream,
                events,
                expect_offset,
            } => {
                assert_eq!(stream, 3);
                assert_eq!(events, vec!["a", "b"]);
                assert_eq!(expect_offset, Some(2));
            }
            _ => panic!("expected append"),
        }
    }
}
