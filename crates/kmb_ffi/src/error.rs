//! Errors raised while locating and loading the engine library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for library loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Errors that can occur while resolving the engine.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No candidate location held the library.
    #[error("engine library not found; searched: {}", display_paths(searched))]
    NotFound {
        /// Locations tried, in order.
        searched: Vec<PathBuf>,
    },

    /// A candidate existed but the platform loader rejected it.
    #[error("failed to load engine library {}: {source}", path.display())]
    Open {
        /// The library path (or bare name for loader-path search).
        path: PathBuf,
        /// Loader error.
        #[source]
        source: libloading::Error,
    },

    /// The library loaded but lacks a required entry point.
    #[error("engine library is missing symbol `{symbol}`: {source}")]
    MissingSymbol {
        /// The missing symbol.
        symbol: &'static str,
        /// Loader error.
        #[source]
        source: libloading::Error,
    },

    /// No engine has been installed for this process.
    #[error("engine library not initialized; call kmb_ffi::init first")]
    NotInitialized,

    /// An engine is already installed.
    #[error("an engine is already installed for this process")]
    AlreadyInitialized,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_every_candidate() {
        let err = LoadError::NotFound {
            searched: vec![PathBuf::from("/a/lib.so"), PathBuf::from("/b/lib.so")],
        };
        let msg = err.to_string();
        assert!(msg.contains("/a/lib.so"));
        assert!(msg.contains("/b/lib.so"));
    }

    #[test]
    fn not_initialized_display() {
        assert!(LoadError::NotInitialized
            .to_string()
            .contains("not initialized"));
    }
}
