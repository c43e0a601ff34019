//! Process-wide engine installation.
//!
//! The engine is resolved once, explicitly, by [`init`] (or supplied
//! directly through [`install`]) and then shared through [`global`].
//! Nothing is discovered implicitly on first use.
//!
//! Resolution order for [`init`]:
//!
//! 1. [`LibraryConfig::path_override`]; an override that does not exist is
//!    an error, never a fallthrough.
//! 2. The `KMB_FFI_LIBRARY` environment variable.
//! 3. Each of [`LibraryConfig::search_dirs`], in order.
//! 4. `target/debug` then `target/release` under the current directory.
//! 5. The bare file name, left to the platform loader's search path.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{LoadError, LoadResult};

/// Environment variable naming the engine library path.
pub const LIBRARY_ENV: &str = "KMB_FFI_LIBRARY";

/// Platform file name of the engine library.
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAME: &str = "libkimberlite_ffi.dylib";
/// Platform file name of the engine library.
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY_NAME: &str = "kimberlite_ffi.dll";
/// Platform file name of the engine library.
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const DEFAULT_LIBRARY_NAME: &str = "libkimberlite_ffi.so";

static GLOBAL: RwLock<Option<Arc<Engine>>> = parking_lot::const_rwlock(None);

/// Where to look for the engine library.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Exact library path; skips every other candidate.
    pub path_override: Option<PathBuf>,
    /// Directories searched after the environment variable.
    pub search_dirs: Vec<PathBuf>,
    /// Library file name looked up in each directory.
    pub file_name: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            path_override: None,
            search_dirs: Vec::new(),
            file_name: DEFAULT_LIBRARY_NAME.to_string(),
        }
    }
}

impl LibraryConfig {
    /// Creates a configuration with the default search order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses exactly this library path.
    #[must_use]
    pub fn path_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.path_override = Some(path.into());
        self
    }

    /// Adds a directory to search.
    #[must_use]
    pub fn search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Sets the library file name.
    #[must_use]
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }
}

/// Result of resolution before anything is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// An existing file.
    File(PathBuf),
    /// A bare name for the platform loader, plus everything tried first.
    LoaderSearch {
        /// Name handed to the loader.
        name: PathBuf,
        /// File candidates that did not exist.
        searched: Vec<PathBuf>,
    },
}

/// File candidates in resolution order, excluding the bare-name fallback.
fn candidates(config: &LibraryConfig, env_path: Option<OsString>, cwd: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        out.push(PathBuf::from(path));
    }
    for dir in &config.search_dirs {
        out.push(dir.join(&config.file_name));
    }
    if let Some(cwd) = cwd {
        for profile in ["debug", "release"] {
            out.push(cwd.join("target").join(profile).join(&config.file_name));
        }
    }
    out
}

fn locate_with(
    config: &LibraryConfig,
    env_path: Option<OsString>,
    cwd: Option<&Path>,
) -> LoadResult<Located> {
    if let Some(path) = &config.path_override {
        return if path.is_file() {
            Ok(Located::File(path.clone()))
        } else {
            Err(LoadError::NotFound {
                searched: vec![path.clone()],
            })
        };
    }

    let searched = candidates(config, env_path, cwd);
    if let Some(found) = searched.iter().find(|p| p.is_file()) {
        return Ok(Located::File(found.clone()));
    }
    Ok(Located::LoaderSearch {
        name: PathBuf::from(&config.file_name),
        searched,
    })
}

/// Resolves the library location using the live environment.
pub fn locate(config: &LibraryConfig) -> LoadResult<Located> {
    let cwd = env::current_dir().ok();
    locate_with(config, env::var_os(LIBRARY_ENV), cwd.as_deref())
}

/// Resolves and loads the engine without installing it.
///
/// # Safety
///
/// Whatever library `config` and the environment resolve to is loaded as
/// by [`Engine::load`]: loading runs its initializers, and its exported
/// symbols must match the signatures in [`crate::api`]. The caller vouches
/// for every candidate location, including `KMB_FFI_LIBRARY`.
pub unsafe fn open(config: &LibraryConfig) -> LoadResult<Engine> {
    match locate(config)? {
        Located::File(path) => Engine::load(&path),
        Located::LoaderSearch { name, mut searched } => {
            match Engine::load(&name) {
                Ok(engine) => Ok(engine),
                Err(LoadError::Open { .. }) => {
                    searched.push(name);
                    Err(LoadError::NotFound { searched })
                }
                Err(other) => Err(other),
            }
        }
    }
}

/// Loads the engine once and installs it for the process.
///
/// Later calls return the installed engine without consulting `config`.
///
/// # Safety
///
/// Same contract as [`open`].
pub unsafe fn init(config: &LibraryConfig) -> LoadResult<Arc<Engine>> {
    let mut slot = GLOBAL.write();
    if let Some(engine) = slot.as_ref() {
        return Ok(Arc::clone(engine));
    }
    let engine = Arc::new(open(config)?);
    info!(engine = engine.name(), "engine initialized");
    *slot = Some(Arc::clone(&engine));
    Ok(engine)
}

/// Installs an already-built engine.
pub fn install(engine: Engine) -> LoadResult<Arc<Engine>> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(LoadError::AlreadyInitialized);
    }
    let engine = Arc::new(engine);
    debug!(engine = engine.name(), "engine installed");
    *slot = Some(Arc::clone(&engine));
    Ok(engine)
}

/// Returns the installed engine.
pub fn global() -> LoadResult<Arc<Engine>> {
    GLOBAL.read().clone().ok_or(LoadError::NotInitialized)
}

/// Uninstalls the engine. Connections already holding it keep it alive.
pub fn shutdown() -> Option<Arc<Engine>> {
    let previous = GLOBAL.write().take();
    if previous.is_some() {
        debug!("engine uninstalled");
    }
    previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        path
    }

    #[test]
    fn candidate_order() {
        let config = LibraryConfig::new()
            .file_name("libx.so")
            .search_dir("/opt/a")
            .search_dir("/opt/b");
        let got = candidates(&config, Some("/env/libx.so".into()), Some(Path::new("/work")));
        let want: Vec<PathBuf> = [
            "/env/libx.so",
            "/opt/a/libx.so",
            "/opt/b/libx.so",
            "/work/target/debug/libx.so",
            "/work/target/release/libx.so",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn empty_env_var_is_ignored() {
        let config = LibraryConfig::new();
        assert!(candidates(&config, Some(OsString::new()), None).is_empty());
    }

    #[test]
    fn missing_override_does_not_fall_through() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), DEFAULT_LIBRARY_NAME);
        let config = LibraryConfig::new()
            .path_override(dir.path().join("absent.so"))
            .search_dir(dir.path());

        match locate_with(&config, None, None) {
            Err(LoadError::NotFound { searched }) => {
                assert_eq!(searched, vec![dir.path().join("absent.so")]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn first_existing_candidate_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let hit = touch(second.path(), "libx.so");
        let config = LibraryConfig::new()
            .file_name("libx.so")
            .search_dir(first.path())
            .search_dir(second.path());

        assert_eq!(locate_with(&config, None, None).unwrap(), Located::File(hit));

        let env_hit = touch(first.path(), "from-env.so");
        assert_eq!(
            locate_with(&config, Some(env_hit.clone().into()), None).unwrap(),
            Located::File(env_hit)
        );
    }

    #[test]
    fn cwd_target_dirs_before_loader_search() {
        let work = TempDir::new().unwrap();
        std::fs::create_dir_all(work.path().join("target/release")).unwrap();
        let hit = touch(&work.path().join("target/release"), "libx.so");
        let config = LibraryConfig::new().file_name("libx.so");

        assert_eq!(
            locate_with(&config, None, Some(work.path())).unwrap(),
            Located::File(hit)
        );
    }

    #[test]
    fn falls_back_to_bare_name() {
        let config = LibraryConfig::new().file_name("libnowhere.so");
        match locate_with(&config, None, None).unwrap() {
            Located::LoaderSearch { name, searched } => {
                assert_eq!(name, PathBuf::from("libnowhere.so"));
                assert!(searched.is_empty());
            }
            other @ Located::File(_) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn override_that_is_not_a_library_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let bogus = touch(dir.path(), "bogus.so");
        let config = LibraryConfig::new().path_override(&bogus);
        // SAFETY: the file is empty, so the platform loader rejects it
        // before running anything.
        match unsafe { open(&config) } {
            Err(LoadError::Open { path, .. }) => assert_eq!(path, bogus),
            other => panic!("expected Open error, got {other:?}"),
        }
    }
}
