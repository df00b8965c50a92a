//! Discovery of llama.cpp binaries on disk

use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Maximum directory depth walked below an install root
const MAX_WALK_DEPTH: usize = 4;

const BUILD_DIRS: &[&str] = &["build/bin", "../build/bin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    /// `llama-cli`, one prompt per run
    Cli,
    /// `llama-server`, long-lived HTTP endpoint
    Server,
}

impl BinaryKind {
    /// Candidate base names, most preferred first
    pub fn base_names(self) -> &'static [&'static str] {
        match self {
            BinaryKind::Cli => &["llama-cli"],
            BinaryKind::Server => &["llama-server", "server"],
        }
    }

    pub fn name(self) -> &'static str {
        self.base_names()[0]
    }

    /// Candidate file names with the platform's executable suffix
    pub fn file_names(self) -> Vec<String> {
        self.base_names()
            .iter()
            .map(|name| format!("{}{}", name, std::env::consts::EXE_SUFFIX))
            .collect()
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    KnownDirectory,
    Path,
    BuildDirectory,
    Manual,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStrategy::KnownDirectory => write!(f, "install directory"),
            SearchStrategy::Path => write!(f, "PATH"),
            SearchStrategy::BuildDirectory => write!(f, "build directory"),
            SearchStrategy::Manual => write!(f, "manual"),
        }
    }
}

/// A resolved executable and how it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryLocation {
    path: PathBuf,
    strategy: SearchStrategy,
}

impl BinaryLocation {
    /// Wrap a path the user picked by hand. Relative paths are resolved
    /// against the current directory.
    pub fn manual(path: impl Into<PathBuf>) -> Self {
        Self {
            path: absolute(path.into()),
            strategy: SearchStrategy::Manual,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }
}

/// Ordered search over install directories, PATH, and build directories
#[derive(Debug, Clone, Default)]
pub struct Locator {
    /// Package roots walked recursively (winget, Program Files)
    install_roots: Vec<PathBuf>,
    /// Install directories checked without descending
    known_dirs: Vec<PathBuf>,
    path_dirs: Vec<PathBuf>,
    build_dirs: Vec<PathBuf>,
}

impl Locator {
    pub fn new(known_dirs: Vec<PathBuf>, path_dirs: Vec<PathBuf>, build_dirs: Vec<PathBuf>) -> Self {
        Self {
            install_roots: Vec::new(),
            known_dirs,
            path_dirs,
            build_dirs,
        }
    }

    /// Add package roots searched up to four levels deep, ahead of every
    /// other location
    pub fn with_install_roots(mut self, install_roots: Vec<PathBuf>) -> Self {
        self.install_roots = install_roots;
        self
    }

    /// Locator for the current platform and process environment
    pub fn from_env() -> Self {
        let path_dirs = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();

        Self {
            install_roots: install_roots(),
            known_dirs: known_install_dirs(),
            path_dirs,
            build_dirs: BUILD_DIRS.iter().map(|dir| absolute(PathBuf::from(dir))).collect(),
        }
    }

    /// First matching executable, or `None`
    pub fn locate(&self, kind: BinaryKind) -> Option<BinaryLocation> {
        let names = kind.file_names();

        let found = self
            .install_roots
            .iter()
            .find_map(|dir| walk_for(dir, &names))
            .or_else(|| find_in(&self.known_dirs, &names))
            .map(|path| (path, SearchStrategy::KnownDirectory))
            .or_else(|| {
                find_in(&self.path_dirs, &names).map(|path| (path, SearchStrategy::Path))
            })
            .or_else(|| {
                find_in(&self.build_dirs, &names)
                    .map(|path| (absolute(path), SearchStrategy::BuildDirectory))
            });

        match found {
            Some((path, strategy)) => {
                tracing::debug!("Found {} via {}: {:?}", kind, strategy, path);
                Some(BinaryLocation { path, strategy })
            }
            None => {
                tracing::debug!("{} not found", kind);
                None
            }
        }
    }
}

#[cfg(windows)]
fn install_roots() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        dirs.push(PathBuf::from(local).join("Microsoft").join("WinGet").join("Packages"));
    }
    for var in ["PROGRAMFILES", "PROGRAMFILES(X86)"] {
        if let Some(base) = std::env::var_os(var) {
            dirs.push(PathBuf::from(base).join("llama.cpp"));
        }
    }
    dirs
}

#[cfg(windows)]
fn known_install_dirs() -> Vec<PathBuf> {
    Vec::new()
}

#[cfg(not(windows))]
fn install_roots() -> Vec<PathBuf> {
    Vec::new()
}

#[cfg(not(windows))]
fn known_install_dirs() -> Vec<PathBuf> {
    ["/opt/homebrew/bin", "/usr/local/bin", "/opt/llama.cpp/bin"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

/// Walk an install root for the first candidate name.
fn walk_for(base: &Path, names: &[String]) -> Option<PathBuf> {
    if !base.is_dir() {
        return None;
    }

    WalkDir::new(base)
        .max_depth(MAX_WALK_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .find_map(|entry| find_in(std::slice::from_ref(&entry.into_path()), names))
}

/// Check each directory for each candidate name, directory-major.
fn find_in(dirs: &[PathBuf], names: &[String]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| {
        names
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| is_executable(candidate))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}
