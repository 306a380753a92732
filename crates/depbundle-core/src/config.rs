//! Immutable configuration for a closure computation.
//!
//! A [`BundleConfig`] is built once, per root binary, from platform defaults,
//! an optional `depbundle.toml` file, and command-line overrides. It is
//! passed by reference into every computation, so concurrent runs for
//! different root binaries never share mutable state.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClosureError, Result};
use crate::format::Platform;

/// Default bound on a single introspection tool run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Conventional config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "depbundle.toml";

const MACOS_SYSTEM_PATHS: &[&str] = &["/usr/lib", "/System/Library"];

const WINDOWS_SYSTEM_PATHS: &[&str] = &["C:\\Windows"];

const LINUX_SYSTEM_PATHS: &[&str] = &["/lib", "/lib64", "/usr/lib", "/usr/lib64"];

/// Core Windows DLLs shipped with every installation. Cross-bundling hosts
/// (MinGW sysroots) often carry import stubs for these under local paths.
const WINDOWS_BLACKLIST: &[&str] = &[
    "advapi32.dll",
    "comctl32.dll",
    "comdlg32.dll",
    "crypt32.dll",
    "d3d9.dll",
    "d3d11.dll",
    "dnsapi.dll",
    "dwmapi.dll",
    "dxgi.dll",
    "gdi32.dll",
    "imm32.dll",
    "iphlpapi.dll",
    "kernel32.dll",
    "mpr.dll",
    "msvcrt.dll",
    "mswsock.dll",
    "netapi32.dll",
    "ntdll.dll",
    "ole32.dll",
    "oleaut32.dll",
    "opengl32.dll",
    "psapi.dll",
    "rpcrt4.dll",
    "secur32.dll",
    "setupapi.dll",
    "shell32.dll",
    "shlwapi.dll",
    "user32.dll",
    "userenv.dll",
    "usp10.dll",
    "uxtheme.dll",
    "version.dll",
    "winmm.dll",
    "winspool.drv",
    "ws2_32.dll",
    "wsock32.dll",
    "wtsapi32.dll",
];

/// glibc runtime pieces that must come from the target system.
const LINUX_BLACKLIST: &[&str] = &[
    "ld-linux-aarch64.so.1",
    "ld-linux-x86-64.so.2",
    "ld-linux.so.2",
    "libc.so.6",
    "libdl.so.2",
    "libm.so.6",
    "libpthread.so.0",
    "libresolv.so.2",
    "librt.so.1",
];

/// Order in which the frontier is drained.
///
/// Every variant yields the same closure; only discovery order (and so the
/// order of log lines) differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Traversal {
    /// Frontier as a stack.
    #[default]
    DepthFirst,
    /// Frontier as a queue.
    BreadthFirst,
    /// Frontier processed level by level on worker threads.
    Parallel,
}

/// Case-insensitive set of library base names that are always system-provided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist(BTreeSet<String>);

impl Blacklist {
    /// Build a blacklist from base names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        )
    }

    /// Default blacklist for a platform.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::MacOs => Self::default(),
            Platform::Windows => Self::new(WINDOWS_BLACKLIST),
            Platform::Linux => Self::new(LINUX_BLACKLIST),
        }
    }

    /// Add more names.
    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.0
            .extend(names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()));
    }

    /// Whether `base_name` is blacklisted, ignoring ASCII case.
    pub fn contains(&self, base_name: &str) -> bool {
        self.0.contains(&base_name.to_ascii_lowercase())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the blacklist is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a closure computation needs besides the root binary.
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// Searched first; libraries found here are bundled.
    pub local_paths: Vec<PathBuf>,
    /// Searched after local paths; libraries under these prefixes are never bundled.
    pub system_paths: Vec<PathBuf>,
    /// Names treated as system regardless of location.
    pub blacklist: Blacklist,
    /// Frontier discipline.
    pub traversal: Traversal,
    /// Bound on each introspection tool run.
    pub introspect_timeout: Duration,
}

impl BundleConfig {
    /// Platform defaults: no local paths, the platform's system prefixes and blacklist.
    pub fn for_platform(platform: Platform) -> Self {
        let system = match platform {
            Platform::MacOs => MACOS_SYSTEM_PATHS,
            Platform::Windows => WINDOWS_SYSTEM_PATHS,
            Platform::Linux => LINUX_SYSTEM_PATHS,
        };
        Self {
            local_paths: Vec::new(),
            system_paths: system.iter().map(PathBuf::from).collect(),
            blacklist: Blacklist::for_platform(platform),
            traversal: Traversal::default(),
            introspect_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Empty configuration, mostly useful in tests.
    pub fn new(local_paths: Vec<PathBuf>, system_paths: Vec<PathBuf>) -> Self {
        Self {
            local_paths,
            system_paths,
            blacklist: Blacklist::default(),
            traversal: Traversal::default(),
            introspect_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the blacklist.
    pub fn with_blacklist(mut self, blacklist: Blacklist) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// Set the traversal discipline.
    pub fn with_traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }

    /// Layer a parsed config file on top of this configuration.
    ///
    /// Path lists in the file are prepended so they take precedence over
    /// defaults; `blacklist` replaces, `extra_blacklist` extends.
    pub fn merge(mut self, file: ConfigFile) -> Self {
        if !file.local_paths.is_empty() {
            let mut paths = file.local_paths;
            paths.append(&mut self.local_paths);
            self.local_paths = paths;
        }
        if !file.system_paths.is_empty() {
            let mut paths = file.system_paths;
            paths.append(&mut self.system_paths);
            self.system_paths = paths;
        }
        if let Some(names) = file.blacklist {
            self.blacklist = Blacklist::new(names);
        }
        self.blacklist.extend(file.extra_blacklist);
        if let Some(traversal) = file.traversal {
            self.traversal = traversal;
        }
        if let Some(secs) = file.timeout_secs {
            self.introspect_timeout = Duration::from_secs(secs);
        }
        self
    }

    /// Make every search directory absolute against the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::Config`] if a path is empty or the current
    /// directory cannot be determined.
    pub fn absolutize(mut self) -> Result<Self> {
        for path in self.local_paths.iter_mut().chain(self.system_paths.iter_mut()) {
            if path.as_os_str().is_empty() {
                return Err(ClosureError::Config("empty search path".to_string()));
            }
            if !path.is_absolute() && !has_drive_prefix(path) {
                *path = std::path::absolute(&*path).map_err(|e| {
                    ClosureError::Config(format!("cannot absolutize {}: {e}", path.display()))
                })?;
            }
        }
        Ok(self)
    }

    /// Search order: local paths, then system paths.
    pub fn search_paths(&self) -> impl Iterator<Item = &Path> {
        self.local_paths
            .iter()
            .chain(self.system_paths.iter())
            .map(PathBuf::as_path)
    }
}

/// `C:\...` style paths are absolute for a Windows target even when bundling
/// from a Unix host.
fn has_drive_prefix(path: &Path) -> bool {
    let s = path.to_string_lossy();
    let bytes = s.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/')
}

/// On-disk form of `depbundle.toml`.
///
/// ```toml
/// local_paths = ["/opt/digikam/lib"]
/// system_paths = ["/usr/lib"]
/// extra_blacklist = ["libGL.so.1"]
/// traversal = "breadth-first"
/// timeout_secs = 60
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Additional local search directories.
    pub local_paths: Vec<PathBuf>,
    /// Additional system prefixes.
    pub system_paths: Vec<PathBuf>,
    /// Replacement blacklist.
    pub blacklist: Option<Vec<String>>,
    /// Names added to the blacklist.
    pub extra_blacklist: Vec<String>,
    /// Frontier discipline.
    pub traversal: Option<Traversal>,
    /// Introspection bound in seconds.
    pub timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Parse a config file from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::Config`] if the text is not valid TOML or
    /// contains unknown keys.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ClosureError::Config(e.to_string()))
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::Io`] if the file cannot be read and
    /// [`ClosureError::Config`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ClosureError::io(path, e))?;
        Self::parse(&content)
    }
}
