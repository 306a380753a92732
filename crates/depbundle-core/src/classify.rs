//! System vs. bundleable classification and node identity.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Blacklist, BundleConfig};
use crate::introspect::base_name;

const FRAMEWORK_SUFFIX: &str = ".framework";

/// Identity of a node in the dependency graph.
///
/// For a flat library this is its resolved path. For anything inside a
/// framework bundle it is the bundle root, so
/// `Foo.framework/Versions/1/Foo` and `Foo.framework/Versions/2/Foo`
/// share one key: `Foo.framework`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(PathBuf);

impl NodeKey {
    /// Compute the key for a resolved path.
    pub fn normalize(path: &Path) -> Self {
        let mut root = PathBuf::new();
        for component in path.components() {
            root.push(component);
            if component
                .as_os_str()
                .to_string_lossy()
                .ends_with(FRAMEWORK_SUFFIX)
            {
                return Self(root);
            }
        }
        Self(path.to_path_buf())
    }

    /// Whether this key names a framework bundle directory.
    pub fn is_framework(&self) -> bool {
        self.0
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(FRAMEWORK_SUFFIX))
    }

    /// The underlying path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for NodeKey {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Outcome of classifying a resolved library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Present on every target machine; never bundled, never traversed.
    System,
    /// Must ship alongside the root binary and be traversed.
    Bundleable,
}

/// Applies system prefixes and the blacklist.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    system_paths: &'a [PathBuf],
    blacklist: &'a Blacklist,
}

impl<'a> Classifier<'a> {
    /// Classifier over explicit prefixes and blacklist.
    pub fn new(system_paths: &'a [PathBuf], blacklist: &'a Blacklist) -> Self {
        Self {
            system_paths,
            blacklist,
        }
    }

    /// Classifier using a config's system paths and blacklist.
    pub fn from_config(config: &'a BundleConfig) -> Self {
        Self::new(&config.system_paths, &config.blacklist)
    }

    /// Whether a raw declaration is blacklisted by base name. Checked before
    /// resolution so blacklisted libraries need not exist on the host.
    pub fn is_blacklisted(&self, declaration: &str) -> bool {
        self.blacklist.contains(base_name(declaration))
    }

    /// Whether a raw declaration is an absolute path under a system prefix.
    ///
    /// Checked before resolution: on macOS 11+ the system libraries live
    /// only in the dyld shared cache and have no file on disk.
    pub fn is_system_declaration(&self, declaration: &str) -> bool {
        let path = Path::new(declaration);
        path.is_absolute() && self.under_system_prefix(path)
    }

    /// Classify a resolved absolute path. The blacklist overrides prefixes.
    pub fn classify(&self, path: &Path) -> Classification {
        let blacklisted = path
            .file_name()
            .is_some_and(|n| self.blacklist.contains(&n.to_string_lossy()));

        if blacklisted || self.under_system_prefix(path) {
            Classification::System
        } else {
            Classification::Bundleable
        }
    }

    fn under_system_prefix(&self, path: &Path) -> bool {
        self.system_paths
            .iter()
            .any(|prefix| starts_with_ignore_case(path, prefix))
    }
}

/// Component-wise `Path::starts_with` that ignores ASCII case, matching the
/// default case-insensitive filesystems of Windows and macOS.
fn starts_with_ignore_case(path: &Path, prefix: &Path) -> bool {
    let mut components = path.components();
    prefix.components().all(|want| {
        components
            .next()
            .is_some_and(|have| have.as_os_str().eq_ignore_ascii_case(want.as_os_str()))
    })
}
