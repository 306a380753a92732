//! Copies a computed closure next to the root binary's distribution.
//!
//! Flat libraries are copied file-by-file (symlinks are followed so the
//! output holds real files). Framework nodes are recreated as whole bundle
//! directories with their internal symlinks intact. An optional `upx` pass
//! compresses each copied flat library.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::closure::Closure;
use crate::config::DEFAULT_TIMEOUT;
use crate::process::Tool;

const UPX: Tool = Tool {
    program: "upx",
    hint: "Install UPX from https://upx.github.io or your package manager",
};

/// Executable compression pass using `upx`.
#[derive(Debug, Clone)]
pub struct Compressor {
    timeout: Duration,
}

impl Compressor {
    /// Compressor whose runs are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Compress one file in place. Returns `false` if `upx` declined the
    /// file (already packed, unsupported format, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if `upx` is missing or exceeds its time bound.
    pub fn compress(&self, path: &Path) -> Result<bool> {
        let output = UPX.run(&["-q", "--best"], path, self.timeout)?;
        if output.status.success() {
            Ok(true)
        } else {
            warn!(path = %path.display(), stderr = %output.stderr.trim(), "upx skipped file");
            Ok(false)
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// What a bundling run produced.
#[derive(Debug, Default)]
pub struct BundleReport {
    /// Destination paths, in closure order.
    pub copied: Vec<PathBuf>,
    /// Number of files successfully compressed.
    pub compressed: usize,
}

/// Copies closure nodes into one output directory.
#[derive(Debug)]
pub struct Bundler {
    output_dir: PathBuf,
    compressor: Option<Compressor>,
}

impl Bundler {
    /// Bundler targeting `output_dir`, without compression.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            compressor: None,
        }
    }

    /// Enable the compression pass.
    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Copy every node of `closure` into the output directory.
    ///
    /// # Errors
    ///
    /// Returns an error if two nodes share a file name, if any copy fails,
    /// or if the compressor cannot run. Copies made before the failure are
    /// left in place.
    pub fn bundle(&self, closure: &Closure) -> Result<BundleReport> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let mut names = HashSet::new();
        for node in closure {
            let name = node
                .as_path()
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid library path: {node}"))?;
            if !names.insert(name.to_os_string()) {
                bail!(
                    "Two libraries named '{}' would collide in {}",
                    name.to_string_lossy(),
                    self.output_dir.display()
                );
            }
        }

        let mut report = BundleReport::default();
        for node in closure {
            let src = node.as_path();
            let dest = if node.is_framework() {
                copy_bundle(src, &self.output_dir)?
            } else {
                let dest = self.output_dir.join(src.file_name().unwrap_or_default());
                std::fs::copy(src, &dest).with_context(|| {
                    format!("Failed to copy {} to {}", src.display(), dest.display())
                })?;
                if let Some(compressor) = &self.compressor {
                    if compressor.compress(&dest)? {
                        report.compressed += 1;
                    }
                }
                dest
            };
            info!(src = %src.display(), dest = %dest.display(), "copied");
            report.copied.push(dest);
        }

        Ok(report)
    }
}

/// Recreate the bundle `src` inside `output_dir`. Symlinks such as
/// `Versions/Current` stay symlinks so version trees are not duplicated.
fn copy_bundle(src: &Path, output_dir: &Path) -> Result<PathBuf> {
    let dest = output_dir.join(src.file_name().unwrap_or_default());
    let cleared = match dest.symlink_metadata() {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&dest),
        Ok(_) => std::fs::remove_file(&dest),
        Err(_) => Ok(()),
    };
    cleared.with_context(|| format!("Failed to replace {}", dest.display()))?;

    // Without symlink support the links are materialised instead.
    for entry in walkdir::WalkDir::new(src).follow_links(!cfg!(unix)) {
        let entry = entry.with_context(|| format!("Failed to read bundle {}", src.display()))?;
        let target = dest.join(entry.path().strip_prefix(src)?);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }

    Ok(dest)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let link = std::fs::read_link(src)
        .with_context(|| format!("Failed to read link {}", src.display()))?;
    std::os::unix::fs::symlink(&link, dest)
        .with_context(|| format!("Failed to link {} -> {}", dest.display(), link.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    std::fs::copy(src, dest)
        .map(drop)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::compute_closure_with;
    use crate::config::BundleConfig;
    use crate::error::ClosureError;
    use crate::introspect::Introspector;
    use std::fs;

    /// Root declares every file under `lib/`; libraries declare nothing.
    struct FlatIntrospector {
        root: PathBuf,
        declarations: Vec<String>,
    }

    impl Introspector for FlatIntrospector {
        fn list_declared_dependencies(&self, path: &Path) -> Result<Vec<String>, ClosureError> {
            Ok(if path == self.root {
                self.declarations.clone()
            } else {
                Vec::new()
            })
        }
    }

    fn closure_of(lib: &Path, root: &Path, declarations: &[&str]) -> Closure {
        let introspector = FlatIntrospector {
            root: root.to_path_buf(),
            declarations: declarations.iter().map(ToString::to_string).collect(),
        };
        let config = BundleConfig::new(vec![lib.to_path_buf()], vec![]);
        compute_closure_with(root, &config, &introspector).unwrap()
    }

    #[test]
    fn test_copies_flat_and_framework_nodes() {
        let tmp = tempfile::tempdir().unwrap();
        let lib = tmp.path().join("lib");
        fs::create_dir_all(lib.join("Foo.framework/Versions/A/Resources")).unwrap();
        fs::write(lib.join("Foo.framework/Versions/A/Foo"), b"foo").unwrap();
        fs::write(lib.join("Foo.framework/Versions/A/Resources/Info.plist"), b"plist").unwrap();
        fs::write(lib.join("libbar.dylib"), b"bar").unwrap();
        let root = tmp.path().join("app");
        fs::write(&root, b"").unwrap();

        let framework = lib.join("Foo.framework/Versions/A/Foo");
        let framework = framework.to_string_lossy();
        let closure = closure_of(&lib, &root, &["libbar.dylib", &*framework]);

        let out = tmp.path().join("out");
        let report = Bundler::new(&out).bundle(&closure).unwrap();

        assert_eq!(report.copied.len(), 2);
        assert_eq!(report.compressed, 0);
        assert_eq!(fs::read(out.join("libbar.dylib")).unwrap(), b"bar");
        assert_eq!(
            fs::read(out.join("Foo.framework/Versions/A/Resources/Info.plist")).unwrap(),
            b"plist"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_framework_symlinks_are_preserved() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::tempdir().unwrap();
        let lib = tmp.path().join("lib");
        let bundle = lib.join("Foo.framework");
        fs::create_dir_all(bundle.join("Versions/A/Resources")).unwrap();
        fs::write(bundle.join("Versions/A/Foo"), b"foo").unwrap();
        fs::write(bundle.join("Versions/A/Resources/Info.plist"), b"plist").unwrap();
        symlink("A", bundle.join("Versions/Current")).unwrap();
        symlink("Versions/Current/Foo", bundle.join("Foo")).unwrap();
        symlink("Versions/Current/Resources", bundle.join("Resources")).unwrap();
        let root = tmp.path().join("app");
        fs::write(&root, b"").unwrap();

        let framework = bundle.join("Versions/A/Foo").to_string_lossy().into_owned();
        let closure = closure_of(&lib, &root, &[framework.as_str()]);

        let out = tmp.path().join("out");
        // A second run replaces the first copy.
        Bundler::new(&out).bundle(&closure).unwrap();
        Bundler::new(&out).bundle(&closure).unwrap();

        let copied = out.join("Foo.framework");
        assert!(copied.join("Versions/Current").symlink_metadata().unwrap().is_symlink());
        assert_eq!(fs::read_link(copied.join("Versions/Current")).unwrap(), Path::new("A"));
        assert!(copied.join("Foo").symlink_metadata().unwrap().is_symlink());
        assert_eq!(fs::read(copied.join("Foo")).unwrap(), b"foo");
        assert_eq!(fs::read_dir(copied.join("Versions")).unwrap().count(), 2);
    }

    #[test]
    fn test_name_collision_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("libz.so"), b"a").unwrap();
        fs::write(b.join("libz.so"), b"b").unwrap();
        let root = tmp.path().join("app");
        fs::write(&root, b"").unwrap();

        let first = a.join("libz.so").to_string_lossy().into_owned();
        let second = b.join("libz.so").to_string_lossy().into_owned();
        let closure = closure_of(&a, &root, &[first.as_str(), second.as_str()]);
        assert_eq!(closure.len(), 2);

        let err = Bundler::new(tmp.path().join("out"))
            .bundle(&closure)
            .unwrap_err();
        assert!(err.to_string().contains("collide"));
    }
}
