//! Introspectors list the raw dependency declarations recorded in a binary.
//!
//! # Implementation Note: load commands and import tables
//! A Mach-O binary records each dependency as an `LC_LOAD_DYLIB` load command
//! holding an install name (`/usr/lib/libz.1.dylib`, `@rpath/QtCore.framework/...`).
//! A shared library additionally records its *own* install name as
//! `LC_ID_DYLIB`, which `otool -L` prints as the first entry.
//!
//! A PE binary records bare DLL names in its import table (`KERNEL32.dll`),
//! and an ELF object records bare sonames as `DT_NEEDED` entries
//! (`libz.so.1`). Both are printed by `objdump -p`.
//!
//! Neither tool's output is interpreted beyond extracting those names: search
//! path resolution and classification happen elsewhere.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{ClosureError, Result};
use crate::format::BinaryFormat;
use crate::process::Tool;

const OTOOL: Tool = Tool {
    program: "otool",
    hint: "Please install Xcode Command Line Tools: xcode-select --install",
};

const OBJDUMP: Tool = Tool {
    program: "objdump",
    hint: "Please install GNU binutils (or the MinGW toolchain on Windows)",
};

/// Lists the dependency declarations recorded inside one binary.
pub trait Introspector: Send + Sync {
    /// Ordered, de-duplicated raw declarations of `path`, excluding the
    /// binary's own identity entry.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::NotALoadableBinary`] if `path` is not a
    /// dynamically loadable binary, [`ClosureError::ParseFailure`] if the
    /// tool fails, and [`ClosureError::IntrospectionTimeout`] if it hangs.
    fn list_declared_dependencies(&self, path: &Path) -> Result<Vec<String>>;
}

impl<T: Introspector + ?Sized> Introspector for Box<T> {
    fn list_declared_dependencies(&self, path: &Path) -> Result<Vec<String>> {
        (**self).list_declared_dependencies(path)
    }
}

impl<T: Introspector + ?Sized> Introspector for &T {
    fn list_declared_dependencies(&self, path: &Path) -> Result<Vec<String>> {
        (**self).list_declared_dependencies(path)
    }
}

/// Pick the introspector for a binary format.
pub fn introspector_for(format: BinaryFormat, timeout: Duration) -> Box<dyn Introspector> {
    match format {
        BinaryFormat::MachO => Box::new(OtoolIntrospector::new(timeout)),
        BinaryFormat::Pe | BinaryFormat::Elf => Box::new(ObjdumpIntrospector::new(timeout)),
    }
}

/// Mach-O introspection via `otool -L`.
#[derive(Debug, Clone)]
pub struct OtoolIntrospector {
    timeout: Duration,
}

impl OtoolIntrospector {
    /// Create an introspector whose tool runs are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Introspector for OtoolIntrospector {
    fn list_declared_dependencies(&self, path: &Path) -> Result<Vec<String>> {
        let output = OTOOL.run(&["-L"], path, self.timeout)?;

        if output.stdout.contains("is not an object file")
            || output.stderr.contains("is not an object file")
        {
            return Err(ClosureError::NotALoadableBinary {
                path: path.to_path_buf(),
                reason: "otool: not an object file".to_string(),
            });
        }
        if !output.status.success() {
            return Err(ClosureError::ParseFailure {
                binary: path.to_path_buf(),
                reason: output.stderr.trim().to_string(),
            });
        }

        let deps = parse_otool(&output.stdout, path)?;
        debug!(binary = %path.display(), count = deps.len(), "otool declarations");
        Ok(deps)
    }
}

/// PE and ELF introspection via `objdump -p`.
#[derive(Debug, Clone)]
pub struct ObjdumpIntrospector {
    timeout: Duration,
}

impl ObjdumpIntrospector {
    /// Create an introspector whose tool runs are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Introspector for ObjdumpIntrospector {
    fn list_declared_dependencies(&self, path: &Path) -> Result<Vec<String>> {
        let output = OBJDUMP.run(&["-p"], path, self.timeout)?;

        if output.stderr.contains("file format not recognized") {
            return Err(ClosureError::NotALoadableBinary {
                path: path.to_path_buf(),
                reason: "objdump: file format not recognized".to_string(),
            });
        }
        if !output.status.success() {
            return Err(ClosureError::ParseFailure {
                binary: path.to_path_buf(),
                reason: output.stderr.trim().to_string(),
            });
        }

        let deps = parse_objdump(&output.stdout, path);
        debug!(binary = %path.display(), count = deps.len(), "objdump declarations");
        Ok(deps)
    }
}

/// Extract install names from `otool -L` output.
///
/// Header lines (`<path>:` and `<path> (architecture arm64):`) are skipped,
/// the version suffix is stripped, and the binary's own install id is
/// dropped.
///
/// # Errors
///
/// Returns [`ClosureError::ParseFailure`] if an entry line lacks the
/// `(compatibility version ...)` suffix every load command carries.
pub fn parse_otool(stdout: &str, binary: &Path) -> Result<Vec<String>> {
    let mut deps = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.ends_with(':') {
            continue;
        }
        let Some(idx) = line.rfind(" (") else {
            return Err(ClosureError::ParseFailure {
                binary: binary.to_path_buf(),
                reason: format!("unexpected otool line: {line}"),
            });
        };
        deps.push(line[..idx].trim().to_string());
    }
    Ok(finish(deps, binary))
}

/// Extract `DLL Name:` (PE) and `NEEDED` (ELF) entries from `objdump -p`.
pub fn parse_objdump(stdout: &str, binary: &Path) -> Vec<String> {
    let deps = stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if let Some(name) = line.strip_prefix("DLL Name:") {
                Some(name.trim().to_string())
            } else {
                line.strip_prefix("NEEDED")
                    .filter(|rest| rest.starts_with(char::is_whitespace))
                    .map(|rest| rest.trim().to_string())
            }
        })
        .filter(|name| !name.is_empty())
        .collect();
    finish(deps, binary)
}

/// Deduplicate by text (first occurrence wins) and drop the self entry.
fn finish(deps: Vec<String>, binary: &Path) -> Vec<String> {
    let own_name = binary.file_name().map(|n| n.to_string_lossy().into_owned());
    let mut seen = HashSet::new();
    deps.into_iter()
        .filter(|dep| own_name.as_deref() != Some(base_name(dep)))
        .filter(|dep| seen.insert(dep.clone()))
        .collect()
}

/// Last path component of a declaration, accepting both `/` and `\`.
pub fn base_name(declaration: &str) -> &str {
    declaration
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(declaration)
}
