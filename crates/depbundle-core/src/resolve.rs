//! Turns a raw dependency declaration into an absolute path on disk.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{ClosureError, Result};

/// Markers that make a declaration relative to the loading binary's final
/// install location, which is not known while bundling.
const LOADER_RELATIVE_TOKENS: &[&str] = &["@rpath", "@loader_path", "@executable_path"];

/// ELF equivalent of `@loader_path`.
const ORIGIN_TOKENS: &[&str] = &["$ORIGIN", "${ORIGIN}"];

/// Whether a declaration depends on the loader's location.
pub fn is_loader_relative(declaration: &str) -> bool {
    LOADER_RELATIVE_TOKENS
        .iter()
        .any(|token| declaration.starts_with(token))
        || ORIGIN_TOKENS.iter().any(|token| declaration.contains(token))
}

/// Resolve `declaration` (recorded in `declared_by`) against `search_paths`.
///
/// 1. Loader-relative declarations are rejected outright.
/// 2. Absolute declarations are used as-is but must still exist.
/// 3. Anything else is joined onto each search directory in order, first
///    verbatim and then lowercased; the first existing file wins. If neither
///    spelling exists, a bare file name is matched against the directory's
///    entries ignoring ASCII case.
///
/// # Errors
///
/// Returns [`ClosureError::UnsupportedRelativeReference`] for loader-relative
/// declarations and [`ClosureError::DependencyNotFound`] when nothing exists.
pub fn resolve<'a, I>(declaration: &str, declared_by: &Path, search_paths: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    if is_loader_relative(declaration) {
        return Err(ClosureError::UnsupportedRelativeReference {
            declaration: declaration.to_string(),
            declared_by: declared_by.to_path_buf(),
        });
    }

    let not_found = || ClosureError::DependencyNotFound {
        declaration: declaration.to_string(),
        declared_by: declared_by.to_path_buf(),
    };

    let as_path = Path::new(declaration);
    if as_path.is_absolute() {
        // Declared paths go stale when a library is relocated or removed.
        return if as_path.is_file() {
            Ok(as_path.to_path_buf())
        } else {
            Err(not_found())
        };
    }

    let lowered = declaration.to_lowercase();
    let fallback = (lowered != declaration).then_some(lowered.as_str());

    for dir in search_paths {
        for name in std::iter::once(declaration).chain(fallback) {
            let candidate = dir.join(name);
            trace!(candidate = %candidate.display(), "probing");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        if let Some(found) = scan_ignoring_case(dir, declaration) {
            return Ok(found);
        }
    }

    Err(not_found())
}

/// Find a file in `dir` whose name equals `name` up to ASCII case. The
/// smallest matching name wins so the outcome does not depend on directory
/// order.
fn scan_ignoring_case(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.contains(['/', '\\']) {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .filter(|entry| entry.file_name().eq_ignore_ascii_case(name))
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_first_directory_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        touch(&a.join("libfoo.so"));
        touch(&b.join("libfoo.so"));

        let resolved = resolve("libfoo.so", Path::new("/bin/app"), [b.as_path(), a.as_path()]).unwrap();
        assert_eq!(resolved, b.join("libfoo.so"));
    }

    #[test]
    fn test_lowercase_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("qt5core.dll"));

        let resolved = resolve("Qt5Core.dll", Path::new("app.exe"), [tmp.path()]).unwrap();
        assert_eq!(resolved, tmp.path().join("qt5core.dll"));
    }

    #[test]
    fn test_case_insensitive_scan() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("Qt5Core.dll"));

        let resolved = resolve("qt5core.dll", Path::new("app.exe"), [tmp.path()]).unwrap();
        assert!(resolved.is_file());
        assert!(
            resolved
                .file_name()
                .unwrap()
                .eq_ignore_ascii_case("Qt5Core.dll")
        );
    }

    #[test]
    fn test_directory_is_not_a_match() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir_all(a.join("libfoo.so")).unwrap();
        touch(&b.join("libfoo.so"));

        let resolved = resolve("libfoo.so", Path::new("/bin/app"), [a.as_path(), b.as_path()]).unwrap();
        assert_eq!(resolved, b.join("libfoo.so"));

        let dir = a.join("libfoo.so").to_string_lossy().into_owned();
        let err = resolve(&dir, Path::new("/bin/app"), Vec::<&Path>::new()).unwrap_err();
        assert!(matches!(err, ClosureError::DependencyNotFound { .. }));
    }

    #[test]
    fn test_absolute_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let lib = tmp.path().join("libz.1.dylib");
        touch(&lib);

        let decl = lib.to_string_lossy().into_owned();
        assert_eq!(resolve(&decl, Path::new("x"), Vec::<&Path>::new()).unwrap(), lib);

        fs::remove_file(&lib).unwrap();
        let err = resolve(&decl, Path::new("x"), Vec::<&Path>::new()).unwrap_err();
        assert!(matches!(err, ClosureError::DependencyNotFound { .. }));
    }

    #[test]
    fn test_missing_names_declaration_and_declarer() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve("libnope.so", Path::new("/opt/app/bin/app"), [tmp.path()]).unwrap_err();
        match err {
            ClosureError::DependencyNotFound {
                declaration,
                declared_by,
            } => {
                assert_eq!(declaration, "libnope.so");
                assert_eq!(declared_by, PathBuf::from("/opt/app/bin/app"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_loader_relative_is_never_guessed() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("libfoo.dylib"));

        for decl in [
            "@rpath/libfoo.dylib",
            "@loader_path/libfoo.dylib",
            "@executable_path/../lib/libfoo.dylib",
            "$ORIGIN/libfoo.dylib",
        ] {
            let err = resolve(decl, Path::new("x"), [tmp.path()]).unwrap_err();
            assert!(
                matches!(err, ClosureError::UnsupportedRelativeReference { .. }),
                "{decl}"
            );
        }
    }
}
