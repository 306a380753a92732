//! Binary format sniffing.
//!
//! Only the first few bytes of a file are read. The format decides which
//! introspection tool is used and which platform defaults apply.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ClosureError, Result};

/// `ar` archive header (`.a` static libraries).
const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

/// Object file format of a dynamically loadable binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryFormat {
    /// Mach-O, thin or universal (macOS).
    MachO,
    /// Portable Executable (Windows).
    Pe,
    /// ELF (Linux and other Unix).
    Elf,
}

/// Target platform, used to pick default search paths and blacklists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
    /// Linux.
    Linux,
}

impl BinaryFormat {
    /// Detect the format of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::NotALoadableBinary`] for static archives and
    /// unrecognized headers, and [`ClosureError::Io`] if the file cannot be
    /// opened.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut f = File::open(path).map_err(|e| ClosureError::io(path, e))?;
        let mut header = [0u8; 8];
        let mut read = 0;
        // Short files are allowed; they simply fail every magic check.
        while read < header.len() {
            match f.read(&mut header[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ClosureError::io(path, e)),
            }
        }

        Self::from_magic(&header[..read]).ok_or_else(|| ClosureError::NotALoadableBinary {
            path: path.to_path_buf(),
            reason: if header[..read] == AR_MAGIC[..] {
                "static archive".to_string()
            } else {
                "unrecognized file format".to_string()
            },
        })
    }

    /// Classify a file header. Returns `None` for archives and unknown data.
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(AR_MAGIC) {
            return None;
        }
        if header.len() >= 4 {
            let magic = [header[0], header[1], header[2], header[3]];
            // feedface, feedfacf, cafebabe (universal) - and their LE/BE variants
            if matches!(
                magic,
                [0xfe, 0xed, 0xfa, 0xce]
                    | [0xfe, 0xed, 0xfa, 0xcf]
                    | [0xcf, 0xfa, 0xed, 0xfe]
                    | [0xce, 0xfa, 0xed, 0xfe]
                    | [0xca, 0xfe, 0xba, 0xbe]
            ) {
                return Some(Self::MachO);
            }
            if magic == [0x7f, b'E', b'L', b'F'] {
                return Some(Self::Elf);
            }
        }
        if header.starts_with(b"MZ") {
            return Some(Self::Pe);
        }
        None
    }

    /// Platform a binary of this format runs on.
    pub fn platform(self) -> Platform {
        match self {
            Self::MachO => Platform::MacOs,
            Self::Pe => Platform::Windows,
            Self::Elf => Platform::Linux,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_magic_detection() {
        assert_eq!(
            BinaryFormat::from_magic(&[0xcf, 0xfa, 0xed, 0xfe, 7, 0, 0, 1]),
            Some(BinaryFormat::MachO)
        );
        assert_eq!(
            BinaryFormat::from_magic(&[0xca, 0xfe, 0xba, 0xbe]),
            Some(BinaryFormat::MachO)
        );
        assert_eq!(
            BinaryFormat::from_magic(b"\x7fELF\x02\x01\x01\x00"),
            Some(BinaryFormat::Elf)
        );
        assert_eq!(BinaryFormat::from_magic(b"MZ\x90\x00"), Some(BinaryFormat::Pe));
        assert_eq!(BinaryFormat::from_magic(b"!<arch>\n"), None);
        assert_eq!(BinaryFormat::from_magic(b"#!/bin/sh"), None);
        assert_eq!(BinaryFormat::from_magic(b""), None);
    }

    #[test]
    fn test_archive_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"!<arch>\n/               0           0     0     0       4         `\n")
            .unwrap();

        let err = BinaryFormat::detect(file.path()).unwrap_err();
        match err {
            ClosureError::NotALoadableBinary { reason, .. } => {
                assert_eq!(reason, "static archive");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_detect_elf_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x7fELF\x02\x01\x01\x00rest").unwrap();
        assert_eq!(BinaryFormat::detect(file.path()).unwrap(), BinaryFormat::Elf);
        assert_eq!(BinaryFormat::Elf.platform(), Platform::Linux);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = BinaryFormat::detect(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ClosureError::Io { .. }));
    }
}
