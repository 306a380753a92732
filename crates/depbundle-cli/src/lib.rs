//! depbundle - collect the shared libraries a binary needs
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Computes the transitive set of non-system shared libraries and
//! frameworks an executable loads, and optionally copies them into a
//! directory for redistribution.
//!
//! # Configuration precedence
//!
//! ```text
//! command-line flags  >  --config / depbundle.toml  >  platform defaults
//! ```

pub mod cmd;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use depbundle_core::config::CONFIG_FILE_NAME;
use depbundle_core::{BinaryFormat, BundleConfig, ConfigFile, Traversal};

#[derive(Debug, Parser)]
#[command(name = "depbundle")]
#[command(author, version, about = "depbundle - collect the shared libraries a binary needs")]
pub struct Cli {
    #[command(flatten)]
    pub search: SearchArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print every library the binary needs, one absolute path per line
    List {
        /// Executable or shared library to inspect
        binary: PathBuf,
    },
    /// Copy every library the binary needs into a directory
    Bundle {
        /// Executable or shared library to inspect
        binary: PathBuf,
        /// Destination directory
        #[arg(short, long)]
        output: PathBuf,
        /// Compress copied libraries with upx
        #[arg(long)]
        compress: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Search-path and classification options shared by every subcommand.
#[derive(Debug, Args, Default)]
pub struct SearchArgs {
    /// Directory searched for bundleable libraries (repeatable, searched first)
    #[arg(short = 'L', long = "local-path", global = true)]
    pub local_paths: Vec<PathBuf>,

    /// Prefix holding system libraries that are never bundled (repeatable)
    #[arg(short = 'S', long = "system-path", global = true)]
    pub system_paths: Vec<PathBuf>,

    /// Library name always treated as system-provided (repeatable)
    #[arg(short = 'b', long = "blacklist", global = true)]
    pub blacklist: Vec<String>,

    /// Config file (defaults to ./depbundle.toml when present)
    #[arg(long, env = "DEPBUNDLE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Seconds allowed per introspection tool run
    #[arg(long, env = "DEPBUNDLE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Frontier discipline
    #[arg(long, value_enum, global = true)]
    pub traversal: Option<TraversalArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TraversalArg {
    DepthFirst,
    BreadthFirst,
    Parallel,
}

impl From<TraversalArg> for Traversal {
    fn from(arg: TraversalArg) -> Self {
        match arg {
            TraversalArg::DepthFirst => Self::DepthFirst,
            TraversalArg::BreadthFirst => Self::BreadthFirst,
            TraversalArg::Parallel => Self::Parallel,
        }
    }
}

impl SearchArgs {
    /// Build the configuration for one root binary.
    ///
    /// Platform defaults come from the binary's format, so a Windows
    /// executable inspected on Linux still gets the Windows blacklist.
    pub fn build_config(&self, binary: &Path) -> Result<BundleConfig> {
        let format = BinaryFormat::detect(binary)?;
        let mut config = BundleConfig::for_platform(format.platform());

        if let Some(file) = self.config_file()? {
            config = config.merge(file);
        }

        let cli = ConfigFile {
            local_paths: self.local_paths.clone(),
            system_paths: self.system_paths.clone(),
            blacklist: None,
            extra_blacklist: self.blacklist.clone(),
            traversal: self.traversal.map(Traversal::from),
            timeout_secs: self.timeout,
        };
        config = config.merge(cli);

        if config.introspect_timeout == Duration::ZERO {
            anyhow::bail!("--timeout must be greater than zero");
        }

        Ok(config.absolutize()?)
    }

    fn config_file(&self) -> Result<Option<ConfigFile>> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => {
                let default = PathBuf::from(CONFIG_FILE_NAME);
                if !default.exists() {
                    return Ok(None);
                }
                default
            }
        };
        let file = ConfigFile::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(Some(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn elf(dir: &Path) -> PathBuf {
        let path = dir.join("app");
        fs::write(&path, b"\x7fELF\x02\x01\x01\x00").unwrap();
        path
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("depbundle.toml");
        fs::write(
            &config_path,
            "local_paths = [\"/opt/from-file\"]\ntraversal = \"breadth-first\"\n",
        )
        .unwrap();

        let args = SearchArgs {
            local_paths: vec![PathBuf::from("/opt/from-cli")],
            blacklist: vec!["libGL.so.1".into()],
            config: Some(config_path),
            traversal: Some(TraversalArg::Parallel),
            ..SearchArgs::default()
        };

        let config = args.build_config(&elf(tmp.path())).unwrap();
        assert_eq!(
            config.local_paths,
            vec![PathBuf::from("/opt/from-cli"), PathBuf::from("/opt/from-file")]
        );
        assert_eq!(config.traversal, Traversal::Parallel);
        assert!(config.blacklist.contains("libgl.so.1"));
        assert!(config.blacklist.contains("libc.so.6"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let args = SearchArgs {
            timeout: Some(0),
            ..SearchArgs::default()
        };
        assert!(args.build_config(&elf(tmp.path())).is_err());
    }

    #[test]
    fn test_cli_parses_repeated_paths() {
        let cli = Cli::try_parse_from([
            "depbundle",
            "list",
            "app",
            "-L",
            "/a",
            "-L",
            "/b",
            "--traversal",
            "breadth-first",
        ])
        .unwrap();
        assert_eq!(cli.search.local_paths.len(), 2);
        assert!(matches!(cli.search.traversal, Some(TraversalArg::BreadthFirst)));
    }
}
