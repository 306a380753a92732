use std::path::Path;

use anyhow::Result;
use tracing::info;

use depbundle_core::{Bundler, Compressor, compute_closure};

use crate::SearchArgs;

/// Compute the closure of `binary` and copy it into `output`.
pub fn bundle(binary: &Path, output: &Path, compress: bool, search: &SearchArgs) -> Result<()> {
    let config = search.build_config(binary)?;
    let closure = compute_closure(binary, &config)?;

    let mut bundler = Bundler::new(output);
    if compress {
        bundler = bundler.with_compressor(Compressor::new(config.introspect_timeout));
    }

    let report = bundler.bundle(&closure)?;
    info!(
        copied = report.copied.len(),
        compressed = report.compressed,
        "bundle complete"
    );
    println!(
        "Bundled {} libraries into {}",
        report.copied.len(),
        output.display()
    );
    Ok(())
}
