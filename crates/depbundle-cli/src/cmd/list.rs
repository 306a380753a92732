use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use depbundle_core::{Closure, compute_closure};

use crate::SearchArgs;

/// Print the closure of `binary`, one absolute path per line.
pub fn list(binary: &Path, search: &SearchArgs) -> Result<()> {
    let config = search.build_config(binary)?;
    let closure = compute_closure(binary, &config)?;
    write_closure(&closure, &mut std::io::stdout().lock())
}

/// Write each node on its own line, in sorted order.
pub fn write_closure(closure: &Closure, out: &mut impl Write) -> Result<()> {
    for node in closure {
        writeln!(out, "{node}").context("Failed to write closure")?;
    }
    out.flush().context("Failed to write closure")
}
