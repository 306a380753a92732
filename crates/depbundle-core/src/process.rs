//! Bounded execution of external tools.
//!
//! `otool`, `objdump` and `upx` are opaque collaborators. They are always run
//! with a deadline; a child that outlives it is killed and reported as
//! [`ClosureError::IntrospectionTimeout`].

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::trace;
use wait_timeout::ChildExt;

use crate::error::{ClosureError, Result};

/// An external executable plus the hint shown when it is missing.
#[derive(Debug, Clone, Copy)]
pub struct Tool {
    /// Executable name looked up on `PATH`.
    pub program: &'static str,
    /// Installation hint for [`ClosureError::ToolUnavailable`].
    pub hint: &'static str,
}

/// Captured result of a finished tool run.
#[derive(Debug)]
pub struct ToolOutput {
    /// Exit status of the child.
    pub status: ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl Tool {
    /// Run the tool with `args` followed by `target`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::ToolUnavailable`] if the executable cannot be
    /// found, [`ClosureError::IntrospectionTimeout`] if the deadline passes,
    /// and [`ClosureError::Io`] for any other spawn or wait failure. A
    /// non-zero exit is not an error here; callers inspect `status`.
    pub fn run(&self, args: &[&str], target: &Path, timeout: Duration) -> Result<ToolOutput> {
        trace!(tool = self.program, ?args, target = %target.display(), "spawning");

        let mut child = match Command::new(self.program)
            .args(args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClosureError::ToolUnavailable {
                    tool: self.program.to_string(),
                    hint: self.hint,
                });
            }
            Err(e) => return Err(ClosureError::io(target, e)),
        };

        // Drain both pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait for it to exit.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child
            .wait_timeout(timeout)
            .map_err(|e| ClosureError::io(target, e))?
        {
            Some(status) => status,
            None => {
                kill(&mut child);
                return Err(ClosureError::IntrospectionTimeout {
                    tool: self.program.to_string(),
                    binary: target.to_path_buf(),
                    timeout,
                });
            }
        };

        Ok(ToolOutput {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const SH: Tool = Tool {
        program: "sh",
        hint: "",
    };

    #[test]
    fn test_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("echo.sh");
        std::fs::write(&script, "echo out; echo err >&2").unwrap();

        let out = SH.run(&[], &script, Duration::from_secs(10)).unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[test]
    fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sleep.sh");
        std::fs::write(&script, "sleep 30").unwrap();

        let err = SH
            .run(&[], &script, Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, ClosureError::IntrospectionTimeout { .. }));
    }

    #[test]
    fn test_missing_tool() {
        let tool = Tool {
            program: "depbundle-no-such-tool",
            hint: "install it",
        };
        let err = tool
            .run(&[], Path::new("/dev/null"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ClosureError::ToolUnavailable { .. }));
    }
}
