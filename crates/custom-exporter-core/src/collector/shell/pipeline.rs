//! Process spawning for one pipeline stage.
//!
//! Stages are separate processes chained by the exporter, not by a shell.
//! The previous stage's captured stdout is written to stdin from a helper
//! thread while stdout and stderr are drained on two more.
//!
//! On Unix every stage leads its own process group. A stage past its deadline
//! is killed together with anything it started, so the drain threads see
//! their pipes close and finish.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, bounded};
use tracing::debug;

use super::principal::Principal;
use crate::collector::traits::FileSystem;

/// Polling period while waiting for a child under a deadline.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a killed stage's pipe threads are waited for.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// One process to run.
pub(crate) struct Stage<'a> {
    pub program: &'a Path,
    pub args: &'a [&'a str],
    pub env: &'a [(String, String)],
    pub principal: Option<&'a Principal>,
    /// `None` connects stdin to the null device.
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// How a stage ended.
pub(crate) enum StageOutcome {
    Exited {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut,
}

/// Looks `name` up the way a shell would.
///
/// Names containing a `/` are taken as paths; bare names are searched in
/// every directory of `search_path`.
pub(crate) fn resolve_executable(
    fs: &dyn FileSystem,
    name: &str,
    search_path: Option<&OsString>,
) -> Option<PathBuf> {
    if name.contains('/') {
        let path = PathBuf::from(name);
        return fs.is_executable(&path).then_some(path);
    }
    let search_path = search_path?;
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| fs.is_executable(candidate))
}

/// Spawns one stage and waits for it, honoring the optional deadline.
pub(crate) fn run_stage(stage: Stage<'_>) -> io::Result<StageOutcome> {
    let mut cmd = Command::new(stage.program);
    cmd.args(stage.args)
        .envs(stage.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if stage.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
        if let Some(principal) = stage.principal {
            cmd.uid(principal.uid).gid(principal.gid);
        }
    }

    let mut child = cmd.spawn()?;

    let writer = match (child.stdin.take(), stage.stdin) {
        (Some(mut pipe), Some(input)) => Some(thread::spawn(move || {
            // A stage may exit without reading its input; EPIPE is not an error here.
            let _ = pipe.write_all(&input);
        })),
        _ => None,
    };
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match stage.timeout {
        None => Some(child.wait()?),
        Some(limit) => wait_until(&mut child, limit)?,
    };

    let Some(status) = status else {
        kill_stage(&mut child);
        let _ = child.wait();
        for (name, pipe) in [("stdout", stdout), ("stderr", stderr)] {
            if let Some(rx) = pipe
                && rx.recv_timeout(KILL_GRACE).is_err()
            {
                debug!(program = %stage.program.display(), pipe = name, "pipe still open after kill, detaching reader");
            }
        }
        drop(writer);
        return Ok(StageOutcome::TimedOut);
    };

    if let Some(writer) = writer {
        let _ = writer.join();
    }
    let collect = |pipe: Option<Receiver<Vec<u8>>>| {
        pipe.and_then(|rx| rx.recv().ok()).unwrap_or_default()
    };

    Ok(StageOutcome::Exited {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

/// Kills the stage's whole process group, falling back to the child alone.
#[cfg(unix)]
fn kill_stage(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
        // created by `process_group(0)`, whose id equals the child's pid.
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
            return;
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_stage(child: &mut Child) {
    let _ = child.kill();
}

/// Reads `pipe` to its end on a helper thread. The buffer arrives on the
/// returned channel once every writer has closed the pipe.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Waits for `child` until `limit` elapses. `Ok(None)` means the deadline passed.
fn wait_until(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= limit {
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}
