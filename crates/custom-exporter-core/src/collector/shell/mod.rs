//! Shell backend: runs an ordered chain of local processes.
//!
//! Each command line is tokenized on whitespace (no shell quoting). The first
//! command reads from the null device, every following one reads the previous
//! command's stdout, and only the final stdout is returned for mapping.

mod pipeline;
pub mod principal;

use std::ffi::OsString;
use std::io;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

use crate::collector::traits::{FileSystem, RealFs};
use crate::config::{ConfigError, validate_probe};
use crate::probe::ProbeSpec;

use pipeline::{Stage, StageOutcome, resolve_executable, run_stage};
pub use principal::{Principal, parse_passwd, resolve_principal};

/// Failure of one command in the chain. `index` is 1-based.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("command #{index} `{command}`: executable '{executable}' not found")]
    NotFound {
        index: usize,
        command: String,
        executable: String,
    },

    #[error("command #{index} `{command}` could not be started: {source}")]
    Spawn {
        index: usize,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("command #{index} `{command}` exited with {status}: {stderr}")]
    Failed {
        index: usize,
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("command #{index} `{command}` timed out after {timeout:?}")]
    TimedOut {
        index: usize,
        command: String,
        timeout: Duration,
    },
}

impl ShellError {
    /// Position of the failing command, starting at 1.
    pub fn index(&self) -> usize {
        match self {
            Self::NotFound { index, .. }
            | Self::Spawn { index, .. }
            | Self::Failed { index, .. }
            | Self::TimedOut { index, .. } => *index,
        }
    }
}

/// Runs a probe's commands as a process chain.
pub struct ShellBackend {
    fs: Box<dyn FileSystem>,
    principal: Option<Principal>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ShellBackend {
    /// Builds the backend against the real filesystem.
    pub fn new(spec: &ProbeSpec) -> Result<Self, ConfigError> {
        Self::with_fs(spec, RealFs::new())
    }

    /// Builds the backend with a custom filesystem for executable and user lookups.
    pub fn with_fs(spec: &ProbeSpec, fs: impl FileSystem + 'static) -> Result<Self, ConfigError> {
        validate_probe(spec)?;

        let principal = match spec.credential.user.as_deref() {
            Some(user) => Some(resolve_principal(&fs, user).ok_or_else(|| {
                ConfigError::UnknownPrincipal {
                    probe: spec.name.clone(),
                    user: user.to_string(),
                }
            })?),
            None => None,
        };
        if let Some(ref p) = principal {
            debug!(probe = %spec.name, user = %p.name, uid = p.uid, gid = p.gid, "commands will run as");
        }

        let credential = &spec.credential;
        let env = vec![
            ("CREDENTIALS_NAME".to_string(), credential.name.clone()),
            ("CREDENTIALS_COLLECTOR".to_string(), credential.tag.clone()),
            ("CREDENTIALS_DSN".to_string(), credential.dsn.clone()),
            ("CREDENTIALS_PATH".to_string(), credential.path.clone()),
            ("CREDENTIALS_URI".to_string(), credential.uri.clone()),
        ];

        Ok(Self {
            fs: Box::new(fs),
            principal,
            env,
            timeout: spec.timeout,
        })
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Runs every command in order and returns the last command's stdout.
    pub fn execute(&self, spec: &ProbeSpec) -> Result<String, ShellError> {
        let search_path: Option<OsString> = std::env::var_os("PATH");
        let deadline = self.timeout.map(|t| (t, Instant::now() + t));
        let mut input: Option<Vec<u8>> = None;

        for (i, line) in spec.commands.iter().enumerate() {
            let index = i + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some((&program, args)) = tokens.split_first() else {
                continue;
            };

            let resolved = resolve_executable(self.fs.as_ref(), program, search_path.as_ref())
                .ok_or_else(|| ShellError::NotFound {
                    index,
                    command: line.clone(),
                    executable: program.to_string(),
                })?;

            let remaining = match deadline {
                Some((limit, at)) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(ShellError::TimedOut {
                            index,
                            command: line.clone(),
                            timeout: limit,
                        });
                    }
                    Some(left)
                }
                None => None,
            };

            debug!(probe = %spec.name, index, program = %resolved.display(), "running command");
            let outcome = run_stage(Stage {
                program: &resolved,
                args,
                env: &self.env,
                principal: self.principal.as_ref(),
                stdin: input.take(),
                timeout: remaining,
            })
            .map_err(|source| ShellError::Spawn {
                index,
                command: line.clone(),
                source,
            })?;

            match outcome {
                StageOutcome::TimedOut => {
                    return Err(ShellError::TimedOut {
                        index,
                        command: line.clone(),
                        timeout: self.timeout.unwrap_or_default(),
                    });
                }
                StageOutcome::Exited {
                    status,
                    stdout,
                    stderr,
                } => {
                    if !status.success() {
                        return Err(ShellError::Failed {
                            index,
                            command: line.clone(),
                            status,
                            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
                        });
                    }
                    trace!(probe = %spec.name, index, bytes = stdout.len(), "command finished");
                    input = Some(stdout);
                }
            }
        }

        Ok(input
            .map(|out| String::from_utf8_lossy(&out).into_owned())
            .unwrap_or_default())
    }
}
