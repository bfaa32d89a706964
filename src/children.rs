//! Child process registry and the background reaper.
//!
//! The registry is shared between the RPC thread and the reaper. The
//! reaper only records exit statuses and collects detached processes;
//! records are removed only from the RPC side, so a wait that times out
//! can always be retried.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use testagent_protocol::rpc::run_flags;

/// How often the reaper polls, and the slice length used by waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Failure starting a child process.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("unable to open '{path}' for {stream}: {source}")]
    Redirect {
        path: String,
        stream: &'static str,
        source: io::Error,
    },
    #[error("unable to run '{program}': {source}")]
    Spawn { program: String, source: io::Error },
}

/// Outcome of a non-blocking collection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    /// The handle was never tracked, or was already collected.
    NoSuchChild,
    /// Still running; the record stays for a later retry.
    Running,
    /// Exited with this platform-native status; the record is gone.
    Reaped(u32),
}

struct TrackedChild {
    child: Child,
    /// Filled in by the reaper once the process has exited.
    status: Option<u32>,
}

struct Inner {
    tracked: HashMap<u64, TrackedChild>,
    /// Processes nobody will wait for: fire-and-forget launches and
    /// records dropped while still running. Reaped opportunistically to
    /// keep them from lingering as zombies.
    detached: Vec<Child>,
}

/// Registry of children started by the run operation.
#[derive(Clone)]
pub struct ChildRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tracked: HashMap::new(),
                detached: Vec::new(),
            })),
        }
    }

    /// Starts `argv` with the requested redirects and returns its handle.
    /// Redirect files are opened before the spawn; any open failure aborts
    /// the whole operation. The parent keeps no file descriptors open.
    pub fn start(
        &self,
        argv: &[String],
        flags: u32,
        stdin: &str,
        stdout: &str,
        stderr: &str,
    ) -> Result<u64, SpawnError> {
        debug_assert!(!argv.is_empty(), "argv must carry the program name");
        let stdin_file = open_input(stdin)?;
        let stdout_file = open_output(stdout, "stdout", flags & run_flags::RUN_DNTRUNC_OUT == 0)?;
        let stderr_file = open_output(stderr, "stderr", flags & run_flags::RUN_DNTRUNC_ERR == 0)?;

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        if let Some(file) = stdin_file {
            command.stdin(Stdio::from(file));
        }
        if let Some(file) = stdout_file {
            command.stdout(Stdio::from(file));
        }
        if let Some(file) = stderr_file {
            command.stderr(Stdio::from(file));
        }

        let child = command.spawn().map_err(|source| SpawnError::Spawn {
            program: argv[0].clone(),
            source,
        })?;
        let handle = u64::from(child.id());
        debug!(handle, program = %argv[0], "child started");

        let mut inner = self.lock();
        if flags & run_flags::RUN_DNT != 0 {
            inner.detached.push(child);
        } else {
            inner.tracked.insert(
                handle,
                TrackedChild {
                    child,
                    status: None,
                },
            );
        }
        Ok(handle)
    }

    /// Collects `handle` if its exit status has been recorded. Never
    /// blocks, never removes a record that is still running.
    pub fn try_collect(&self, handle: u64) -> Collect {
        let mut inner = self.lock();
        let status = match inner.tracked.get(&handle) {
            None => return Collect::NoSuchChild,
            Some(record) => record.status,
        };
        match status {
            Some(status) => {
                inner.tracked.remove(&handle);
                Collect::Reaped(status)
            }
            None => Collect::Running,
        }
    }

    /// Forgets a tracked handle without inspecting its exit status. A
    /// child still running moves to the detached list so it is reaped
    /// eventually.
    pub fn remove(&self, handle: u64) -> bool {
        let mut inner = self.lock();
        match inner.tracked.remove(&handle) {
            None => false,
            Some(record) => {
                if record.status.is_none() {
                    inner.detached.push(record.child);
                }
                true
            }
        }
    }

    pub fn is_tracked(&self, handle: u64) -> bool {
        self.lock().tracked.contains_key(&handle)
    }

    /// Starts the background reaper. It holds only a weak handle, so it
    /// winds down once the registry is gone.
    pub fn start_reaper(&self) -> thread::JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        thread::Builder::new()
            .name("reaper".into())
            .spawn(move || reaper_loop(weak))
            .expect("unable to start the reaper thread")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("child registry poisoned")
    }
}

impl Default for ChildRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn reaper_loop(weak: Weak<Mutex<Inner>>) {
    loop {
        thread::sleep(POLL_INTERVAL);
        let Some(inner) = weak.upgrade() else { break };
        let mut inner = inner.lock().expect("child registry poisoned");
        for (handle, record) in inner.tracked.iter_mut() {
            if record.status.is_some() {
                continue;
            }
            match record.child.try_wait() {
                Ok(Some(status)) => {
                    let status = encode_exit_status(status);
                    debug!(handle = *handle, status, "child exited");
                    record.status = Some(status);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(handle = *handle, error = %err, "unable to poll child");
                }
            }
        }
        inner
            .detached
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

/// Platform-native encoding of an exit status: on Unix the raw wait()
/// status word. Interpretation is left to the caller.
#[cfg(unix)]
fn encode_exit_status(status: std::process::ExitStatus) -> u32 {
    use std::os::unix::process::ExitStatusExt;
    status.into_raw() as u32
}

#[cfg(not(unix))]
fn encode_exit_status(status: std::process::ExitStatus) -> u32 {
    status.code().unwrap_or(-1) as u32
}

fn open_input(path: &str) -> Result<Option<File>, SpawnError> {
    if path.is_empty() {
        return Ok(None);
    }
    File::open(path)
        .map(Some)
        .map_err(|source| SpawnError::Redirect {
            path: path.to_owned(),
            stream: "stdin",
            source,
        })
}

/// Opens an output redirect for writing in append mode, creating it if
/// needed and truncating it first unless told not to. Append mode keeps
/// interleaved stdout/stderr writes from clobbering each other when both
/// point at the same file.
#[cfg(unix)]
fn open_output(
    path: &str,
    stream: &'static str,
    truncate: bool,
) -> Result<Option<File>, SpawnError> {
    use std::os::unix::fs::OpenOptionsExt;

    if path.is_empty() {
        return Ok(None);
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(truncate)
        .mode(0o666)
        .custom_flags(libc::O_APPEND)
        .open(path)
        .map(Some)
        .map_err(|source| SpawnError::Redirect {
            path: path.to_owned(),
            stream,
            source,
        })
}

#[cfg(not(unix))]
fn open_output(
    path: &str,
    stream: &'static str,
    truncate: bool,
) -> Result<Option<File>, SpawnError> {
    if path.is_empty() {
        return Ok(None);
    }
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options
        .open(path)
        .map(Some)
        .map_err(|source| SpawnError::Redirect {
            path: path.to_owned(),
            stream,
            source,
        })
}
