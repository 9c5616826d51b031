//! External tool invocation with captured output and a bounded run time
//!
//! Stdout and stderr are drained on helper threads so a chatty tool cannot
//! block on a full pipe while the parent waits. The parent polls for exit
//! and kills the child once the deadline passes. On unix the child leads its
//! own process group, and the whole group is killed so that grandchildren
//! holding the output pipes die with it.

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long captured output may keep arriving once the child is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A fully-described invocation of an external tool
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    /// Indices into `args` that are masked in logs
    secret_args: Vec<usize>,
    current_dir: Option<PathBuf>,
    timeout: Duration,
}

/// Captured result of a finished (or killed) tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code, `None` when terminated by a signal or killed on timeout
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    /// Stderr, or a timeout note when the tool was killed
    pub fn diagnostics(&self, timeout: Duration) -> String {
        if self.timed_out {
            format!(
                "timed out after {}s and was killed{}{}",
                timeout.as_secs_f32(),
                if self.stderr.trim().is_empty() { "" } else { "; stderr: " },
                self.stderr.trim()
            )
        } else {
            self.stderr.clone()
        }
    }
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret_args: Vec::new(),
            current_dir: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Argument that must never appear in logs
    pub fn secret_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Arguments as strings, secrets included
    pub fn argv(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Printable command line with secrets masked
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for (index, arg) in self.args.iter().enumerate() {
            line.push(' ');
            if self.secret_args.contains(&index) {
                line.push_str("***");
            } else {
                line.push_str(&arg.to_string_lossy());
            }
        }
        line
    }

    /// Run to completion or until the timeout elapses
    ///
    /// Only failures to start or wait on the process are errors; a non-zero
    /// exit is reported through [`ToolOutput`].
    pub fn run(&self) -> std::io::Result<ToolOutput> {
        tracing::debug!(command = %self.display(), "running external tool");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let (status, timed_out) = wait_with_deadline(&mut child, deadline)?;

        let grace = if timed_out {
            DRAIN_GRACE
        } else {
            deadline.saturating_duration_since(Instant::now()).max(DRAIN_GRACE)
        };
        let stdout = collect(stdout, grace, &mut child);
        let stderr = collect(stderr, DRAIN_GRACE, &mut child);
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        let exit_code = if timed_out { None } else { status.code() };
        let success = !timed_out && status.success();

        tracing::debug!(
            program = %self.program,
            ?exit_code,
            timed_out,
            stdout_bytes = stdout.len(),
            "external tool finished"
        );

        Ok(ToolOutput {
            exit_code,
            success,
            timed_out,
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut reader| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error just truncates the capture; the exit status decides success.
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
        rx
    })
}

/// Output of a drain thread
///
/// A descendant that outlives the tool keeps the pipe open; once `grace`
/// passes the rest of the group is killed and whatever was read is kept.
fn collect(rx: Option<Receiver<Vec<u8>>>, grace: Duration, child: &mut Child) -> Vec<u8> {
    let Some(rx) = rx else {
        return Vec::new();
    };
    match rx.recv_timeout(grace) {
        Ok(buf) => buf,
        Err(_) => {
            tracing::debug!(pid = child.id(), "output pipe held open after exit, killing process group");
            kill_tree(child);
            rx.recv_timeout(DRAIN_GRACE).unwrap_or_default()
        }
    }
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
) -> std::io::Result<(std::process::ExitStatus, bool)> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            kill_tree(child);
            let status = child.wait()?;
            return Ok((status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the child and everything in its process group
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        // The group id equals the child pid because of `process_group(0)`.
        let pgid = Pid::from_raw(child.id() as i32);
        let _ = signal::killpg(pgid, Signal::SIGKILL);
    }
    // The child may exit between the poll and the kill.
    let _ = child.kill();
}
