use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

/// One live `bin/cold solve …` subprocess, one per in-flight combination.
///
/// Its only interaction channels are a non-blocking read of stdout and its
/// exit status (spec.md §5): there is no IPC beyond that, and EOF on the
/// pipe is not a termination signal — only the exit status is.
pub struct RunningProcess {
    pub combination: u64,
    pub programs_completed: u64,
    child: Child,
    stdout: ChildStdout,
    partial_line: String,
}

/// Makes `fd` non-blocking via `fcntl`, matching the source's
/// `fcntl.F_SETFL | os.O_NONBLOCK` exactly rather than reaching for an
/// async runtime in what spec.md §5 explicitly describes as a
/// cancellation-free synchronous loop.
fn set_nonblocking(fd: i32) -> io::Result<()> {
    // SAFETY: `fd` is a valid, open file descriptor owned by this process
    // for the lifetime of this call (the child's stdout pipe).
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

impl RunningProcess {
    /// Launch `bin/cold solve <solver_file> --combination=<i> …` and set its
    /// stdout to non-blocking.
    pub fn spawn(
        solver_bin: &Path,
        solver_file: &Path,
        combination: u64,
        working_dir: &Path,
    ) -> io::Result<Self> {
        let mut child = Command::new(solver_bin)
            .arg("solve")
            .arg(solver_file)
            .arg(format!("--combination={combination}"))
            .arg("--combination-count=1")
            .arg("--non-interactive")
            .arg("--all")
            .arg(format!("--output-dir={}", working_dir.display()))
            .arg("--hide-solutions")
            .stdout(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("spawned with Stdio::piped()");
        set_nonblocking(stdout.as_raw_fd())?;

        Ok(RunningProcess {
            combination,
            programs_completed: 0,
            child,
            stdout,
            partial_line: String::new(),
        })
    }

    /// Drain whatever is currently available on stdout without blocking,
    /// updating `programs_completed` from any `total: <n>, …` lines.
    pub fn drain_stdout(&mut self) {
        let mut buf = [0u8; 4096];
        loop {
            match self.stdout.read(&mut buf) {
                Ok(0) => {
                    self.flush_partial_line();
                    break;
                }
                Ok(n) => {
                    self.partial_line
                        .push_str(&String::from_utf8_lossy(&buf[..n]));
                    self.consume_complete_lines();
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    fn consume_complete_lines(&mut self) {
        while let Some(idx) = self.partial_line.find('\n') {
            let line = self.partial_line[..idx].trim().to_string();
            self.partial_line.drain(..=idx);
            self.apply_progress_line(&line);
        }
    }

    /// `read()` returning `0` means EOF: the pipe won't yield a trailing
    /// newline, but `worker.py`'s `readline()` still returns whatever is
    /// left unterminated. Apply it as a final line so a `total:` line
    /// flushed right before exit isn't silently dropped.
    fn flush_partial_line(&mut self) {
        if self.partial_line.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.partial_line);
        self.apply_progress_line(line.trim());
    }

    fn apply_progress_line(&mut self, line: &str) {
        if let Some(rest) = line.strip_prefix("total: ") {
            let number = rest.split(',').next().unwrap_or("").trim();
            if let Ok(n) = number.parse::<u64>() {
                self.programs_completed = n;
            }
        }
    }

    /// Non-blocking poll of exit status; `Ok(Some(_))` once the child has
    /// exited. Exit code is not distinguished from success — the solver's
    /// contract is "completes the combination or exits" (spec.md §7).
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    pub fn kill_and_wait(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
