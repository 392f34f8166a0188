use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::{HarnessError, HarnessResult};

/// Argument that introduces the script path on the host command line.
pub const SCRIPT_ARG: &str = "--runpython";
/// Argument that introduces the script's own arguments.
pub const SCRIPT_ARGS_ARG: &str = "--runpythonargs";

/// Origin stream for captured log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    File,
}

/// Single captured log line with its source.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub stream: LogStream,
    pub line: String,
}

/// Handle to a running host editor executing one test script.
pub struct HostProcess {
    child: Child,
    log_buffer: Arc<Mutex<Vec<LogLine>>>,
    log_collector: Option<thread::JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl HostProcess {
    /// Spawn the host with `script` and its arguments, capturing stdout and stderr.
    ///
    /// Unless the config points at a log file, this waits for the host's first
    /// output line so launch failures surface before the run timeout starts.
    pub fn launch(config: &HostConfig, script: &Path, script_args: &[String]) -> HarnessResult<Self> {
        let mut args = config.extra_args.clone();
        args.push(SCRIPT_ARG.to_string());
        args.push(script.display().to_string());
        if !script_args.is_empty() {
            args.push(SCRIPT_ARGS_ARG.to_string());
            args.extend(script_args.iter().cloned());
        }

        let mut cmd = Command::new(&config.binary_path);
        cmd.args(&args);
        if let Some(dir) = &config.working_directory {
            cmd.current_dir(dir);
        }
        cmd.envs(&config.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        info!(binary = %config.binary_path.display(), ?args, "launching host");
        let mut child = cmd
            .spawn()
            .map_err(|err| HarnessError::host_start(format!("{}: {err}", config.binary_path.display())))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::host_start("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::host_start("failed to capture stderr"))?;

        let (log_tx, log_rx) = mpsc::channel();
        spawn_log_reader(stdout, LogStream::Stdout, log_tx.clone());
        spawn_log_reader(stderr, LogStream::Stderr, log_tx);

        let log_buffer = Arc::new(Mutex::new(Vec::new()));
        if config.log_file.is_none() {
            if let Err(err) =
                wait_for_first_line(&mut child, &log_rx, &log_buffer, config.startup_timeout)
            {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        }
        let log_collector = spawn_log_collector(log_rx, log_buffer.clone());

        Ok(Self {
            child,
            log_buffer,
            log_collector: Some(log_collector),
            exit_status: None,
        })
    }

    /// OS process id of the host.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Whether the host is still running.
    pub fn is_running(&mut self) -> HarnessResult<bool> {
        if self.exit_status.is_some() {
            return Ok(false);
        }
        Ok(self.child.try_wait()?.is_none())
    }

    /// Block until the host exits. A host still running at `timeout` is killed.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> HarnessResult<ExitStatus> {
        match self.wait_or_kill(timeout)? {
            Some(status) => Ok(status),
            None => Err(HarnessError::HostTimeout(timeout)),
        }
    }

    /// Like [`HostProcess::wait_for_exit`], but a host killed at `timeout`
    /// yields `None` and keeps everything it logged up to that point.
    pub fn wait_or_kill(&mut self, timeout: Duration) -> HarnessResult<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }

        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(status) = self.child.try_wait()? {
                debug!(pid = self.child.id(), %status, "host exited");
                self.exit_status = Some(status);
                self.join_collector();
                return Ok(Some(status));
            }
            thread::sleep(Duration::from_millis(10));
        }

        warn!(pid = self.child.id(), ?timeout, "host did not exit in time, killing it");
        self.kill();
        Ok(None)
    }

    /// Terminate the host if it is still running and finish collecting its output.
    pub fn kill(&mut self) {
        if self.exit_status.is_none() {
            let _ = self.child.kill();
            if let Ok(status) = self.child.wait() {
                self.exit_status = Some(status);
            }
        }
        self.join_collector();
    }

    /// All captured log lines, in arrival order.
    pub fn logs(&self) -> Vec<LogLine> {
        self.log_buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }

    /// Captured line texts only.
    pub fn lines(&self) -> Vec<String> {
        self.logs().into_iter().map(|line| line.line).collect()
    }

    fn join_collector(&mut self) {
        if let Some(handle) = self.log_collector.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_log_reader<R: std::io::Read + Send + 'static>(
    reader: R,
    stream: LogStream,
    tx: mpsc::Sender<LogLine>,
) {
    thread::spawn(move || {
        let buf_reader = BufReader::new(reader);
        for line in buf_reader.lines().map_while(Result::ok) {
            let _ = tx.send(LogLine {
                stream,
                line: line.trim_end().to_string(),
            });
        }
    });
}

fn wait_for_first_line(
    child: &mut Child,
    log_rx: &mpsc::Receiver<LogLine>,
    log_buffer: &Arc<Mutex<Vec<LogLine>>>,
    timeout: Duration,
) -> HarnessResult<()> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match log_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(line) => {
                if let Ok(mut buffer) = log_buffer.lock() {
                    buffer.push(line);
                }
                return Ok(());
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Some(status) = child.try_wait()? {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(HarnessError::HostExited(status));
                }
            }
            // Both pipes closed without output; exit status decides the rest.
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }

    Err(HarnessError::HostTimeout(timeout))
}

fn spawn_log_collector(
    log_rx: mpsc::Receiver<LogLine>,
    buffer: Arc<Mutex<Vec<LogLine>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(line) = log_rx.recv() {
            if let Ok(mut guard) = buffer.lock() {
                guard.push(line);
            }
        }
    })
}
