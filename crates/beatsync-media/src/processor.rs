//! Beat-sync processor command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use beatsync_models::ProcessingParams;

use crate::error::{MediaError, MediaResult};

/// How to launch the external processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Interpreter or executable (e.g. `python3`)
    pub program: String,
    /// Script passed as the first argument, resolved against `working_dir`
    pub script: Option<PathBuf>,
    /// Working directory of the child process
    pub working_dir: PathBuf,
    /// Wall-clock budget per run
    pub timeout: Duration,
    /// Value of `--log-level`
    pub log_level: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: Some(PathBuf::from("main.py")),
            working_dir: PathBuf::from(".."),
            timeout: Duration::from_secs(600),
            log_level: "INFO".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Check that the program resolves and the script exists.
    pub fn verify(&self) -> MediaResult<PathBuf> {
        let program = which::which(&self.program)
            .map_err(|_| MediaError::ProcessorNotFound(self.program.clone()))?;

        if let Some(script) = &self.script {
            let resolved = self.working_dir.join(script);
            if !resolved.is_file() {
                return Err(MediaError::ScriptNotFound(resolved));
            }
        }

        Ok(program)
    }
}

/// Builder for one processor invocation.
#[derive(Debug, Clone)]
pub struct ProcessorCommand {
    program: String,
    script: Option<PathBuf>,
    working_dir: PathBuf,
    input: PathBuf,
    output: PathBuf,
    params: ProcessingParams,
    log_level: String,
}

impl ProcessorCommand {
    /// Create a command for `input` -> `output` with default parameters.
    pub fn new(config: &ProcessorConfig, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            program: config.program.clone(),
            script: config.script.clone(),
            working_dir: config.working_dir.clone(),
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            params: ProcessingParams::default(),
            log_level: config.log_level.clone(),
        }
    }

    /// Set the tuning parameters.
    pub fn params(mut self, params: ProcessingParams) -> Self {
        self.params = params;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(script) = &self.script {
            args.push(script.to_string_lossy().to_string());
        }

        args.push("--input".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.push("--output".to_string());
        args.push(self.output.to_string_lossy().to_string());

        args.extend(self.params.to_args());

        args.push("--log-level".to_string());
        args.push(self.log_level.clone());

        args
    }
}

/// Captured result of a successful run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Verified output file
    pub output: PathBuf,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs processor commands with a hard timeout.
pub struct ProcessorRunner {
    timeout: Duration,
}

impl Default for ProcessorRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorRunner {
    /// Create a runner with the default 600 second budget.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(600),
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the processor once.
    ///
    /// Succeeds only when the child exits zero AND the output file exists.
    pub async fn run(&self, cmd: &ProcessorCommand) -> MediaResult<ProcessOutput> {
        let args = cmd.build_args();
        info!("Running processor: {} {}", cmd.program, args.join(" "));

        let mut command = Command::new(&cmd.program);
        command
            .args(&args)
            .current_dir(&cmd.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be signalled at once.
        #[cfg(unix)]
        command.process_group(0);

        let start = Instant::now();
        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::ProcessorNotFound(cmd.program.clone())
            } else {
                MediaError::Io(e)
            }
        })?;
        let mut guard = ChildGuard::new(child);

        let stdout_task = spawn_reader(guard.child.stdout.take());
        let stderr_task = spawn_reader(guard.child.stderr.take());

        let status = match tokio::time::timeout(self.timeout, guard.wait_and_sweep()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "Processor timed out after {} seconds, killing process group",
                    self.timeout.as_secs()
                );
                guard.kill_tree();
                if let Err(e) = guard.child.wait().await {
                    warn!("Failed to reap timed out processor: {}", e);
                }
                guard.disarm();
                stdout_task.abort();
                stderr_task.abort();
                return Err(MediaError::Timeout(self.timeout.as_secs()));
            }
        };

        guard.disarm();

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;
        let elapsed = start.elapsed();

        if !status.success() {
            warn!(
                exit_code = ?status.code(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Processor failed"
            );
            return Err(MediaError::processor_failed(stderr, status.code()));
        }

        let produced = tokio::fs::metadata(&cmd.output)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !produced {
            return Err(MediaError::MissingOutput(cmd.output.clone()));
        }

        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            "Processor finished: {}",
            cmd.output.display()
        );

        Ok(ProcessOutput {
            output: cmd.output.clone(),
            stdout,
            stderr,
            elapsed,
        })
    }
}

/// Owns a running child and kills its process group unless disarmed.
struct ChildGuard {
    child: Child,
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
    armed: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        let pgid = child.id();
        Self {
            child,
            pgid,
            armed: true,
        }
    }

    fn kill_tree(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pgid) = self.pgid {
                // ESRCH just means the group is already gone.
                let _ = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL);
            }
        }
        let _ = self.child.start_kill();
    }

    /// Wait for the leader to exit, then kill whatever is left of its group.
    ///
    /// Background children left by the processor would otherwise outlive
    /// the request and keep the output pipes open. On Linux the exited
    /// leader is observed without being reaped, so its zombie still holds
    /// the group id while the group is signalled.
    async fn wait_and_sweep(&mut self) -> std::io::Result<ExitStatus> {
        #[cfg_attr(not(target_os = "linux"), allow(unused_mut))]
        let mut swept = false;

        #[cfg(target_os = "linux")]
        {
            if let Some(pid) = self.pgid {
                match tokio::task::spawn_blocking(move || wait_exited(pid)).await {
                    Ok(Ok(())) => {
                        self.kill_tree();
                        swept = true;
                    }
                    Ok(Err(e)) => debug!("waitid on processor failed: {}", e),
                    Err(e) => debug!("waitid task failed: {}", e),
                }
            }
        }

        let status = self.child.wait().await?;

        if !swept {
            // Leader already reaped; its group id could in principle be reused.
            self.kill_tree();
        }

        Ok(status)
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("Processor abandoned before completion, killing process group");
            self.kill_tree();
        }
    }
}

/// Block until `pid` has exited, leaving it for `Child::wait` to reap.
#[cfg(target_os = "linux")]
fn wait_exited(pid: u32) -> nix::Result<()> {
    use nix::errno::Errno;
    use nix::sys::wait::{waitid, Id, WaitPidFlag};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => continue,
            other => return other.map(|_| ()),
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!("Stopped reading processor output: {}", e);
            }
        }
        buf
    })
}

async fn collect(task: JoinHandle<Vec<u8>>) -> String {
    let bytes = task.await.unwrap_or_default();
    String::from_utf8_lossy(&bytes).to_string()
}
