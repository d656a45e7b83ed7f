//! External command source.
//!
//! Runs a program that prints a JSON snapshot on stdout, such as an SMC dump
//! tool on macOS.

use super::ReadingSource;
use crate::{Error, Result, Snapshot};
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a running command is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Source backed by an external command.
pub struct CommandSource {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandSource {
    /// Creates a source that runs `program` with `args` on every snapshot.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            name: format!("command:{}", program),
            program,
            args,
            timeout: None,
        }
    }

    /// Kills the command if it has not exited after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn failure(&self, reason: impl Into<String>) -> Error {
        Error::Command {
            program: self.program.clone(),
            reason: reason.into(),
        }
    }

    /// Waits for the child, killing it once the timeout has passed.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= timeout {
                warn!("Killing {} after {:?}", self.program, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.failure(format!("timed out after {:?}", timeout)));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ReadingSource for CommandSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Result<Snapshot> {
        debug!("Running {} {:?}", self.program, self.args);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(e.to_string()))?;

        // Drained while waiting; a full pipe would stall the child.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child)?;
        let stdout = collect(stdout)?;
        let stderr = collect(stderr)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(self.failure(format!("{}: {}", status, stderr.trim())));
        }

        Snapshot::from_slice(&stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let output = reader
        .join()
        .map_err(|_| io::Error::other("command output reader panicked"))??;
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSource {
        CommandSource::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_parses_stdout() {
        let source = sh(r#"echo '{"Fans": {"Fan 0": {"value": "1800 rpm"}}}'"#);
        assert_eq!(source.name(), "command:sh");
        let snapshot = source.snapshot().unwrap();
        assert_eq!(snapshot.readings().count(), 1);
    }

    #[test]
    fn test_non_zero_exit_is_an_error() {
        let err = sh("echo 'no SMC access' >&2; exit 3").snapshot().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("no SMC access"), "{}", message);
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let source = CommandSource::new("/nonexistent/sensor-dump", Vec::new());
        assert!(matches!(source.snapshot(), Err(Error::Command { .. })));
    }

    #[test]
    fn test_hung_command_is_killed_at_timeout() {
        let source = CommandSource::new(
            "sh",
            vec!["-c".to_string(), "exec sleep 5".to_string()],
        )
        .with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let err = source.snapshot().unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(err.to_string().contains("timed out"), "{}", err);
    }

    #[test]
    fn test_timeout_leaves_fast_commands_alone() {
        let source = sh(r#"echo '{"Power": {"CPU": {"value": "5 W"}}}'"#)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(source.snapshot().unwrap().readings().count(), 1);
    }

    #[test]
    fn test_large_output_does_not_block() {
        // Well beyond a pipe buffer.
        let source = sh(r#"printf '{"Fans": {'; i=0; while [ $i -lt 4000 ]; do printf '"Fan %d": {"value": "1 rpm"}, ' $i; i=$((i+1)); done; printf '"Fan x": {"value": "2 rpm"}}}'"#)
            .with_timeout(Duration::from_secs(20));
        assert_eq!(source.snapshot().unwrap().readings().count(), 4001);
    }

    #[test]
    fn test_garbage_output_is_an_error() {
        assert!(matches!(sh("echo nope").snapshot(), Err(Error::Json(_))));
    }
}
