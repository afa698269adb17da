//! Shell invocation helpers.
//!
//! Tools are always invoked through `sh -c` so suite templates may use shell
//! syntax (redirections, globs, `&&`).

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Poll interval while waiting on a child with a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a shell invocation.
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit status for diagnostics (`signal` when killed).
    pub fn describe_status(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Quote `s` for inclusion in a POSIX shell command line.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':' | ','))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// `<binary> <command>` as a shell line.
pub fn tool_line(binary: &Path, command: &str) -> String {
    let binary = shell_quote(&binary.display().to_string());
    if command.is_empty() {
        binary
    } else {
        format!("{binary} {command}")
    }
}

fn shell(script: &str, cwd: Option<&Path>) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd
}

/// Run `script` with `sh -c`, capturing stdout and stderr.
pub fn run_shell(script: &str, cwd: Option<&Path>) -> std::io::Result<ShellOutput> {
    tracing::debug!(script, cwd = ?cwd, "sh -c");
    let output = shell(script, cwd).output()?;
    Ok(ShellOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Run `script` with a deadline. Returns `Ok(None)` if it had to be killed.
pub fn run_shell_with_timeout(
    script: &str,
    cwd: Option<&Path>,
    timeout: Duration,
) -> std::io::Result<Option<ShellOutput>> {
    tracing::debug!(script, cwd = ?cwd, ?timeout, "sh -c (bounded)");
    let mut cmd = shell(script, cwd);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    // Own process group, so a timeout takes down everything the script started.
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);
    let mut child = cmd.spawn()?;

    // Drain pipes on threads so a chatty child cannot block on a full pipe.
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            kill_group(&mut child);
            let _ = child.wait();
            // Grandchildren may still hold the pipes; the reader threads are detached.
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let collect = |reader: Option<std::thread::JoinHandle<Vec<u8>>>| {
        reader.and_then(|h| h.join().ok()).unwrap_or_default()
    };

    Ok(Some(ShellOutput {
        status,
        stdout: collect(stdout_reader),
        stderr: collect(stderr_reader),
    }))
}

/// `SIGKILL` the child's process group, falling back to the child alone.
#[cfg(unix)]
fn kill_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let killed = i32::try_from(child.id())
        .is_ok_and(|pgid| killpg(Pid::from_raw(pgid), Signal::SIGKILL).is_ok());
    if !killed {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Whether `program` can be found: an existing path, or a command on `PATH`.
pub fn command_exists(program: &str) -> bool {
    if program.contains('/') {
        return Path::new(program).exists();
    }
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
    })
}

/// `<binary> --version`, preferring stdout and falling back to stderr.
pub fn version_of(binary: &Path) -> String {
    match Command::new(binary).arg("--version").stdin(Stdio::null()).output() {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if stdout.is_empty() {
                String::from_utf8_lossy(&output.stderr).trim().to_string()
            } else {
                stdout
            }
        }
        Err(e) => {
            tracing::debug!("{} --version failed: {}", binary.display(), e);
            "unknown".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("tk"), "tk");
        assert_eq!(shell_quote("/usr/bin/rtk"), "/usr/bin/rtk");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_tool_line() {
        assert_eq!(tool_line(Path::new("/opt/my tools/rtk"), "eval x"), "'/opt/my tools/rtk' eval x");
        assert_eq!(tool_line(Path::new("tk"), ""), "tk");
    }

    #[test]
    fn test_run_shell_captures_output_in_cwd() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "here").unwrap();
        let out = run_shell("cat marker; echo oops >&2; exit 3", Some(dir.path())).unwrap();
        assert_eq!(out.stdout, b"here");
        assert_eq!(out.stderr_lossy().trim(), "oops");
        assert!(!out.success());
        assert_eq!(out.describe_status(), "exit code 3");
    }

    #[test]
    fn test_run_shell_with_timeout_completes() {
        let out = run_shell_with_timeout("echo done", None, Duration::from_secs(5))
            .unwrap()
            .expect("should finish before deadline");
        assert_eq!(out.stdout_lossy(), "done\n");
    }

    #[test]
    fn test_run_shell_with_timeout_expires() {
        let start = Instant::now();
        let out = run_shell_with_timeout("exec sleep 5", None, Duration::from_millis(200)).unwrap();
        assert!(out.is_none());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely-not-a-real-command-4821"));
        assert!(!command_exists("/nonexistent/bin/tool"));
    }
}
