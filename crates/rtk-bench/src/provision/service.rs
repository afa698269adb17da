//! Backing-service lifecycle.
//!
//! The mock Kubernetes server daemonizes: its launcher forks, writes the
//! daemon's pid to a file and exits. [`ServiceGuard`] owns that pid until it
//! is dropped, at which point the daemon receives `SIGTERM`.

use crate::error::{BenchError, Result};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// How long the launcher gets to write its pid file.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running backing service, terminated on drop.
#[derive(Debug)]
pub struct ServiceGuard {
    pid: i32,
    launcher: Option<Child>,
    pid_file: PathBuf,
}

impl ServiceGuard {
    /// Start `binary` serving `cluster_dir` and wait for it to become ready.
    ///
    /// Ready means the pid file holds a process id. A launcher that exits
    /// non-zero, or a pid file that does not appear within `timeout`, is a
    /// provisioning failure.
    pub fn start(
        binary: &Path,
        cluster_dir: &Path,
        kubeconfig: &Path,
        pid_file: &Path,
        timeout: Duration,
    ) -> Result<Self> {
        // A stale pid from an earlier case would read as ready immediately.
        match std::fs::remove_file(pid_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BenchError::io_at("remove", pid_file, e)),
        }

        tracing::info!(cluster = %cluster_dir.display(), "Starting backing service");
        // Null stdio: the daemon inherits these and must not hold our pipes open.
        let mut launcher = Command::new(binary)
            .arg("-d")
            .arg(cluster_dir)
            .arg("-k")
            .arg(kubeconfig)
            .arg("-p")
            .arg(pid_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                BenchError::Provision(format!("cannot start {}: {e}", binary.display()))
            })?;

        let deadline = Instant::now() + timeout;
        let mut exited = false;
        loop {
            if !exited {
                match launcher.try_wait() {
                    Ok(Some(status)) if !status.success() => {
                        return Err(BenchError::Provision(format!(
                            "backing service exited with {status}"
                        )));
                    }
                    Ok(Some(_)) => exited = true,
                    Ok(None) => {}
                    Err(e) => return Err(BenchError::io("Failed to poll backing service", e)),
                }
            }

            if let Some(pid) = read_pid(pid_file) {
                tracing::debug!(pid, "Backing service ready");
                return Ok(Self {
                    pid,
                    launcher: (!exited).then_some(launcher),
                    pid_file: pid_file.to_path_buf(),
                });
            }

            if Instant::now() >= deadline {
                if !exited {
                    let _ = launcher.kill();
                    let _ = launcher.wait();
                }
                return Err(BenchError::Provision(format!(
                    "backing service did not write {} within {}s",
                    pid_file.display(),
                    timeout.as_secs_f64()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
}

/// Send `SIGTERM`; a process that is already gone counts as stopped.
#[cfg(unix)]
fn terminate(pid: i32) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, "Failed to stop backing service: {}", e),
    }
}

#[cfg(not(unix))]
fn terminate(pid: i32) {
    tracing::warn!(pid, "Signal-based shutdown is unsupported on this platform");
}

impl Drop for ServiceGuard {
    fn drop(&mut self) {
        tracing::debug!(pid = self.pid, "Stopping backing service");
        terminate(self.pid);

        if let Some(mut launcher) = self.launcher.take() {
            // Launcher did not daemonize (or is the daemon itself).
            if matches!(launcher.try_wait(), Ok(None))
                && i32::try_from(launcher.id()).is_ok_and(|id| id != self.pid)
            {
                let _ = launcher.kill();
            }
            let _ = launcher.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("mock-service");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn wait_for(path: &Path, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_start_waits_for_pid_and_terminates_on_drop() {
        let dir = TempDir::new().unwrap();
        let cluster = dir.path().join("cluster");
        std::fs::create_dir_all(&cluster).unwrap();
        // $2 = cluster dir, $6 = pid file
        let bin = script(
            dir.path(),
            r#"(trap 'echo stopped > "$2/stopped"; exit 0' TERM; while :; do sleep 0.1; done) &
echo $! > "$6""#,
        );

        let guard = ServiceGuard::start(
            &bin,
            &cluster,
            &dir.path().join("kubeconfig.yaml"),
            &dir.path().join("mock.pid"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(guard.pid() > 0);

        drop(guard);
        assert!(wait_for(&cluster.join("stopped"), Duration::from_secs(5)));
    }

    #[test]
    fn test_nonzero_launcher_exit_is_provision_error() {
        let dir = TempDir::new().unwrap();
        let bin = script(dir.path(), "exit 3");

        let err = ServiceGuard::start(
            &bin,
            dir.path(),
            &dir.path().join("kc"),
            &dir.path().join("pid"),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Provision(_)));
    }

    #[test]
    fn test_missing_pid_file_times_out() {
        let dir = TempDir::new().unwrap();
        let bin = script(dir.path(), "exec sleep 30");

        let start = Instant::now();
        let err = ServiceGuard::start(
            &bin,
            dir.path(),
            &dir.path().join("kc"),
            &dir.path().join("pid"),
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Provision(_)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_drop_tolerates_exited_service() {
        let dir = TempDir::new().unwrap();
        let bin = script(dir.path(), r#"true & p=$!; wait $p; echo $p > "$6""#);

        let guard = ServiceGuard::start(
            &bin,
            dir.path(),
            &dir.path().join("kc"),
            &dir.path().join("pid"),
            Duration::from_secs(5),
        )
        .unwrap();
        drop(guard);
    }

    #[test]
    fn test_stale_pid_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        std::fs::write(&pid_file, "12345\n").unwrap();
        let bin = script(dir.path(), "exit 0");

        let err = ServiceGuard::start(
            &bin,
            dir.path(),
            &dir.path().join("kc"),
            &pid_file,
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::Provision(_)));
    }

    #[test]
    fn test_read_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pid");
        assert_eq!(read_pid(&path), None);
        std::fs::write(&path, " 4242\n").unwrap();
        assert_eq!(read_pid(&path), Some(4242));
        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(read_pid(&path), None);
    }
}
