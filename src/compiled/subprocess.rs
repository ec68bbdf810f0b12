//! Sandboxed interpreter subprocess speaking line-delimited JSON
//!
//! One child per bridge, started lazily and reused across requests. The child
//! runs isolated (`-I -S`), with an environment cleared down to `PATH` and a
//! temporary working directory, so nothing from the analyzed project leaks in.
//! Once the child times out or dies the bridge stays crashed.

use crate::compiled::bridge::{BridgeError, ModuleSignature, NativeBridge};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const INTROSPECT_SCRIPT: &str = include_str!("introspect.py");

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    op: &'static str,
    name: &'a str,
    paths: Vec<String>,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    ok: bool,
    #[serde(default)]
    module: Option<ModuleSignature>,
    #[serde(default)]
    error: Option<String>,
}

struct Process {
    child: Child,
    stdin: ChildStdin,
    lines: flume::Receiver<String>,
}

impl Process {
    fn kill(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct SubprocessBridge {
    executable: PathBuf,
    timeout: Duration,
    max_members: usize,
    process: Mutex<Option<Process>>,
    crashed: AtomicBool,
    next_id: AtomicU64,
    memo: DashMap<String, Arc<ModuleSignature>>,
}

impl SubprocessBridge {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            max_members: 2000,
            process: Mutex::new(None),
            crashed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            memo: DashMap::new(),
        }
    }

    pub fn with_max_members(mut self, max_members: usize) -> Self {
        self.max_members = max_members;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    fn spawn(&self) -> Result<Process, BridgeError> {
        debug!(executable = %self.executable.display(), "starting native bridge subprocess");
        let mut command = Command::new(&self.executable);
        command
            .arg("-I")
            .arg("-S")
            .arg("-c")
            .arg(INTROSPECT_SCRIPT)
            .env_clear()
            .current_dir(std::env::temp_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
            executable: self.executable.clone(),
            source,
        })?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BridgeError::Crashed("child pipes unavailable".to_string()));
            }
        };

        let (tx, rx) = flume::unbounded();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let executable = self.executable.display().to_string();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                debug!(executable = %executable, "stderr output: {}", line.trim_end());
            }
        });

        Ok(Process { child, stdin, lines: rx })
    }

    fn mark_crashed(&self, slot: &mut Option<Process>) {
        self.crashed.store(true, Ordering::SeqCst);
        if let Some(process) = slot.take() {
            process.kill();
        }
    }

    fn request(&self, name: &str, paths: &[PathBuf]) -> Result<ModuleSignature, BridgeError> {
        let mut slot = self.process.lock();
        if self.is_crashed() {
            return Err(BridgeError::Crashed(format!(
                "{} has crashed earlier",
                self.executable.display()
            )));
        }
        if slot.is_none() {
            *slot = Some(self.spawn()?);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request {
            id,
            op: "module",
            name,
            paths: paths.iter().map(|p| p.display().to_string()).collect(),
            limit: self.max_members,
        };
        let mut line = serde_json::to_string(&request).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        line.push('\n');

        let write_result = match slot.as_mut() {
            Some(process) => process
                .stdin
                .write_all(line.as_bytes())
                .and_then(|_| process.stdin.flush()),
            None => return Err(BridgeError::Crashed("no child process".to_string())),
        };
        if let Err(err) = write_result {
            self.mark_crashed(&mut slot);
            return Err(BridgeError::Crashed(format!("write failed: {err}")));
        }

        // One deadline for the whole exchange; skipped lines do not extend it.
        let deadline = Instant::now() + self.timeout;
        loop {
            let received = match slot.as_ref() {
                Some(process) => process.lines.recv_deadline(deadline),
                None => return Err(BridgeError::Crashed("no child process".to_string())),
            };
            match received {
                Ok(line) => {
                    let response: Response = match serde_json::from_str(&line) {
                        Ok(response) => response,
                        Err(err) => {
                            debug!(line = %line, "skipping non-protocol output");
                            if line.trim_start().starts_with('{') {
                                return Err(BridgeError::Protocol(err.to_string()));
                            }
                            continue;
                        }
                    };
                    if response.id != id {
                        continue;
                    }
                    return match (response.ok, response.module) {
                        (true, Some(module)) => Ok(module),
                        (true, None) => Err(BridgeError::Protocol("response without module".to_string())),
                        (false, _) => Err(BridgeError::Remote(
                            response.error.unwrap_or_else(|| "unknown error".to_string()),
                        )),
                    };
                }
                Err(flume::RecvTimeoutError::Timeout) => {
                    self.mark_crashed(&mut slot);
                    return Err(BridgeError::Timeout {
                        millis: self.timeout.as_millis() as u64,
                    });
                }
                Err(flume::RecvTimeoutError::Disconnected) => {
                    self.mark_crashed(&mut slot);
                    return Err(BridgeError::Crashed("child exited".to_string()));
                }
            }
        }
    }
}

impl NativeBridge for SubprocessBridge {
    fn introspect_module(&self, name: &str, paths: &[PathBuf]) -> Result<Arc<ModuleSignature>, BridgeError> {
        if let Some(signature) = self.memo.get(name) {
            return Ok(signature.clone());
        }
        match self.request(name, paths) {
            Ok(mut signature) => {
                signature.members.truncate(self.max_members);
                info!(module = name, members = signature.members.len(), "introspected native module");
                let signature = Arc::new(signature);
                self.memo.insert(name.to_string(), signature.clone());
                Ok(signature)
            }
            Err(err) => {
                warn!(executable = %self.executable.display(), module = name, reason = %err, "native introspection failed");
                Err(err)
            }
        }
    }

    fn describe(&self) -> String {
        format!("subprocess:{}", self.executable.display())
    }
}

impl Drop for SubprocessBridge {
    fn drop(&mut self) {
        if let Some(process) = self.process.get_mut().take() {
            process.kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_successful_round_trip_is_memoized() {
        let dir = TempDir::new().unwrap();
        let exe = script(
            &dir,
            "fake-python",
            r#"read line
echo "noise before protocol"
echo '{"id": 1, "ok": true, "module": {"name": "_fast", "members": [{"name": "go", "kind": "function", "arity": 0}]}}'
sleep 5"#,
        );
        let bridge = SubprocessBridge::new(exe, Duration::from_secs(3));
        let sig = bridge.introspect_module("_fast", &[]).unwrap();
        assert_eq!(sig.member("go").unwrap().arity, Some(0));

        // Served from the memo; the fake runtime would not answer a second request.
        let again = bridge.introspect_module("_fast", &[]).unwrap();
        assert!(Arc::ptr_eq(&sig, &again));
        assert!(!bridge.is_crashed());
    }

    #[test]
    fn test_timeout_marks_crashed() {
        let dir = TempDir::new().unwrap();
        let exe = script(&dir, "slow-python", "sleep 5");
        let bridge = SubprocessBridge::new(exe, Duration::from_millis(100));
        let err = bridge.introspect_module("anything", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { millis: 100 }));
        assert!(bridge.is_crashed());

        let err = bridge.introspect_module("other", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Crashed(_)));
    }

    #[test]
    fn test_chatty_child_still_times_out() {
        let dir = TempDir::new().unwrap();
        let exe = script(
            &dir,
            "chatty-python",
            r#"read line
while true; do
    echo junk
    echo '{"id": 999, "ok": true, "module": {"name": "other", "members": []}}'
    sleep 0.05
done"#,
        );
        let bridge = SubprocessBridge::new(exe, Duration::from_millis(300));
        let started = Instant::now();
        let err = bridge.introspect_module("anything", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { millis: 300 }));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(bridge.is_crashed());
    }

    #[test]
    fn test_exit_is_crash() {
        let dir = TempDir::new().unwrap();
        let exe = script(&dir, "dead-python", "echo boom >&2\nexit 3");
        let bridge = SubprocessBridge::new(exe, Duration::from_secs(3));
        let err = bridge.introspect_module("anything", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Crashed(_)));
    }

    #[test]
    fn test_missing_executable() {
        let bridge = SubprocessBridge::new("/nonexistent/python-for-tests", Duration::from_secs(1));
        let err = bridge.introspect_module("m", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
    }

    #[test]
    fn test_remote_error() {
        let dir = TempDir::new().unwrap();
        let exe = script(
            &dir,
            "err-python",
            r#"read line
echo '{"id": 1, "ok": false, "error": "ModuleNotFoundError: nope"}'
sleep 5"#,
        );
        let bridge = SubprocessBridge::new(exe, Duration::from_secs(3));
        let err = bridge.introspect_module("nope", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Remote(msg) if msg.contains("nope")));
        assert!(!bridge.is_crashed());
    }
}
