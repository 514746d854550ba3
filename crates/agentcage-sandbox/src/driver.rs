//! Execution driver (§4.H): the eight-step path from a command string to a
//! [`CommandResult`].

use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use agentcage_core::observability;

use crate::result::CommandResult;

/// A hook run on the child's thread between `fork`/`clone` and `exec`, used
/// by the Landlock backend to install its ruleset in the child rather than
/// via an argv-level wrapper. `None` for the Seatbelt and bare-shell paths,
/// which encode their restrictions directly into `argv`.
pub type PreExecHook = Box<dyn FnMut() -> std::io::Result<()> + Send + Sync>;

/// Run `command` to completion or `timeout`, whichever comes first.
///
/// `argv` is the fully-built launch vector (from the seatbelt builder, or a
/// bare `bash -c` invocation for Landlock/no-isolation, where restrictions
/// are instead applied via `pre_exec`); `env` is the child's complete
/// environment (already carrying proxy variables if applicable);
/// `max_output_bytes` bounds each stream independently.
pub fn run(
    argv: &[String],
    workspace: &str,
    env: &HashMap<String, String>,
    timeout: Duration,
    max_output_bytes: usize,
    pre_exec: Option<PreExecHook>,
) -> std::io::Result<CommandResult> {
    let (program, args) = argv
        .split_first()
        .expect("argv must contain at least the program name");

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(workspace)
        .env_clear()
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    if let Some(mut hook) = pre_exec {
        use std::os::unix::process::CommandExt;
        // Safety: the closure only touches Landlock/seccomp state local to
        // the about-to-be-replaced child process; it allocates nothing that
        // could deadlock between fork and exec.
        unsafe {
            command.pre_exec(move || hook());
        }
    }
    #[cfg(not(unix))]
    let _ = pre_exec;

    let mut child = command.spawn()?;
    let (stdout, stderr, exit_code, timed_out) = wait_with_timeout(&mut child, timeout)?;

    if timed_out {
        return Ok(CommandResult::timed_out());
    }

    let (stdout, stdout_truncated) = truncate(stdout, max_output_bytes);
    let (stderr, stderr_truncated) = truncate(stderr, max_output_bytes);

    Ok(CommandResult {
        stdout,
        stderr,
        exit_code,
        truncated: stdout_truncated || stderr_truncated,
        timed_out: false,
    })
}

/// Spawn background reader threads (to avoid pipe-buffer deadlock on large
/// output), then poll `try_wait()` until the child exits or `timeout`
/// elapses.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<(Vec<u8>, Vec<u8>, i32, bool)> {
    let poll_interval = Duration::from_millis(20);
    let start = Instant::now();

    let stdout_handle = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_handle = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            buf
        })
    });

    loop {
        if let Some(status) = child.try_wait()? {
            let stdout = stdout_handle.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
            let stderr = stderr_handle.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
            let exit_code = exit_code_of(status);
            return Ok((stdout, stderr, exit_code, false));
        }

        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.map(|h| h.join());
            let _ = stderr_handle.map(|h| h.join());
            return Ok((Vec::new(), Vec::new(), -1, true));
        }

        thread::sleep(poll_interval);
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Decode as UTF-8 with lossy replacement, then truncate to `limit` bytes,
/// appending the truncation marker when it fires.
fn truncate(bytes: Vec<u8>, limit: usize) -> (String, bool) {
    let decoded = String::from_utf8_lossy(&bytes).into_owned();
    if decoded.len() <= limit {
        return (decoded, false);
    }

    let mut cut = limit;
    while !decoded.is_char_boundary(cut) {
        cut -= 1;
    }
    let removed = decoded.len() - cut;
    let mut truncated = decoded[..cut].to_string();
    truncated.push_str(&format!("\n\n[Truncated: {removed} characters removed]"));
    (truncated, true)
}

/// Record execution start/completion in the audit trail, mirroring what
/// the sandbox facade calls around [`run`].
pub fn audit_started(command: &str, cwd: &str) {
    observability::audit_execution_started(command, cwd);
}

pub fn audit_completed(command: &str, result: &CommandResult, duration: Duration) {
    observability::audit_execution_completed(
        command,
        result.exit_code,
        duration.as_millis() as u64,
        result.truncated,
        result.timed_out,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_output_untouched() {
        let (s, truncated) = truncate(b"hello".to_vec(), 30_000);
        assert_eq!(s, "hello");
        assert!(!truncated);
    }

    #[test]
    fn truncate_appends_marker_with_correct_removed_count() {
        let input = vec![b'a'; 100];
        let (s, truncated) = truncate(input, 40);
        assert!(truncated);
        assert!(s.starts_with(&"a".repeat(40)));
        assert!(s.contains("[Truncated: 60 characters removed]"));
    }

    #[test]
    fn run_captures_stdout_stderr_and_exit_code() {
        let argv = vec!["bash".to_string(), "-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let env = HashMap::new();
        let result = run(&argv, ".", &env, Duration::from_secs(5), 30_000, None).unwrap();
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
        assert_eq!(result.exit_code, 3);
        assert!(!result.timed_out);
    }

    #[test]
    fn run_enforces_timeout() {
        let argv = vec!["bash".to_string(), "-c".to_string(), "sleep 5".to_string()];
        let env = HashMap::new();
        let result = run(&argv, ".", &env, Duration::from_millis(200), 30_000, None).unwrap();
        assert!(result.timed_out);
        assert_eq!(result.stderr, "Command timed out.");
        assert_eq!(result.exit_code, -1);
    }

    #[test]
    fn run_truncates_large_output() {
        let argv = vec![
            "bash".to_string(),
            "-c".to_string(),
            "head -c 200 /dev/zero | tr '\\0' 'a'".to_string(),
        ];
        let env = HashMap::new();
        let result = run(&argv, ".", &env, Duration::from_secs(5), 50, None).unwrap();
        assert!(result.truncated);
        assert!(result.stdout.contains("[Truncated:"));
    }
}
