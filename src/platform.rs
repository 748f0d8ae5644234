//! Process environment and persistent user variables.
//!
//! Only Windows has a persistent-variable command (`setx`). Elsewhere the
//! caller is handed a shell profile line to add by hand.

use crate::definitions::SYSTEM_SOURCE;
use crate::error::FixError;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on a persistent-variable command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Line to add to a shell profile to persist `name`.
pub fn profile_line(name: &str, value: &str) -> String {
    let escaped: String = value
        .chars()
        .flat_map(|c| match c {
            '"' | '\\' | '$' | '`' => vec!['\\', c],
            _ => vec![c],
        })
        .collect();
    format!("export {name}=\"{escaped}\"")
}

/// Checks that `name=value` can be placed in a process environment.
pub fn validate_variable(name: &str, value: &str) -> Result<(), FixError> {
    let reason = if name.is_empty() {
        "variable name is empty".to_string()
    } else if name.contains(['=', '\0']) {
        format!("variable name {name:?} contains '=' or NUL")
    } else if value.contains('\0') {
        format!("value of {name} contains NUL")
    } else {
        return Ok(());
    };
    Err(FixError::Edit {
        path: PathBuf::from(SYSTEM_SOURCE),
        source: io::Error::new(io::ErrorKind::InvalidInput, reason),
    })
}

/// Sets `name` in the current process environment.
pub fn set_in_process(name: &str, value: &str) -> Result<(), FixError> {
    validate_variable(name, value)?;
    // SAFETY: fixes run on the driver's only thread, and nothing else reads
    // the environment while an action is applied.
    unsafe { std::env::set_var(name, value) };
    Ok(())
}

/// Persists `name` for future sessions where the platform supports it.
///
/// Returns `Ok(false)` when there is no persistent mechanism.
#[cfg(windows)]
pub fn persist(name: &str, value: &str, timeout: Duration) -> Result<bool, FixError> {
    let mut command = Command::new("setx");
    command.arg(name).arg(value);
    run_with_timeout(&mut command, timeout, &format!("setx {name}"))?;
    Ok(true)
}

/// Persists `name` for future sessions where the platform supports it.
///
/// Returns `Ok(false)` when there is no persistent mechanism.
#[cfg(not(windows))]
pub fn persist(_name: &str, _value: &str, _timeout: Duration) -> Result<bool, FixError> {
    Ok(false)
}

/// Runs `command` to completion, killing it after `timeout`. A non-zero
/// exit status is an error. Output is drained on background threads so a
/// chatty command cannot block on a full pipe.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, FixError> {
    let platform_error = |message: String| FixError::Platform {
        command: label.to_string(),
        message,
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| platform_error(e.to_string()))?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    loop {
        let exited = child
            .try_wait()
            .map_err(|e| platform_error(format!("failed to poll child status: {e}")))?
            .is_some();
        if exited {
            break;
        }

        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            log::warn!("`{label}` timed out after {}s", timeout.as_secs());
            return Err(FixError::PlatformTimeout {
                command: label.to_string(),
                seconds: timeout.as_secs(),
            });
        }

        thread::sleep(Duration::from_millis(50));
    }

    let status = child
        .wait()
        .map_err(|e| platform_error(e.to_string()))?;
    let output = Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(platform_error(format!(
            "exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_line_quotes_value() {
        assert_eq!(profile_line("API_KEY", "abc"), "export API_KEY=\"abc\"");
        assert_eq!(
            profile_line("GREETING", "say \"hi\" to $USER"),
            "export GREETING=\"say \\\"hi\\\" to \\$USER\""
        );
    }

    #[test]
    fn set_in_process_is_visible() {
        set_in_process("ENVDOC_PLATFORM_TEST_VAR", "on").unwrap();
        assert_eq!(
            std::env::var("ENVDOC_PLATFORM_TEST_VAR").as_deref(),
            Ok("on")
        );
    }

    #[test]
    fn names_the_environment_rejects_are_edit_errors() {
        for (name, value) in [("", "x"), ("A=B", "x"), ("NUL\0NAME", "x"), ("GOOD", "bad\0value")] {
            let err = set_in_process(name, value).unwrap_err();
            assert!(matches!(err, FixError::Edit { .. }), "{name:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn large_output_does_not_stall() {
        let mut command = Command::new("sh");
        command.args(["-c", "head -c 1048576 /dev/zero; echo done >&2"]);
        let output = run_with_timeout(&mut command, Duration::from_secs(5), "flood").unwrap();
        assert_eq!(output.stdout.len(), 1_048_576);
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "done");
    }

    #[cfg(unix)]
    #[test]
    fn successful_command_returns_output() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo ok"]);
        let output = run_with_timeout(&mut command, Duration::from_secs(5), "echo").unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ok");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_platform_error() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo nope >&2; exit 3"]);
        let err = run_with_timeout(&mut command, Duration::from_secs(5), "fail").unwrap_err();
        match err {
            FixError::Platform { message, .. } => assert!(message.contains("nope")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let started = Instant::now();
        let err = run_with_timeout(&mut command, Duration::from_millis(100), "sleep").unwrap_err();
        assert!(matches!(err, FixError::PlatformTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(not(windows))]
    #[test]
    fn persist_is_a_no_op_without_setx() {
        assert!(!persist("ANY", "value", DEFAULT_COMMAND_TIMEOUT).unwrap());
    }
}
