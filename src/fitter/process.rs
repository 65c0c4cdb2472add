//! Blocking child process execution with an optional deadline
use std::{
    ffi::OsString,
    io::Read,
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error};

use crate::errors::InvokeError;

/// Child status polling period
const POLL_PERIOD: Duration = Duration::from_millis(20);

/// Drains a child stream on a dedicated thread, so the child
/// never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(stream: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut content = Vec::new();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.read_to_end(&mut content) {
                error!("failed to read child output: {}", e);
            }
        }
        content
    })
}

fn collect(handle: JoinHandle<Vec<u8>>) -> String {
    let content = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&content).into_owned()
}

/// Waits for the child to exit, killing it once the deadline is exceeded.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, InvokeError> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return Ok(child.wait()?),
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            error!("killing child process {} after {:?}", child.id(), timeout);
            child.kill()?;
            child.wait()?;
            return Err(InvokeError::Timeout(timeout));
        }
        thread::sleep(POLL_PERIOD);
    }
}

/// Runs `program` with these arguments and returns its standard output.
/// A failure exit status is reported along with the standard error.
pub(crate) fn run(
    program: &Path,
    args: &[OsString],
    timeout: Option<Duration>,
) -> Result<String, InvokeError> {
    debug!("running {} {:?}", program.display(), args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| InvokeError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = wait(&mut child, timeout)?;

    let stdout = collect(stdout);
    let stderr = collect(stderr);

    if !status.success() {
        return Err(InvokeError::ExitStatus {
            status,
            stderr: stderr.trim().to_string(),
        });
    }

    debug!("{} exited: {} bytes collected", program.display(), stdout.len());
    Ok(stdout)
}

#[cfg(all(test, unix))]
mod test {
    use super::run;
    use crate::errors::InvokeError;
    use std::{ffi::OsString, path::Path, time::Duration};

    fn args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn captures_stdout() {
        let stdout = run(Path::new("sh"), &args(&["-c", "echo 1 2 3 BLAH"]), None).unwrap();
        assert_eq!(stdout, "1 2 3 BLAH\n");
    }

    #[test]
    fn failure_status() {
        let result = run(
            Path::new("sh"),
            &args(&["-c", "echo oops >&2; exit 3"]),
            Some(Duration::from_secs(10)),
        );
        match result {
            Err(InvokeError::ExitStatus { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "oops");
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn timeout() {
        let result = run(
            Path::new("sh"),
            &args(&["-c", "sleep 5"]),
            Some(Duration::from_millis(100)),
        );
        assert!(matches!(result, Err(InvokeError::Timeout(_))));
    }

    #[test]
    fn missing_program() {
        let result = run(Path::new("/nonexistent/tempo2"), &[], None);
        assert!(matches!(result, Err(InvokeError::Spawn { .. })));
    }
}
