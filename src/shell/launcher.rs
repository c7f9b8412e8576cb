use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

use crate::error::TetherError;

/// Start the shell executable, handing it the rendezvous address as its
/// final argument, with both output streams forwarded line-by-line into
/// the log under `tag`.
pub(crate) fn spawn_shell(
    program: &Path,
    args: &[String],
    addr: &str,
    tag: &str,
) -> Result<Child, TetherError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg(addr)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program = %program.display(), addr, "Launching shell");
    let mut child = cmd.spawn().map_err(|e| TetherError::Spawn {
        program: program.to_path_buf(),
        source: e,
    })?;
    forward_output(tag, &mut child);
    Ok(child)
}

/// Forward the child's stdout and stderr into the log, one line at a time.
/// A line that fails to read ends that stream's forwarding; the process
/// itself is unaffected.
fn forward_output(tag: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let tag = tag.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("{} stdout: {}", tag, line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tag = tag.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                error!("{} stderr: {}", tag, line);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_failure_names_the_program() {
        let result = spawn_shell(
            Path::new("/definitely/not/a/real/binary"),
            &[],
            "127.0.0.1:1",
            "shell",
        );
        match result {
            Err(TetherError::Spawn { program, .. }) => {
                assert_eq!(program, Path::new("/definitely/not/a/real/binary"));
            }
            other => panic!("expected spawn error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_child_receives_the_address_argument() {
        let mut child = spawn_shell(Path::new("/bin/echo"), &[], "127.0.0.1:4242", "shell")
            .expect("echo spawns");
        let status = child.wait().await.expect("echo exits");
        assert!(status.success());
    }
}
