use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::DriverError;

/// Default ceiling on a single subprocess invocation — long enough for a
/// cluster spawn, short enough to eventually notice a hung provider.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1800);

/// One subprocess invocation, with its combined stdout+stderr mirrored both
/// to `tracing` and to a per-invocation log file under `log_dir` — every
/// action that shells out writes one of these so a failure always has a
/// file an operator can open, not just a truncated error string. Also
/// returns stdout on its own: callers that need to parse a command's stdout
/// (`terraform output -json`) can't reliably parse the combined log, since
/// stderr diagnostics can interleave into it even on success.
pub async fn run_logged(
    log_dir: &Path,
    label: &str,
    binary: &str,
    args: &[&str],
    workdir: &Path,
    envs: &[(&str, &str)],
) -> Result<(i32, PathBuf, String), DriverError> {
    tokio::fs::create_dir_all(log_dir)
        .await
        .map_err(|e| DriverError::Internal(format!("create log dir {}: {}", log_dir.display(), e)))?;

    let log_path = log_dir.join(format!("{}-{}.log", label, uuid::Uuid::new_v4()));

    debug!(binary, ?args, workdir = %workdir.display(), log = %log_path.display(), "running logged command");

    let mut cmd = Command::new(binary);
    cmd.args(args)
        .current_dir(workdir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .env("TF_IN_AUTOMATION", "1")
        .env("TF_INPUT", "0");
    for (k, v) in envs {
        cmd.env(k, v);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| DriverError::ToolNotFound(format!("{}: {}", binary, e)))?;

    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(bool, String)>();

    let tx1 = tx.clone();
    let stdout_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx1.send((false, line));
        }
    });

    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx.send((true, line));
        }
    });

    let mut log = String::new();
    let mut stdout_only = String::new();
    let collect = async {
        while let Some((is_stderr, line)) = rx.recv().await {
            debug!(target: "meridian::action", "{}", line);
            log.push_str(&line);
            log.push('\n');
            if !is_stderr {
                stdout_only.push_str(&line);
                stdout_only.push('\n');
            }
        }
    };

    let timed_out = tokio::time::timeout(DEFAULT_TIMEOUT, collect).await.is_err();

    stdout_task.await.ok();
    stderr_task.await.ok();

    if timed_out {
        let _ = child.kill().await;
        log.push_str(&format!("\n[timed out after {}s, process killed]\n", DEFAULT_TIMEOUT.as_secs()));
        let _ = tokio::fs::write(&log_path, &log).await;
        return Err(DriverError::ToolFailed(format!(
            "{} {} timed out after {}s",
            binary,
            args.first().copied().unwrap_or(""),
            DEFAULT_TIMEOUT.as_secs()
        )));
    }

    let status = child
        .wait()
        .await
        .map_err(|e| DriverError::Internal(format!("wait {}: {}", binary, e)))?;
    let code = status.code().unwrap_or(-1);

    if let Err(e) = tokio::fs::write(&log_path, &log).await {
        warn!(error = %e, "failed to write action log file");
    }

    if code != 0 {
        warn!(binary, code, log = %log_path.display(), "command exited non-zero");
    }

    Ok((code, log_path, stdout_only))
}
