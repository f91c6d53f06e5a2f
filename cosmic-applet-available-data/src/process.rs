// Copyright 2023 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

//! Asynchronous execution of the external query script.
//!
//! Both entry points own the child for its whole life: pipes are drained and
//! the process is reaped before the future resolves, whatever the outcome.

use std::{
    future::Future,
    io,
    os::unix::process::ExitStatusExt,
    process::{ExitStatus, Stdio},
    sync::Arc,
};

use tokio::process::Command;

/// The child could not be started at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpawnError {
    #[error("no command to run")]
    EmptyCommand,
    #[error("`{program}` was not found")]
    NotFound { program: String },
    #[error("permission denied while executing `{program}`")]
    PermissionDenied { program: String },
    #[error("failed to execute `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: Arc<io::Error>,
    },
}

impl SpawnError {
    fn new(program: &str, why: io::Error) -> Self {
        let program = program.to_owned();
        match why.kind() {
            io::ErrorKind::NotFound => Self::NotFound { program },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { program },
            _ => Self::Io {
                program,
                source: Arc::new(why),
            },
        }
    }
}

/// Exit status of a captured run with the stream that goes with it:
/// stdout when the child exited with 0, stderr otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: i32,
    pub output: String,
}

pub trait ProcessRunner {
    fn run_captured(
        &self,
        argv: Vec<String>,
    ) -> impl Future<Output = Result<Completion, SpawnError>> + Send + 'static;

    fn run_fire_and_forget(
        &self,
        argv: Vec<String>,
    ) -> impl Future<Output = Result<i32, SpawnError>> + Send + 'static;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;

impl ProcessRunner for TokioRunner {
    fn run_captured(
        &self,
        argv: Vec<String>,
    ) -> impl Future<Output = Result<Completion, SpawnError>> + Send + 'static {
        run_captured(argv)
    }

    fn run_fire_and_forget(
        &self,
        argv: Vec<String>,
    ) -> impl Future<Output = Result<i32, SpawnError>> + Send + 'static {
        run_fire_and_forget(argv)
    }
}

pub async fn run_captured(argv: Vec<String>) -> Result<Completion, SpawnError> {
    let (program, mut cmd) = command(&argv)?;

    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|why| SpawnError::new(program, why))?;

    let stream = if output.status.success() {
        output.stdout
    } else {
        output.stderr
    };

    Ok(Completion {
        exit_code: exit_code(output.status),
        output: String::from_utf8_lossy(&stream).into_owned(),
    })
}

pub async fn run_fire_and_forget(argv: Vec<String>) -> Result<i32, SpawnError> {
    let (program, mut cmd) = command(&argv)?;

    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|why| SpawnError::new(program, why))?;

    Ok(exit_code(status))
}

fn command(argv: &[String]) -> Result<(&str, Command), SpawnError> {
    let (program, args) = argv.split_first().ok_or(SpawnError::EmptyCommand)?;
    if program.is_empty() {
        return Err(SpawnError::EmptyCommand);
    }

    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok((program.as_str(), cmd))
}

// A child killed by a signal has no exit code; report it as `-signal`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let completion = run_captured(sh("echo '42 GB'; echo ignored >&2"))
            .await
            .unwrap();
        assert_eq!(
            completion,
            Completion {
                exit_code: 0,
                output: "42 GB\n".into()
            }
        );
    }

    #[tokio::test]
    async fn captures_stderr_on_failure() {
        let completion = run_captured(sh("echo ignored; echo boom >&2; exit 5"))
            .await
            .unwrap();
        assert_eq!(completion.exit_code, 5);
        assert_eq!(completion.output, "boom\n");
    }

    #[tokio::test]
    async fn passes_arguments_through_verbatim() {
        let argv = vec![
            "sh".into(),
            "-c".into(),
            r#"printf '%s|' "$@""#.into(),
            "sh".into(),
            "get".into(),
            "user name".into(),
            "p@ss; $word".into(),
        ];
        let completion = run_captured(argv).await.unwrap();
        assert_eq!(completion.output, "get|user name|p@ss; $word|");
    }

    #[tokio::test]
    async fn signal_reports_negative_code() {
        let completion = run_captured(sh("kill -9 $$")).await.unwrap();
        assert_eq!(completion.exit_code, -9);
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let why = run_captured(vec!["/nonexistent/derytelecomextranetquery".into()])
            .await
            .unwrap_err();
        assert!(matches!(why, SpawnError::NotFound { .. }), "{why:?}");

        let why = run_fire_and_forget(vec!["/nonexistent/derytelecomextranetquery".into()])
            .await
            .unwrap_err();
        assert!(matches!(why, SpawnError::NotFound { .. }), "{why:?}");
    }

    #[tokio::test]
    async fn non_executable_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!(
            "cosmic-applet-available-data-{}.sh",
            std::process::id()
        ));
        std::fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let why = run_captured(vec![path.display().to_string()])
            .await
            .unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(why, SpawnError::PermissionDenied { .. }), "{why:?}");
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        assert!(matches!(
            run_captured(Vec::new()).await,
            Err(SpawnError::EmptyCommand)
        ));
        assert!(matches!(
            run_fire_and_forget(vec![String::new()]).await,
            Err(SpawnError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn fire_and_forget_reports_exit_code() {
        assert_eq!(run_fire_and_forget(sh("exit 0")).await.unwrap(), 0);
        assert_eq!(
            TokioRunner.run_fire_and_forget(sh("exit 3")).await.unwrap(),
            3
        );
    }
}
