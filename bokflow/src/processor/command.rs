//! Processor backed by an external program.

use super::{FrameProcessor, ProcessorError, UnitRequest};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error};

/// Runs an external program once per unit.
///
/// The program is invoked as
/// `<program> [args]... <stage> <unit-id> <output> [--input <dir>]... [--flag <name>]...`
/// and must exit with status zero on success.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandProcessor {
    /// Creates a processor running `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds a leading argument passed before the unit arguments.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn command(&self, request: &UnitRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&request.stage)
            .arg(request.unit.to_string())
            .arg(&request.output);
        for input in &request.inputs {
            cmd.arg("--input").arg(input);
        }
        for flag in request.active_flags() {
            cmd.arg("--flag").arg(flag);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FrameProcessor for CommandProcessor {
    async fn apply(&self, request: &UnitRequest) -> Result<(), ProcessorError> {
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = self.command(request);
        debug!(stage = %request.stage, unit = %request.unit, "Command: {:?}", cmd);

        let program = self.program.display().to_string();
        let output = cmd.output().await.map_err(|source| ProcessorError::Spawn {
            program: program.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                stage = %request.stage,
                unit = %request.unit,
                status = %output.status,
                "{program} failed:\nstderr: {stderr}"
            );
            Err(ProcessorError::Exit {
                program,
                status: output.status.to_string(),
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Epoch, ProcessingFlags};
    use crate::core::{Night, WorkUnit};
    use crate::registry::StageFlags;

    fn request(output: PathBuf) -> UnitRequest {
        UnitRequest {
            stage: "fringe".into(),
            frame_type: "fringe".into(),
            night: Night::parse("20210615").unwrap(),
            unit: WorkUnit::band_unit("g"),
            raw_data_root: PathBuf::from("raw"),
            inputs: vec![PathBuf::from("in/a")],
            output,
            stage_flags: StageFlags::new(),
            processing_flags: ProcessingFlags::for_epoch(Epoch::Legacy),
            wcs_config: vec![],
        }
    }

    #[test]
    fn test_command_arguments() {
        let processor = CommandProcessor::new("bokproc").with_arg("--quiet");
        let cmd = processor.command(&request(PathBuf::from("out/g.fits")));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--quiet", "fringe", "g", "out/g.fits", "--input", "in/a", "--flag", "nopixflat",
                "--flag", "rampcorr", "--flag", "nobiascorr",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_maps_to_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("g").join("g.fits");

        CommandProcessor::new("true")
            .apply(&request(out.clone()))
            .await
            .unwrap();
        assert!(out.parent().unwrap().is_dir());

        let err = CommandProcessor::new("false")
            .apply(&request(out))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Exit { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandProcessor::new("/nonexistent/bokproc")
            .apply(&request(dir.path().join("g.fits")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Spawn { .. }));
    }
}
