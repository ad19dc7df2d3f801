use super::ExtractionBackend;
use nestdiff_common::NestDiffError;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Literal(&'static str),
    Dest,
    Artifact,
}

/// Extraction delegated to an external decompiler
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<Arg>,
}

impl CommandBackend {
    /// `jadx -d <dest> -e <apk>`
    pub fn jadx(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: vec![Arg::Literal("-d"), Arg::Dest, Arg::Literal("-e"), Arg::Artifact],
        }
    }

    /// `jd-cli -od <dest> <jar>`
    pub fn jd_cli(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: vec![Arg::Literal("-od"), Arg::Dest, Arg::Artifact],
        }
    }

    fn build(&self, program: &Path, artifact: &Path, dest: &Path) -> Command {
        let mut command = Command::new(program);
        for arg in &self.args {
            match arg {
                Arg::Literal(text) => command.arg(text),
                Arg::Dest => command.arg(dest),
                Arg::Artifact => command.arg(artifact),
            };
        }
        command
    }
}

impl ExtractionBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.program
    }

    /// Decompilers commonly exit non-zero after emitting most of their
    /// output; that case is kept with a warning. A failure that produced
    /// nothing is an error.
    fn extract(&self, artifact: &Path, dest: &Path) -> Result<(), NestDiffError> {
        let program = which::which(&self.program)
            .map_err(|_| NestDiffError::ToolMissing(self.program.clone()))?;

        let mut command = self.build(&program, artifact, dest);
        debug!("$ {:?}", command);
        let output = command.output()?;

        if output.status.success() {
            return Ok(());
        }

        let produced_output = fs::read_dir(dest)?.next().is_some();
        if produced_output {
            warn!(
                "{} exited with {} for {}; keeping partial output",
                self.program,
                output.status,
                artifact.display()
            );
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| format!("{}: {}", output.status, line.trim()))
            .unwrap_or_else(|| output.status.to_string());
        Err(NestDiffError::Extraction {
            tool: self.program.clone(),
            artifact: artifact.to_path_buf(),
            reason,
        })
    }
}
