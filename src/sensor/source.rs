//! Sensor helper scripts as line sources.
//!
//! Each acquisition attempt starts the helper afresh and reads its stdout
//! line by line. Dropping the line iterator kills and reaps the helper, so
//! the retry loop can stop at the first good reading without draining the
//! rest of the output.

use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::logging::{self, DataSource};
use crate::model::AcquireError;

/// Something that can be (re)started to produce lines of sensor output.
pub trait LineSource {
    type Lines: Iterator<Item = String>;

    /// Starts one invocation of the source.
    fn start(&mut self) -> Result<Self::Lines, AcquireError>;

    /// Name used in log messages, normally the sensor location.
    fn name(&self) -> &str;
}

/// A helper script run through a shell, e.g. `sh read_Mi_Temp_Humid_Kitchen.sh`.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    shell: String,
    script: PathBuf,
    name: String,
}

impl ScriptSource {
    pub fn new(shell: &str, script: &Path) -> Self {
        Self {
            shell: shell.to_string(),
            script: script.to_path_buf(),
            name: sensor_name(script),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl LineSource for ScriptSource {
    type Lines = ScriptLines;

    fn start(&mut self) -> Result<ScriptLines, AcquireError> {
        let mut child = Command::new(&self.shell)
            .arg(&self.script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                AcquireError::Source(format!("cannot start {}: {}", self.script.display(), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AcquireError::Source("helper stdout not captured".to_string()))?;

        Ok(ScriptLines {
            child,
            lines: BufReader::new(stdout).lines(),
            name: self.name.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Lines of one running helper process.
pub struct ScriptLines {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    name: String,
}

impl Iterator for ScriptLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self.lines.next()? {
            Ok(line) => Some(line),
            Err(e) => {
                // Non-UTF-8 garbage or a broken pipe ends this invocation.
                logging::warn(
                    DataSource::Sensor,
                    Some(&self.name),
                    &format!("Cannot read helper output: {}", e),
                );
                None
            }
        }
    }
}

impl Drop for ScriptLines {
    fn drop(&mut self) {
        // Fails harmlessly if the helper already exited.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Derives a display name from a helper file name:
/// `read_Mi_Temp_Humid_Kitchen.sh` → `Kitchen`.
pub fn sensor_name(script: &Path) -> String {
    let stem = script
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match stem.rsplit_once("Mi_Temp_Humid_") {
        Some((_, location)) if !location.is_empty() => location.to_string(),
        _ => stem.to_string(),
    }
}
