//! Dependency synchronization through the external build tool.
//!
//! Runs `clean` and then `-f <manifest> dependency:copy-dependencies` in the
//! group's library directory, whether or not the manifest exists. Every
//! failure here is logged and swallowed: a refresh continues with whatever
//! archives are already on disk.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use groupenv_core::config::BuildToolConfig;

#[derive(Debug, Clone)]
pub struct DependencySync {
    cfg: BuildToolConfig,
}

impl DependencySync {
    pub fn new(cfg: BuildToolConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &BuildToolConfig {
        &self.cfg
    }

    /// Build tool executable: explicit override, then the first tool home,
    /// then the bare program name.
    pub fn resolve_program(&self) -> PathBuf {
        if let Some(ref program) = self.cfg.program_override {
            return PathBuf::from(program);
        }
        if let Some(home) = self.cfg.tool_homes.first() {
            return home.join("bin").join(&self.cfg.default_program);
        }
        PathBuf::from(&self.cfg.default_program)
    }

    /// Clean and re-fetch the declared dependencies. Returns the combined
    /// output of both invocations.
    pub fn sync(&self, library_dir: &Path, manifest_path: &Path) -> String {
        if !library_dir.is_dir() {
            tracing::warn!(
                dir = %library_dir.display(),
                "Dependency sync skipped, library directory does not exist"
            );
            return String::new();
        }
        if !manifest_path.is_file() {
            tracing::warn!(
                manifest = %manifest_path.display(),
                "No dependency manifest; running the build tool anyway"
            );
        }

        let program = self.resolve_program();
        if program.components().count() == 1 && which::which(&program).is_err() {
            tracing::warn!(
                program = %program.display(),
                "Build tool not found on PATH; set GROUPENV_BUILD_TOOL or MAVEN_HOME"
            );
        }

        let mut output = self.run(library_dir, &program, &self.cfg.clean_args);

        let mut fetch_args = vec!["-f".to_string(), manifest_path.to_string_lossy().to_string()];
        fetch_args.extend(self.cfg.fetch_args.iter().cloned());
        output.push_str(&self.run(library_dir, &program, &fetch_args));
        output
    }

    fn command_line(&self, program: &Path, args: &[String]) -> (PathBuf, Vec<String>) {
        if self.cfg.wrap_in_shell {
            let mut wrapped = vec!["/c".to_string(), program.to_string_lossy().to_string()];
            wrapped.extend(args.iter().cloned());
            (PathBuf::from("cmd"), wrapped)
        } else {
            (program.to_path_buf(), args.to_vec())
        }
    }

    fn run(&self, dir: &Path, program: &Path, args: &[String]) -> String {
        let (program, args) = self.command_line(program, args);
        tracing::info!(program = %program.display(), ?args, dir = %dir.display(), "exec");
        match execute(dir, &program, &args) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    program = %program.display(),
                    "Dependency sync invocation failed: {}",
                    e
                );
                String::new()
            }
        }
    }
}

/// Run to completion with stdout and stderr merged into one stream.
fn execute(dir: &Path, program: &Path, args: &[String]) -> std::io::Result<String> {
    let (reader, writer) = os_pipe::pipe()?;
    let writer_err = writer.try_clone()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_err);
    let mut child = cmd.spawn()?;
    // The command still owns both write ends; drop them so the read sees EOF.
    drop(cmd);

    let mut output = String::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                tracing::info!("{}", line);
                output.push_str(line);
                output.push('\n');
            }
            Err(e) => {
                tracing::warn!("Stopped reading build tool output: {}", e);
                break;
            }
        }
    }

    let status = child.wait()?;
    if status.success() {
        tracing::info!("Process ended");
    } else {
        tracing::warn!(%status, "Build tool exited unsuccessfully");
    }
    Ok(output)
}
