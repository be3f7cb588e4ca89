//! External tool steps: script transpiling and minification.
//!
//! The [`ExternalProcessor`] trait is the seam between the compiler and the
//! outside world. [`CommandProcessor`] runs the argv configured for each step
//! under `[processors]`. Data goes through stdin/stdout unless an argument
//! contains `{input}` or `{output}`, in which case the placeholder is replaced
//! by a temporary file path and the tool reads or writes that file instead.
//! A step with no command configured passes its input through unchanged.

use crate::config::ProcessorsConfig;
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use thiserror::Error;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to start `{program}` for {step}: {source}")]
    Spawn {
        step: ProcessorStep,
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{step} failed ({status}): {stderr}")]
    Failed {
        step: ProcessorStep,
        status: String,
        stderr: String,
    },
}

/// One transformation an external tool can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorStep {
    TranspileScript,
    MinifyStylesheet,
    MinifyScript,
    MinifyMarkup,
}

impl fmt::Display for ProcessorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TranspileScript => "transpile_script",
            Self::MinifyStylesheet => "minify_stylesheet",
            Self::MinifyScript => "minify_script",
            Self::MinifyMarkup => "minify_markup",
        })
    }
}

/// Runs one processing step over an in-memory buffer.
pub trait ExternalProcessor {
    fn run(&self, input: &[u8], step: ProcessorStep) -> Result<Vec<u8>, ProcessorError>;
}

/// Processor backed by configured command lines.
#[derive(Debug, Clone, Default)]
pub struct CommandProcessor {
    commands: ProcessorsConfig,
}

impl CommandProcessor {
    pub fn new(commands: ProcessorsConfig) -> Self {
        Self { commands }
    }

    fn argv(&self, step: ProcessorStep) -> &[String] {
        match step {
            ProcessorStep::TranspileScript => &self.commands.transpile_script,
            ProcessorStep::MinifyStylesheet => &self.commands.minify_stylesheet,
            ProcessorStep::MinifyScript => &self.commands.minify_script,
            ProcessorStep::MinifyMarkup => &self.commands.minify_markup,
        }
    }
}

impl ExternalProcessor for CommandProcessor {
    fn run(&self, input: &[u8], step: ProcessorStep) -> Result<Vec<u8>, ProcessorError> {
        let argv = self.argv(step);
        let Some((program, args)) = argv.split_first() else {
            return Ok(input.to_vec());
        };
        let uses_files = argv
            .iter()
            .any(|a| a.contains(INPUT_PLACEHOLDER) || a.contains(OUTPUT_PLACEHOLDER));
        log::debug!("{step}: running {}", argv.join(" "));

        if uses_files {
            run_with_files(program, args, input, step)
        } else {
            run_piped(program, args, input, step)
        }
    }
}

fn spawn_error(step: ProcessorStep, program: &str) -> impl FnOnce(io::Error) -> ProcessorError {
    let program = program.to_string();
    move |source| ProcessorError::Spawn {
        step,
        program,
        source,
    }
}

fn check_status(step: ProcessorStep, output: &std::process::Output) -> Result<(), ProcessorError> {
    if output.status.success() {
        return Ok(());
    }
    Err(ProcessorError::Failed {
        step,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn run_piped(
    program: &str,
    args: &[String],
    input: &[u8],
    step: ProcessorStep,
) -> Result<Vec<u8>, ProcessorError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error(step, program))?;

    // Feed stdin from another thread so a tool that streams output before
    // reading all of its input cannot fill the pipe and stall.
    let mut stdin = child.stdin.take().ok_or_else(|| {
        io::Error::other(format!("{program}: stdin was not captured"))
    })?;
    let data = input.to_vec();
    let writer = std::thread::spawn(move || stdin.write_all(&data));

    let output = child.wait_with_output()?;
    match writer.join() {
        Ok(Ok(())) => {}
        // The tool may exit without draining stdin; its status decides.
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(io::Error::other("stdin writer panicked").into()),
    }
    check_status(step, &output)?;
    Ok(output.stdout)
}

fn run_with_files(
    program: &str,
    args: &[String],
    input: &[u8],
    step: ProcessorStep,
) -> Result<Vec<u8>, ProcessorError> {
    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("input");
    let output_path = dir.path().join("output");
    std::fs::write(&input_path, input)?;

    let input_str = input_path.to_string_lossy();
    let output_str = output_path.to_string_lossy();
    let mut writes_file = false;
    let args: Vec<String> = args
        .iter()
        .map(|a| {
            writes_file |= a.contains(OUTPUT_PLACEHOLDER);
            a.replace(INPUT_PLACEHOLDER, &input_str)
                .replace(OUTPUT_PLACEHOLDER, &output_str)
        })
        .collect();

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(spawn_error(step, program))?;
    check_status(step, &output)?;

    if writes_file {
        Ok(std::fs::read(&output_path)?)
    } else {
        Ok(output.stdout)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock processor that records each step and returns its input, or
    /// fails the configured step.
    #[derive(Default, Clone)]
    pub struct MockProcessor {
        pub operations: Arc<Mutex<Vec<RecordedOp>>>,
        pub fail_on: Option<ProcessorStep>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedOp {
        pub step: ProcessorStep,
        pub input: String,
    }

    impl MockProcessor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(step: ProcessorStep) -> Self {
            Self {
                fail_on: Some(step),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ExternalProcessor for MockProcessor {
        fn run(&self, input: &[u8], step: ProcessorStep) -> Result<Vec<u8>, ProcessorError> {
            self.operations.lock().unwrap().push(RecordedOp {
                step,
                input: String::from_utf8_lossy(input).to_string(),
            });
            if self.fail_on == Some(step) {
                return Err(ProcessorError::Failed {
                    step,
                    status: "exit status: 1".to_string(),
                    stderr: "mock failure".to_string(),
                });
            }
            Ok(input.to_vec())
        }
    }

    fn processor(step_cmd: &[&str]) -> CommandProcessor {
        CommandProcessor::new(ProcessorsConfig {
            minify_stylesheet: step_cmd.iter().map(|s| s.to_string()).collect(),
            ..ProcessorsConfig::default()
        })
    }

    #[test]
    fn unconfigured_step_passes_through() {
        let p = CommandProcessor::default();
        let out = p.run(b"body { }", ProcessorStep::MinifyStylesheet).unwrap();
        assert_eq!(out, b"body { }");
    }

    #[test]
    fn piped_command() {
        let p = processor(&["tr", "a-z", "A-Z"]);
        let out = p.run(b"body", ProcessorStep::MinifyStylesheet).unwrap();
        assert_eq!(out, b"BODY");
    }

    #[test]
    fn file_placeholders() {
        let p = processor(&["cp", "{input}", "{output}"]);
        let out = p.run(b"copied", ProcessorStep::MinifyStylesheet).unwrap();
        assert_eq!(out, b"copied");
    }

    #[test]
    fn input_placeholder_reads_stdout() {
        let p = processor(&["cat", "{input}"]);
        let out = p.run(b"via stdout", ProcessorStep::MinifyStylesheet).unwrap();
        assert_eq!(out, b"via stdout");
    }

    #[test]
    fn non_zero_exit_is_failure_with_stderr() {
        let p = processor(&["sh", "-c", "echo broken >&2; exit 3"]);
        let err = p.run(b"", ProcessorStep::MinifyStylesheet).unwrap_err();
        match err {
            ProcessorError::Failed { step, stderr, .. } => {
                assert_eq!(step, ProcessorStep::MinifyStylesheet);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let p = processor(&["definitely-not-a-real-tool-4821"]);
        let err = p.run(b"", ProcessorStep::MinifyStylesheet).unwrap_err();
        assert!(matches!(err, ProcessorError::Spawn { .. }));
    }

    #[test]
    fn mock_records_steps() {
        let mock = MockProcessor::new();
        mock.run(b"x = 1", ProcessorStep::TranspileScript).unwrap();
        let ops = mock.get_operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].step, ProcessorStep::TranspileScript);
        assert_eq!(ops[0].input, "x = 1");
    }

    #[test]
    fn step_names_match_config_keys() {
        assert_eq!(ProcessorStep::MinifyMarkup.to_string(), "minify_markup");
        assert_eq!(ProcessorStep::TranspileScript.to_string(), "transpile_script");
    }
}
