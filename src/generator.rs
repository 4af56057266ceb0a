use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::cli::ResponseFormat;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatHint {
    Json,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub format: FormatHint,
    pub model_name: String,
    pub attachments: Vec<Vec<u8>>,
    pub enable_search: bool,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub metadata: Value,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("failed to launch generator `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("generator was rate limited: {0}")]
    RateLimited(String),

    #[error("generator backend reported a server error: {0}")]
    Server(String),

    #[error("generator could not reach its backend: {0}")]
    Network(String),

    #[error("generator returned an invalid response envelope: {0}")]
    InvalidEnvelope(String),

    #[error("failed to read replay response {}: {source}", path.display())]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The language-model collaborator.
///
/// Only the text of a response matters to the pipeline; metadata is opaque
/// and shown to the operator when parsing fails. Backends never retry and
/// never time out on their own.
pub trait Generator {
    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GeneratorError>;
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    prompt: &'a str,
    format: FormatHint,
    model: &'a str,
    enable_search: bool,
    attachments: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    kind: String,
    #[serde(default)]
    message: String,
}

/// Runs an external program that talks to the model.
///
/// The program receives a JSON request on stdin and prints either the model
/// text itself or a response envelope, depending on `response_format`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    pub program: String,
    pub args: Vec<String>,
    pub response_format: ResponseFormat,
}

impl Generator for CommandGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GeneratorError> {
        let envelope = RequestEnvelope {
            prompt: &request.prompt,
            format: request.format,
            model: &request.model_name,
            enable_search: request.enable_search,
            attachments: request
                .attachments
                .iter()
                .map(|bytes| BASE64.encode(bytes))
                .collect(),
        };
        let payload = serde_json::to_vec(&envelope)
            .map_err(|err| GeneratorError::InvalidEnvelope(err.to_string()))?;

        info!(
            program = %self.program,
            model = %request.model_name,
            prompt_chars = request.prompt.chars().count(),
            attachments = request.attachments.len(),
            "invoking generator"
        );

        let launch_error = |source: std::io::Error| GeneratorError::Launch {
            program: self.program.clone(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(launch_error)?;

        // stdin is written on its own thread while stdout and stderr drain.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(&payload) {
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                result => result,
            })
        });
        let output = child.wait_with_output().map_err(launch_error)?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(launch_error(err)),
                Err(_) => {
                    return Err(launch_error(std::io::Error::other(
                        "stdin writer thread panicked",
                    )));
                }
            }
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(GeneratorError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(stdout_len = stdout.len(), "generator finished");

        match self.response_format {
            ResponseFormat::Raw => Ok(Generation {
                text: stdout,
                metadata: json!({
                    "backend": "command",
                    "program": self.program,
                    "exit_status": output.status.code(),
                    "stderr": stderr,
                }),
            }),
            ResponseFormat::Envelope => parse_response_envelope(&stdout),
        }
    }
}

fn parse_response_envelope(stdout: &str) -> Result<Generation, GeneratorError> {
    let envelope: ResponseEnvelope = serde_json::from_str(stdout.trim())
        .map_err(|err| GeneratorError::InvalidEnvelope(err.to_string()))?;

    if let Some(error) = envelope.error {
        return Err(match error.kind.as_str() {
            "rate_limited" => GeneratorError::RateLimited(error.message),
            "server" => GeneratorError::Server(error.message),
            "network" => GeneratorError::Network(error.message),
            other => GeneratorError::Failed {
                status: other.to_string(),
                stderr: error.message,
            },
        });
    }

    let Some(text) = envelope.text else {
        return Err(GeneratorError::InvalidEnvelope(
            "envelope has neither `text` nor `error`".to_string(),
        ));
    };

    Ok(Generation {
        text,
        metadata: envelope.metadata,
    })
}

/// Serves a previously captured model response from disk.
#[derive(Debug, Clone)]
pub struct ReplayGenerator {
    pub path: PathBuf,
}

impl Generator for ReplayGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Generation, GeneratorError> {
        let text = fs::read_to_string(&self.path).map_err(|source| GeneratorError::Replay {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), model = %request.model_name, "replaying captured response");

        Ok(Generation {
            text,
            metadata: json!({
                "backend": "replay",
                "path": self.path.display().to_string(),
            }),
        })
    }
}
