//! Language-model backends.
//!
//! The [`LanguageModel`] trait decouples the agents from the concrete backend:
//! an OpenAI-compatible HTTP endpoint, a `codex exec` subprocess, or the
//! network-free [`OfflineModel`](crate::io::offline::OfflineModel). Tests use a
//! scripted model that answers by prompt role.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::Message;
use crate::io::config::{AgentConfig, ModelBackend, ModelConfig};
use crate::io::offline::OfflineModel;
use crate::io::process::run_command_with_timeout;

/// Bytes of an error response body kept in the error message.
const ERROR_BODY_EXCERPT: usize = 500;

/// A chat model: role-tagged messages in, reply text out.
pub trait LanguageModel: Send + Sync {
    fn invoke(&self, messages: &[Message]) -> Result<String>;
}

/// Select the backend named by `cfg.model.backend`.
pub fn build_model(cfg: &AgentConfig) -> Result<Box<dyn LanguageModel>> {
    info!(backend = ?cfg.model.backend, "building language model");
    let model: Box<dyn LanguageModel> = match cfg.model.backend {
        ModelBackend::OpenAi => Box::new(OpenAiChatModel::from_config(&cfg.model)?),
        ModelBackend::Codex => Box::new(CodexModel::new(
            cfg.tools.workspace_root.clone(),
            cfg.model.request_timeout(),
            cfg.tools.output_limit_bytes,
        )),
        ModelBackend::Offline => Box::new(OfflineModel::new()),
    };
    Ok(model)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChatModel {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiChatModel {
    /// Build a client; the API key is read from `cfg.api_key_env`.
    ///
    /// A missing key is allowed so local OpenAI-compatible servers work without one.
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(env = %cfg.api_key_env, "api key not set; sending unauthenticated requests");
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
        })
    }
}

impl LanguageModel for OpenAiChatModel {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    fn invoke(&self, messages: &[Message]) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            let excerpt: String = text.chars().take(ERROR_BODY_EXCERPT).collect();
            warn!(%status, "chat completion failed");
            bail!("chat completion returned {status}: {excerpt}");
        }
        let parsed: ChatResponse = response.json().context("decode chat completion")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat completion had no message content"))?;
        debug!(reply_bytes = content.len(), "chat completion received");
        Ok(content)
    }
}

/// Model backed by `codex exec`, reading the final message from a temp file.
#[derive(Debug, Clone)]
pub struct CodexModel {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CodexModel {
    pub fn new(workdir: PathBuf, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            workdir,
            timeout,
            output_limit_bytes,
        }
    }
}

impl LanguageModel for CodexModel {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs(), messages = messages.len()))]
    fn invoke(&self, messages: &[Message]) -> Result<String> {
        let out_dir = tempfile::tempdir().context("create codex output dir")?;
        let output_path = out_dir.path().join("last_message.txt");

        let mut cmd = Command::new("codex");
        cmd.arg("exec")
            .arg("--sandbox")
            .arg("read-only")
            // Workspaces are not necessarily git repositories.
            .arg("--skip-git-repo-check")
            .arg("--output-last-message")
            .arg(&output_path)
            .arg("-")
            .current_dir(&self.workdir);

        let prompt = render_transcript(messages);
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run codex exec")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "codex exec timed out");
            bail!("codex exec timed out after {:?}", self.timeout);
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex exec failed");
            bail!(
                "codex exec failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            );
        }
        let reply = fs::read_to_string(&output_path)
            .with_context(|| format!("read codex output {}", output_path.display()))?;
        debug!(reply_bytes = reply.len(), "codex exec completed");
        Ok(reply)
    }
}

/// Flatten messages into one prompt for single-input backends.
fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("## {}\n\n{}", m.role.as_str().to_uppercase(), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_rendering_tags_roles() {
        let rendered = render_transcript(&[Message::system("rules"), Message::user("do it ")]);
        assert_eq!(rendered, "## SYSTEM\n\nrules\n\n## USER\n\ndo it");
    }

    #[test]
    fn chat_request_serializes_lowercase_roles() {
        let messages = [Message::system("s"), Message::user("u")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.0,
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "u");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let cfg = ModelConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            api_key_env: "TASKLOOP_TEST_UNSET_KEY".to_string(),
            ..ModelConfig::default()
        };
        let model = OpenAiChatModel::from_config(&cfg).expect("build");
        assert_eq!(model.endpoint, "http://localhost:11434/v1/chat/completions");
        assert!(model.api_key.is_none());
    }

    #[test]
    fn offline_backend_builds_without_network() {
        let model = build_model(&AgentConfig::default()).expect("build");
        let reply = model.invoke(&[Message::user("hello")]).expect("invoke");
        assert!(!reply.is_empty());
    }
}
