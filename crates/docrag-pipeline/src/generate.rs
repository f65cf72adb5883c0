//! Answer generation through an external program.
//!
//! The program gets one JSON request on stdin and answers on stdout, so any
//! local model runner can sit behind it.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::debug;

use docrag_core::config::GenerationSettings;
use docrag_core::types::AnswerStyle;
use docrag_core::AnswerGenerator;

#[derive(Serialize)]
struct GenerationRequest<'a> {
    query: &'a str,
    context: &'a str,
    style: AnswerStyle,
}

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// `None` when no command is configured.
    pub fn from_settings(settings: &GenerationSettings) -> Option<Self> {
        let (program, args) = settings.command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn program(&self) -> &str { &self.program }
}

impl AnswerGenerator for CommandGenerator {
    fn generate(&self, context: &str, query: &str, style: AnswerStyle) -> anyhow::Result<String> {
        let request = serde_json::to_vec(&GenerationRequest { query, context, style })?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("cannot start generator {}", self.program))?;

        // stdin is closed when the handle drops, which ends the request
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request).context("writing generator request")?;
        }
        let output = child.wait_with_output().context("waiting for generator")?;
        if !output.status.success() {
            bail!(
                "generator {} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let answer = String::from_utf8(output.stdout).context("generator output is not UTF-8")?;
        let answer = answer.trim();
        if answer.is_empty() {
            bail!("generator {} produced an empty answer", self.program);
        }
        debug!(program = %self.program, ?style, bytes = answer.len(), "generated answer");
        Ok(answer.to_string())
    }
}

/// The configured generator, ready to hand to `Retriever::with_generator`.
pub fn configured_generator(settings: &GenerationSettings) -> Option<Arc<dyn AnswerGenerator>> {
    CommandGenerator::from_settings(settings).map(|g| Arc::new(g) as Arc<dyn AnswerGenerator>)
}
