use super::{SpeechEngine, TtsConfig};
use crate::core::error::SynthesisError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs a local TTS program once per segment. The text goes on stdin unless
/// an argument mentions `{text}`.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    model: String,
    work_dir: PathBuf,
    concurrency: usize,
    counter: AtomicUsize,
}

impl CommandEngine {
    pub fn new(config: &TtsConfig) -> Result<Self, SynthesisError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| SynthesisError::EngineLoad("tts.command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            model: config.model.clone(),
            work_dir: std::env::temp_dir(),
            concurrency: config.concurrency.max(1),
            counter: AtomicUsize::new(0),
        })
    }

    fn render_args(&self, text: &str, reference: &Path, language: &str, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{text}", text)
                    .replace("{reference}", &reference.to_string_lossy())
                    .replace("{language}", language)
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{model}", &self.model)
            })
            .collect()
    }
}

#[async_trait]
impl SpeechEngine for CommandEngine {
    async fn synthesize(&self, text: &str, reference_audio: &Path, language: &str) -> Result<Vec<u8>> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let output = self
            .work_dir
            .join(format!("hfy-narrator-{}-{}.wav", std::process::id(), n));
        let args = self.render_args(text, reference_audio, language, &output);
        let text_on_stdin = !self.args.iter().any(|a| a.contains("{text}"));
        debug!("Running {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if text_on_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        if text_on_stdin {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    debug!("{} closed stdin early: {}", self.program, e);
                }
            }
        }

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }

        let bytes = tokio::fs::read(&output)
            .await
            .with_context(|| format!("{} wrote no audio to {}", self.program, output.display()))?;
        tokio::fs::remove_file(&output).await.ok();
        Ok(bytes)
    }

    fn max_concurrency(&self) -> usize {
        self.concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(command: &[&str]) -> CommandEngine {
        let config = TtsConfig {
            provider: "command".to_string(),
            model: "es_voice".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        CommandEngine::new(&config).unwrap()
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let e = engine(&["piper", "--model", "{model}", "--speaker-wav", "{reference}", "-f", "{output}"]);
        let args = e.render_args("hola", Path::new("bank/eva.wav"), "es", Path::new("/tmp/o.wav"));
        assert_eq!(
            args,
            vec!["--model", "es_voice", "--speaker-wav", "bank/eva.wav", "-f", "/tmp/o.wav"]
        );
    }

    #[tokio::test]
    async fn test_failing_program_is_an_error() {
        let e = engine(&["false"]);
        let result = e.synthesize("hola", Path::new("x.wav"), "es").await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_file_is_read_back() {
        let e = engine(&["sh", "-c", "printf RIFF > \"$0\"", "{output}"]);
        let bytes = e.synthesize("hola", Path::new("x.wav"), "es").await.unwrap();
        assert_eq!(bytes, b"RIFF");
    }
}
