use anyhow::Result;
use clap::{Parser, Subcommand};
use hfy_narrator::core::config::{Config, DEFAULT_CONFIG_PATH};
use hfy_narrator::core::io::{NativeStorage, Storage};
use hfy_narrator::services::registry::CharacterRegistry;
use hfy_narrator::services::setup::{run_setup, PromptSelector, VoiceSelector};
use hfy_narrator::services::source::StorySource;
use hfy_narrator::services::tts::VoiceBank;
use hfy_narrator::services::workflow::{RunOptions, WorkflowManager};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "hfy-narrator", about = "Turns HFY forum stories into narrated videos")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the whole pipeline on one story.
    Run {
        /// Reddit post URL.
        #[arg(long, conflicts_with = "input", required_unless_present = "input")]
        url: Option<String>,
        /// Plain text file, paragraphs separated by blank lines.
        #[arg(long)]
        input: Option<String>,
        /// Write a WAV file instead of a video.
        #[arg(long)]
        audio_only: bool,
        /// Never prompt for voices.
        #[arg(long)]
        unattended: bool,
    },
    /// List the voice archetypes in the voice bank.
    Voices,
    /// List the characters in the registry.
    Characters,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please ensure '{}' exists with valid LLM settings.", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());

    match cli.command {
        Command::Run {
            url,
            input,
            audio_only,
            unattended,
        } => {
            config.unattended |= unattended;
            let source = match (url, input) {
                (Some(url), _) => StorySource::Url(url),
                (None, Some(path)) => StorySource::File(path),
                (None, None) => {
                    eprintln!("Either --url or --input is required");
                    return ExitCode::FAILURE;
                }
            };
            match run(config, &cli.config, storage, &source, RunOptions { audio_only }).await {
                Ok(output) => {
                    println!("Output written to {}", output.display());
                    ExitCode::SUCCESS
                }
                Err(message) => {
                    eprintln!("{}", message);
                    ExitCode::FAILURE
                }
            }
        }
        Command::Voices => {
            let bank = VoiceBank::load(storage.as_ref(), &config.paths.voice_bank).await;
            for archetype in bank.archetypes() {
                let marker = if archetype == config.tts.narrator_voice { " (narrator)" } else { "" };
                println!("{}{}", archetype, marker);
            }
            ExitCode::SUCCESS
        }
        Command::Characters => {
            let registry = CharacterRegistry::load(storage.as_ref(), &config.paths.character_registry).await;
            for profile in registry.profiles() {
                println!("{}\t{}\t{}", profile.id, profile.name, profile.voice_profile.preset);
            }
            ExitCode::SUCCESS
        }
    }
}

/// Returns the output path, or the message to print on failure.
async fn run(
    mut config: Config,
    config_path: &Path,
    storage: Arc<dyn Storage>,
    source: &StorySource,
    options: RunOptions,
) -> std::result::Result<PathBuf, String> {
    prepare(&mut config, config_path, storage.as_ref())
        .await
        .map_err(|e| format!("Configuration failed: {:#}", e))?;

    let unattended = config.unattended;
    let manager = WorkflowManager::new(config, storage).map_err(|e| format!("{} failed: {}", e.stage(), e))?;
    let mut manager = if unattended {
        manager
    } else {
        manager.with_selector(Box::new(PromptSelector))
    };
    manager
        .run(source, options)
        .await
        .map_err(|e| format!("{} failed: {}", e.stage(), e))
}

async fn prepare(config: &mut Config, config_path: &Path, storage: &dyn Storage) -> Result<()> {
    config.ensure_directories()?;
    let bank = VoiceBank::load(storage, &config.paths.voice_bank).await;
    let selector: Option<&dyn VoiceSelector> = if config.unattended { None } else { Some(&PromptSelector) };
    if run_setup(config, &bank, selector)? {
        config.save(config_path)?;
        println!("Configuration saved.");
    }
    Ok(())
}
