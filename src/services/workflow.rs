use crate::core::config::Config;
use crate::core::error::{AppError, AppResult};
use crate::core::io::{write_json, Storage};
use crate::core::state::{scene_id, Scene, Story};
use crate::services::analysis::{create_analyzer, DialogueAnalyzer, LanguageAnalyzer};
use crate::services::media::{FfmpegCompositor, MediaAssembler, VideoCompositor};
use crate::services::registry::CharacterRegistry;
use crate::services::setup::{assign_voices, VoiceSelector};
use crate::services::source::{read_text_file, StoryFetcher, StorySource};
use crate::services::translation::{LlmTranslationModel, TranslationModel, Translator};
use crate::services::tts::{create_speech_engine, SpeechEngine, SpeechSynthesizer, VoiceBank};
use crate::utils::audio::wav_duration;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Called with the fraction of the run completed and a short status line.
pub type ProgressCallback = Box<dyn Fn(f32, &str) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Write a WAV file instead of a video.
    pub audio_only: bool,
}

/// The replaceable models behind each stage.
pub struct Components {
    pub translation: Option<Box<dyn TranslationModel>>,
    pub analyzer: Box<dyn LanguageAnalyzer>,
    pub speech: Box<dyn SpeechEngine>,
    pub compositor: Box<dyn VideoCompositor>,
}

impl Components {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let translation: Option<Box<dyn TranslationModel>> = if config.translation.enabled {
            Some(Box::new(LlmTranslationModel::from_config(
                &config.llm,
                &config.translation,
            )?))
        } else {
            None
        };
        Ok(Self {
            translation,
            analyzer: create_analyzer(&config.dialogue_analysis, &config.llm)?,
            speech: create_speech_engine(&config.tts)?,
            compositor: Box::new(FfmpegCompositor::new(&config.video)),
        })
    }
}

pub struct WorkflowManager {
    config: Config,
    storage: Arc<dyn Storage>,
    translator: Option<Translator>,
    analyzer: DialogueAnalyzer,
    synthesizer: SpeechSynthesizer,
    assembler: MediaAssembler,
    selector: Option<Box<dyn VoiceSelector>>,
    progress: Option<ProgressCallback>,
}

impl WorkflowManager {
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> AppResult<Self> {
        let components = Components::from_config(&config)?;
        Ok(Self::with_components(config, storage, components))
    }

    pub fn with_components(config: Config, storage: Arc<dyn Storage>, components: Components) -> Self {
        let translator = components
            .translation
            .filter(|_| config.translation.enabled)
            .map(|model| Translator::new(model, &config.translation));
        let analyzer = DialogueAnalyzer::new(components.analyzer, config.dialogue_analysis.clone());
        let synthesizer = SpeechSynthesizer::new(components.speech, VoiceBank::default(), &config.tts);
        let assembler = MediaAssembler::new(&config.audio, &config.video, components.compositor);
        Self {
            config,
            storage,
            translator,
            analyzer,
            synthesizer,
            assembler,
            selector: None,
            progress: None,
        }
    }

    /// Interactive voice selection for characters missing from the bank.
    /// Ignored when the config is unattended.
    pub fn with_selector(mut self, selector: Box<dyn VoiceSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report(&self, fraction: f32, message: &str) {
        info!("[{:>3.0}%] {}", fraction * 100.0, message);
        if let Some(cb) = &self.progress {
            cb(fraction, message);
        }
    }

    /// Runs every stage in order and returns the path of the final file.
    pub async fn run(&mut self, source: &StorySource, options: RunOptions) -> AppResult<PathBuf> {
        match self.run_stages(source, options).await {
            Ok(path) => {
                self.report(1.0, "Done");
                Ok(path)
            }
            Err(e) => {
                error!("{} failed: {}", e.stage(), e);
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self, source: &StorySource, options: RunOptions) -> AppResult<PathBuf> {
        self.report(0.05, "Fetching story");
        let mut story = self.load_story(source).await?;
        let build_dir = Path::new(&self.config.paths.build).join(story.slug());
        self.save_story(&story, &build_dir).await?;

        self.report(0.15, "Translating");
        match self.translator.as_mut() {
            Some(translator) => translator.translate_story(&mut story).await?,
            None => {
                info!("Translation disabled, using the original text");
                story.translated_text = story.original_text.clone();
            }
        }
        self.save_story(&story, &build_dir).await?;

        self.report(0.40, "Analyzing dialogue");
        self.analyzer.analyze_story(&mut story).await?;
        let bank = VoiceBank::load(self.storage.as_ref(), &self.config.paths.voice_bank).await;
        self.synthesizer.set_voice_bank(bank);
        self.cast_voices(&mut story).await?;
        self.save_story(&story, &build_dir).await?;

        self.report(0.50, "Synthesizing speech");
        let audio_dir = build_dir.join("audio");
        self.synthesizer
            .synthesize_story(&mut story, self.storage.as_ref(), &audio_dir.to_string_lossy())
            .await?;
        let video = !options.audio_only && self.config.video.enabled;
        self.save_story(&story, &build_dir).await?;
        self.save_scenes(&story, &build_dir, video).await?;

        self.report(0.85, "Assembling media");
        let output_dir = Path::new(&self.config.paths.output);
        let output = if !video {
            self.assembler
                .assemble_audio(&story, &output_dir.join(format!("{}.wav", story.slug())))
                .await?
        } else {
            self.assembler
                .assemble_video(&story, &build_dir, &output_dir.join(format!("{}.mp4", story.slug())))
                .await?
        };
        Ok(output)
    }

    async fn load_story(&self, source: &StorySource) -> AppResult<Story> {
        match source {
            StorySource::Url(url) => {
                let fetcher = StoryFetcher::new(&self.config.source)?;
                fetcher.fetch(url).await
            }
            StorySource::File(path) => Ok(read_text_file(path).await?),
        }
    }

    /// Registry presets first, then interactive picks, then remember the cast.
    async fn cast_voices(&self, story: &mut Story) -> AppResult<()> {
        let registry_path = &self.config.paths.character_registry;
        let mut registry = CharacterRegistry::load(self.storage.as_ref(), registry_path).await;
        registry.apply_presets(&mut story.characters);

        let selector = if self.config.unattended {
            None
        } else {
            self.selector.as_deref()
        };
        let assigned = assign_voices(&mut story.characters, self.synthesizer.voice_bank(), selector)
            .map_err(|e| AppError::Config(format!("voice selection failed: {:#}", e)))?;
        if assigned > 0 {
            info!("Assigned voices to {} characters", assigned);
        }

        registry.remember(&story.characters);
        if let Err(e) = registry.save(self.storage.as_ref()).await {
            error!("Error saving character registry to {}: {:#}", registry_path, e);
        }
        Ok(())
    }

    async fn save_story(&self, story: &Story, build_dir: &Path) -> AppResult<()> {
        let path = build_dir.join("story.json");
        write_json(self.storage.as_ref(), &path.to_string_lossy(), story).await?;
        Ok(())
    }

    async fn save_scenes(&self, story: &Story, build_dir: &Path, video: bool) -> AppResult<()> {
        let path = build_dir.join("scenes.json");
        let background = video.then_some(self.config.video.default_background.as_str());
        write_json(self.storage.as_ref(), &path.to_string_lossy(), &build_scenes(story, background)).await?;
        Ok(())
    }
}

/// The script as scenes, with the playing time of each synthesized segment.
/// `background` is the still image behind every scene when a video is made.
pub fn build_scenes(story: &Story, background: Option<&str>) -> Vec<Scene> {
    let slug = story.slug();
    story
        .script
        .iter()
        .enumerate()
        .map(|(i, dialogue)| Scene {
            scene_id: scene_id(&slug, i),
            speaker: dialogue.character_id.clone(),
            text: dialogue.text.clone(),
            image_path: background.map(str::to_string),
            audio_path: dialogue.audio_path.clone(),
            duration: dialogue
                .audio_path
                .as_deref()
                .and_then(|p| wav_duration(Path::new(p)).ok()),
        })
        .collect()
}
