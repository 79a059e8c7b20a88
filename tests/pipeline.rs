use anyhow::Result;
use async_trait::async_trait;
use hfy_narrator::core::config::Config;
use hfy_narrator::core::error::AppError;
use hfy_narrator::core::io::NativeStorage;
use hfy_narrator::core::state::{Scene, Story, NARRATOR_ID};
use hfy_narrator::services::analysis::{default_speech_verbs, RuleBasedAnalyzer};
use hfy_narrator::services::media::VideoCompositor;
use hfy_narrator::services::source::StorySource;
use hfy_narrator::services::translation::TranslationModel;
use hfy_narrator::services::tts::SpeechEngine;
use hfy_narrator::services::workflow::{Components, RunOptions, WorkflowManager};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const STORY: &str = "The captain looked at the crew.\n\n\
\"Are you coming?\" asked Juan. \"Yes,\" replied María.\n\n\
\"Then we leave now.\"";

/// Canned English to Spanish "translation".
struct PhraseBook;

#[async_trait]
impl TranslationModel for PhraseBook {
    async fn translate(&self, batch: &[String]) -> Result<Vec<String>> {
        Ok(batch
            .iter()
            .map(|p| {
                p.replace("The captain looked at the crew.", "La capitana miró a la tripulación.")
                    .replace("Are you coming?", "¿Vienes?")
                    .replace("asked", "preguntó")
                    .replace("Yes,", "Sí,")
                    .replace("replied", "respondió")
                    .replace("Then we leave now.", "Entonces nos vamos ya.")
            })
            .collect())
    }
}

fn wav_bytes(frames: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(500i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Half a second of audio per segment; fails on the text in `fail_on`.
struct FakeSpeech {
    fail_on: Option<&'static str>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl SpeechEngine for FakeSpeech {
    async fn synthesize(&self, text: &str, reference_audio: &Path, _language: &str) -> Result<Vec<u8>> {
        let voice = reference_audio.file_stem().unwrap().to_string_lossy().to_string();
        self.calls.lock().unwrap().push((text.to_string(), voice));
        if self.fail_on == Some(text) {
            anyhow::bail!("synthesis crashed");
        }
        Ok(wav_bytes(4000))
    }
}

#[derive(Default)]
struct FakeCompositor {
    segments: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl VideoCompositor for FakeCompositor {
    async fn create_background(&self, path: &Path) -> Result<()> {
        std::fs::write(path, b"png")?;
        Ok(())
    }

    async fn title_clip(&self, _title: &str, _author: &str, _background: &Path, out: &Path) -> Result<()> {
        std::fs::write(out, b"title")?;
        Ok(())
    }

    async fn segment_clip(&self, text: &str, _audio: &Path, _duration: f64, _background: &Path, out: &Path) -> Result<()> {
        self.segments.lock().unwrap().push(text.to_string());
        std::fs::write(out, b"clip")?;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> Result<()> {
        std::fs::write(out, format!("{} clips", clips.len()))?;
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    config: Config,
    input: String,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let bank = root.join("voice_bank");
    std::fs::create_dir_all(&bank).unwrap();
    std::fs::write(bank.join("narrador.wav"), wav_bytes(10)).unwrap();
    std::fs::write(bank.join("mujer.wav"), wav_bytes(10)).unwrap();

    let input = root.join("The Long Watch.txt");
    std::fs::write(&input, STORY).unwrap();

    let yaml = format!(
        r#"
unattended: true
llm:
  provider: ollama
paths:
  voice_bank: {root}/voice_bank
  build: {root}/build
  output: {root}/output
  character_registry: {root}/characters.json
video:
  default_background: {root}/bg.png
"#,
        root = root.display()
    );
    let config = Config::from_yaml(&yaml).unwrap();
    Fixture {
        _dir: dir,
        root,
        config,
        input: input.to_string_lossy().to_string(),
    }
}

fn components(speech: FakeSpeech, compositor: FakeCompositor) -> Components {
    let mut verbs = default_speech_verbs();
    verbs.push("said".to_string());
    Components {
        translation: Some(Box::new(PhraseBook)),
        analyzer: Box::new(RuleBasedAnalyzer::new(&verbs)),
        speech: Box::new(speech),
        compositor: Box::new(compositor),
    }
}

#[tokio::test]
async fn test_video_pipeline_end_to_end() -> Result<()> {
    let fx = fixture();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let compositor = FakeCompositor::default();
    let rendered = compositor.segments.clone();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = progress.clone();

    let mut manager = WorkflowManager::with_components(
        fx.config.clone(),
        Arc::new(NativeStorage::new()),
        components(
            FakeSpeech {
                fail_on: Some("Sí,"),
                calls: calls.clone(),
            },
            compositor,
        ),
    )
    .on_progress(Box::new(move |fraction: f32, _: &str| seen.lock().unwrap().push(fraction)));

    let output = manager
        .run(&StorySource::File(fx.input.clone()), RunOptions::default())
        .await?;

    assert_eq!(output, fx.root.join("output").join("The_Long_Watch.mp4"));
    assert_eq!(std::fs::read_to_string(&output)?, "6 clips");
    assert_eq!(*progress.lock().unwrap(), vec![0.05, 0.15, 0.40, 0.50, 0.85, 1.0]);

    // Characters are unknown to the bank, so every voice is the narrator's.
    let calls = calls.lock().unwrap().clone();
    assert!(calls.iter().all(|(_, voice)| voice == "narrador"));
    assert_eq!(calls.len(), 6);

    // The failed segment is left out of the video, the run goes on.
    let rendered = rendered.lock().unwrap().clone();
    assert_eq!(rendered.len(), 5);
    assert!(!rendered.contains(&"Sí,".to_string()));

    let build = fx.root.join("build").join("The_Long_Watch");
    let story: Story = serde_json::from_slice(&std::fs::read(build.join("story.json"))?)?;
    let speakers: Vec<(&str, &str)> = story
        .script
        .iter()
        .map(|d| (d.character_id.as_str(), d.text.as_str()))
        .collect();
    assert_eq!(
        speakers,
        vec![
            (NARRATOR_ID, "La capitana miró a la tripulación."),
            ("juan", "¿Vienes?"),
            (NARRATOR_ID, "preguntó Juan."),
            ("maría", "Sí,"),
            (NARRATOR_ID, "respondió María."),
            ("maría", "Entonces nos vamos ya."),
        ]
    );
    assert!(story.script[3].audio_path.is_none());

    let scenes: Vec<Scene> = serde_json::from_slice(&std::fs::read(build.join("scenes.json"))?)?;
    assert_eq!(scenes.len(), story.script.len());
    assert_eq!(scenes[1].scene_id, "The_Long_Watch_s002");
    assert_eq!(scenes[1].speaker, "juan");
    assert_eq!(scenes[1].image_path, Some(format!("{}/bg.png", fx.root.display())));
    assert_eq!(scenes[0].duration, Some(0.5));

    let registry = std::fs::read_to_string(fx.root.join("characters.json"))?;
    assert!(registry.contains("\"juan\""));
    Ok(())
}

#[tokio::test]
async fn test_audio_only_pipeline_with_registry_voice() -> Result<()> {
    let fx = fixture();
    std::fs::write(
        fx.root.join("characters.json"),
        r#"{"maría": {"id": "maría", "name": "María", "voice_profile": {"model": "", "preset": "mujer"}}}"#,
    )?;
    let calls = Arc::new(Mutex::new(Vec::new()));

    let mut manager = WorkflowManager::with_components(
        fx.config.clone(),
        Arc::new(NativeStorage::new()),
        components(
            FakeSpeech {
                fail_on: None,
                calls: calls.clone(),
            },
            FakeCompositor::default(),
        ),
    );
    let output = manager
        .run(
            &StorySource::File(fx.input.clone()),
            RunOptions { audio_only: true },
        )
        .await?;

    assert_eq!(output, fx.root.join("output").join("The_Long_Watch.wav"));
    let reader = hound::WavReader::open(&output)?;
    // 6 segments of 0.5 s and 5 gaps of 0.3 s.
    let seconds = reader.duration() as f64 / reader.spec().sample_rate as f64;
    assert!((seconds - 4.5).abs() < 1e-6);

    let calls = calls.lock().unwrap().clone();
    let maria_voices: Vec<&str> = calls
        .iter()
        .filter(|(text, _)| text == "Sí," || text == "Entonces nos vamos ya.")
        .map(|(_, voice)| voice.as_str())
        .collect();
    assert_eq!(maria_voices, vec!["mujer", "mujer"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_narrator_voice_halts_at_synthesis() {
    let mut fx = fixture();
    fx.config.tts.narrator_voice = "locutor".to_string();

    let mut manager = WorkflowManager::with_components(
        fx.config.clone(),
        Arc::new(NativeStorage::new()),
        components(
            FakeSpeech {
                fail_on: None,
                calls: Arc::new(Mutex::new(Vec::new())),
            },
            FakeCompositor::default(),
        ),
    );
    let err = manager
        .run(&StorySource::File(fx.input.clone()), RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Synthesis(_)));
    assert_eq!(err.stage(), "Speech synthesis");
    assert!(!fx.root.join("output").join("The_Long_Watch.mp4").exists());
}

#[tokio::test]
async fn test_missing_input_is_a_fetch_error() {
    let fx = fixture();
    let mut manager = WorkflowManager::with_components(
        fx.config.clone(),
        Arc::new(NativeStorage::new()),
        components(
            FakeSpeech {
                fail_on: None,
                calls: Arc::new(Mutex::new(Vec::new())),
            },
            FakeCompositor::default(),
        ),
    );
    let err = manager
        .run(
            &StorySource::File(fx.root.join("nope.txt").to_string_lossy().to_string()),
            RunOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "Fetch");
}
