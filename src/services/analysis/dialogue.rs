use super::{children, Dependency, LanguageAnalyzer};
use crate::core::state::{Character, Dialogue, QuoteMarks, NARRATOR_ID};
use crate::utils::text::split_paragraphs;
use log::debug;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn quote_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(["«“])([^"»”]+)(["»”])"#).expect("quote pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionRule {
    /// The subject of a speech verb is a known character.
    SpeechVerb,
    /// A known character's name occurs in the context.
    NameMention,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub character_id: String,
    pub rule: AttributionRule,
}

pub struct SpeakerAttributor<'a> {
    analyzer: &'a dyn LanguageAnalyzer,
    speech_verbs: HashSet<String>,
}

impl<'a> SpeakerAttributor<'a> {
    pub fn new(analyzer: &'a dyn LanguageAnalyzer, speech_verbs: &[String]) -> Self {
        Self {
            analyzer,
            speech_verbs: speech_verbs.iter().map(|v| v.to_lowercase()).collect(),
        }
    }

    /// Finds the speaker of a quote from the text that follows it. Characters
    /// are tried in registry order.
    pub fn resolve(&self, context: &str, characters: &[Character]) -> Option<Attribution> {
        if context.trim().is_empty() || characters.is_empty() {
            return None;
        }

        let tokens = self.analyzer.parse(context);
        for (i, token) in tokens.iter().enumerate() {
            if !self.speech_verbs.contains(&token.lemma) {
                continue;
            }
            for child in children(&tokens, i).filter(|t| t.dep == Dependency::Subject) {
                if let Some(c) = characters.iter().find(|c| c.name == child.text) {
                    return Some(Attribution {
                        character_id: c.id.clone(),
                        rule: AttributionRule::SpeechVerb,
                    });
                }
            }
        }

        characters
            .iter()
            .find(|c| !c.name.is_empty() && context.contains(c.name.as_str()))
            .map(|c| Attribution {
                character_id: c.id.clone(),
                rule: AttributionRule::NameMention,
            })
    }
}

/// Splits text into narrator and character segments. A quote whose speaker
/// cannot be resolved goes to the last resolved speaker, which carries over
/// across paragraphs and resets only after a paragraph with no quotes.
pub struct DialogueSegmenter<'a> {
    attributor: SpeakerAttributor<'a>,
    drop_speech_tags: bool,
}

impl<'a> DialogueSegmenter<'a> {
    pub fn new(attributor: SpeakerAttributor<'a>, drop_speech_tags: bool) -> Self {
        Self {
            attributor,
            drop_speech_tags,
        }
    }

    pub fn segment(&self, text: &str, characters: &[Character]) -> Vec<Dialogue> {
        let (script, _) = split_paragraphs(text).iter().fold(
            (Vec::new(), NARRATOR_ID.to_string()),
            |(mut script, last_speaker), paragraph| {
                let (dialogues, last_speaker) =
                    self.segment_paragraph(paragraph, characters, last_speaker);
                script.extend(dialogues);
                (script, last_speaker)
            },
        );
        script
    }

    /// Segments one paragraph, returning its dialogues and the speaker the
    /// next paragraph inherits.
    ///
    /// An opening mark with no closing mark is not a quote and stays in the
    /// narration. A quote holding only whitespace yields no segment, so its
    /// marks are the one part of the paragraph the script does not carry.
    pub fn segment_paragraph(
        &self,
        paragraph: &str,
        characters: &[Character],
        last_speaker: String,
    ) -> (Vec<Dialogue>, String) {
        let quotes: Vec<_> = quote_pattern().captures_iter(paragraph).collect();
        if quotes.is_empty() {
            return (
                vec![Dialogue::narration(paragraph.trim())],
                NARRATOR_ID.to_string(),
            );
        }

        let mut dialogues = Vec::new();
        let mut last_speaker = last_speaker;

        let first_start = quotes[0].get(0).map_or(0, |m| m.start());
        push_narration(&mut dialogues, &paragraph[..first_start]);

        for (k, cap) in quotes.iter().enumerate() {
            let (Some(whole), Some(open), Some(body), Some(close)) =
                (cap.get(0), cap.get(1), cap.get(2), cap.get(3))
            else {
                continue;
            };
            let context_end = quotes
                .get(k + 1)
                .and_then(|next| next.get(0))
                .map_or(paragraph.len(), |m| m.start());
            let context = &paragraph[whole.end()..context_end];

            let attribution = self.attributor.resolve(context, characters);
            let speaker = match &attribution {
                Some(a) => a.character_id.clone(),
                None => last_speaker.clone(),
            };
            debug!(
                "Quote {:?} -> {} ({:?})",
                body.as_str(),
                speaker,
                attribution.as_ref().map(|a| a.rule)
            );

            let quote_text = body.as_str().trim();
            if !quote_text.is_empty() {
                let marks = QuoteMarks {
                    open: open.as_str().chars().next().unwrap_or('"'),
                    close: close.as_str().chars().next().unwrap_or('"'),
                };
                dialogues.push(Dialogue::quoted(quote_text, &speaker, marks));
            }
            last_speaker = speaker;

            let verb_tagged = matches!(
                attribution,
                Some(Attribution {
                    rule: AttributionRule::SpeechVerb,
                    ..
                })
            );
            if !(self.drop_speech_tags && verb_tagged && is_bare_tag(context)) {
                push_narration(&mut dialogues, context);
            }
        }

        (dialogues, last_speaker)
    }
}

fn push_narration(dialogues: &mut Vec<Dialogue>, span: &str) {
    let text = span.trim();
    if !text.is_empty() {
        dialogues.push(Dialogue::narration(text));
    }
}

/// A single clause such as ", preguntó Juan." with no sentence break inside.
fn is_bare_tag(span: &str) -> bool {
    let terminators: &[char] = &['.', '!', '?', '…'];
    let body = span.trim().trim_end_matches(terminators);
    !body.contains(terminators)
}
