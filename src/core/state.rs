use serde::{Deserialize, Serialize};

pub const NARRATOR_ID: &str = "narrator";
pub const DEFAULT_ARCHETYPE: &str = "default";

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Story {
    pub url: String,
    pub title: String,
    pub author: String,
    pub original_text: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    /// Narration order. Audio and video assembly follow this order only.
    #[serde(default)]
    pub script: Vec<Dialogue>,
}

impl Story {
    pub fn new(url: &str, title: &str, author: &str, original_text: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            original_text: original_text.to_string(),
            ..Default::default()
        }
    }

    /// File-system friendly form of the title.
    pub fn slug(&self) -> String {
        let slug: String = self
            .title
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        if slug.trim_matches('_').is_empty() {
            "story".to_string()
        } else {
            slug
        }
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub voice_archetype: String,
}

impl Character {
    pub fn new(name: &str) -> Self {
        Self {
            id: character_id(name),
            name: name.to_string(),
            voice_archetype: DEFAULT_ARCHETYPE.to_string(),
        }
    }
}

/// Lowercased name with spaces replaced by underscores.
pub fn character_id(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// The marks a quoted segment was wrapped in.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuoteMarks {
    pub open: char,
    pub close: char,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Dialogue {
    pub text: String,
    #[serde(default = "default_character_id")]
    pub character_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<QuoteMarks>,
}

fn default_character_id() -> String {
    NARRATOR_ID.to_string()
}

impl Dialogue {
    pub fn narration(text: &str) -> Self {
        Self {
            text: text.to_string(),
            character_id: NARRATOR_ID.to_string(),
            emotion: None,
            audio_path: None,
            quote: None,
        }
    }

    pub fn quoted(text: &str, character_id: &str, marks: QuoteMarks) -> Self {
        Self {
            text: text.to_string(),
            character_id: character_id.to_string(),
            emotion: None,
            audio_path: None,
            quote: Some(marks),
        }
    }

    pub fn is_narrator(&self) -> bool {
        self.character_id == NARRATOR_ID
    }
}

/// One element of the `scenes.json` script artifact.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Scene {
    pub scene_id: String,
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

pub fn scene_id(story_slug: &str, index: usize) -> String {
    format!("{}_s{:03}", story_slug, index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_id_normalization() {
        assert_eq!(character_id("Capitana Eva"), "capitana_eva");
        assert_eq!(character_id("María"), "maría");
        assert_eq!(Character::new("Ana Luz").voice_archetype, DEFAULT_ARCHETYPE);
    }

    #[test]
    fn test_dialogue_defaults_to_narrator() {
        let d: Dialogue = serde_json::from_str(r#"{"text": "Hola"}"#).unwrap();
        assert!(d.is_narrator());
        assert!(d.audio_path.is_none());
    }

    #[test]
    fn test_scene_omits_missing_fields() {
        let scene = Scene {
            scene_id: scene_id("the_last_angel", 0),
            speaker: NARRATOR_ID.to_string(),
            text: "Era de noche.".to_string(),
            image_path: None,
            audio_path: None,
            duration: None,
        };
        let json = serde_json::to_string(&scene).unwrap();
        assert_eq!(
            json,
            r#"{"scene_id":"the_last_angel_s001","speaker":"narrator","text":"Era de noche."}"#
        );
    }

    #[test]
    fn test_slug() {
        let story = Story::new("u", "The Last Angel: Part 1", "a", "");
        assert_eq!(story.slug(), "The_Last_Angel__Part_1");
        assert_eq!(Story::new("u", "  ", "a", "").slug(), "story");
    }
}
