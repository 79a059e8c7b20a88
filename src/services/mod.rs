pub mod analysis;
pub mod llm;
pub mod media;
pub mod registry;
pub mod setup;
pub mod source;
pub mod translation;
pub mod tts;
pub mod workflow;
