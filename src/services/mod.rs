pub mod ai_cascade;
pub mod contribution;
pub mod etymology;
pub mod etymology_extract;
pub mod github;
pub mod learning;
pub mod llm_provider;
pub mod markup;
pub mod translation;
pub mod wiktionary;
