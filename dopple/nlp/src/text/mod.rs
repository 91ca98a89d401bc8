/// Sentence salience scoring.
pub mod algo;
/// Normalization, tokenization and budget helpers.
pub mod helper;

pub use algo::{score_sentences, SentenceScore};
