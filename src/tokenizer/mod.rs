//! Label vocabularies and decoded-text handling
//!
//! Converts predicted label indices back to text and splits that text into
//! the per-step token labels drawn on an attention plot.
//!
//! # Text conventions
//!
//! - `_` separates words (and is the space symbol of character vocabularies)
//! - `>` marks the end of a sequence; everything after it is discarded

mod vocab;

pub use vocab::{special_tokens, VocabularyMap};

use crate::error::{VizError, VizResult};

/// Label granularity of a vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    /// One label per character
    Character,
    /// One label per word
    Word,
}

impl LabelKind {
    /// Label types known to map to character vocabularies
    pub const CHARACTER_LABEL_TYPES: [&'static str; 2] = ["character", "character_capital_divide"];

    /// Label types known to map to word vocabularies
    pub const WORD_LABEL_TYPES: [&'static str; 4] =
        ["word_freq1", "word_freq5", "word_freq10", "word_freq15"];

    /// Select the label kind for a `label_type` by exact match
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Config`] if the label type is not a known name.
    pub fn from_label_type(label_type: &str) -> VizResult<Self> {
        if Self::CHARACTER_LABEL_TYPES.contains(&label_type) {
            Ok(Self::Character)
        } else if Self::WORD_LABEL_TYPES.contains(&label_type) {
            Ok(Self::Word)
        } else {
            Err(VizError::Config(format!("unknown label_type '{label_type}'")))
        }
    }
}

/// Cut decoded text at the first end-of-sequence marker and drop one trailing `_`
#[must_use]
pub fn truncate_prediction(text: &str) -> &str {
    let text = text
        .split_once(special_tokens::EOS)
        .map_or(text, |(head, _)| head);
    text.strip_suffix(special_tokens::SPACE).unwrap_or(text)
}

/// Split truncated text into the labels of the attention plot rows
///
/// Empty text yields no labels.
#[must_use]
pub fn split_tokens(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(special_tokens::SPACE).collect()
}
