//! Index-to-token vocabulary
//!
//! Loads the plain-text token files produced at corpus preparation time.
//!
//! # Overview
//!
//! A token file lists one token per line; a token's index is its zero-based
//! line number. Two control tokens are appended after the file's entries:
//! - `n`: start of sequence, rendered as `<`
//! - `n + 1`: end of sequence, rendered as `>`

use std::fs;
use std::path::Path;

use super::LabelKind;
use crate::error::{VizError, VizResult};

/// Control tokens and separators shared by every label type
pub mod special_tokens {
    /// Rendering of the start-of-sequence index
    pub const SOS: &str = "<";
    /// Rendering of the end-of-sequence index
    pub const EOS: char = '>';
    /// Word separator inside decoded text
    pub const SPACE: char = '_';
    /// Index value used to pad label sequences in a batch
    pub const PAD_INDEX: i64 = -1;
}

/// Mapping from label indices to human-readable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyMap {
    /// Tokens read from the file, followed by SOS and EOS
    id_to_token: Vec<String>,
    /// How decoded tokens are joined
    kind: LabelKind,
}

impl VocabularyMap {
    /// Build a vocabulary from tokens in index order
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Vocabulary`] if any token is empty.
    pub fn from_tokens<I, S>(tokens: I, kind: LabelKind) -> VizResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut id_to_token = Vec::new();
        for (index, token) in tokens.into_iter().enumerate() {
            let token = token.into();
            if token.is_empty() {
                return Err(VizError::Vocabulary(format!("empty token at index {index}")));
            }
            id_to_token.push(token);
        }
        id_to_token.push(special_tokens::SOS.to_string());
        id_to_token.push(special_tokens::EOS.to_string());
        Ok(Self { id_to_token, kind })
    }

    /// Parse the contents of a token file
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Vocabulary`] if a line is blank.
    pub fn from_text(text: &str, kind: LabelKind) -> VizResult<Self> {
        let tokens: Vec<&str> = text.lines().map(str::trim_end).collect();
        if let Some(line) = tokens.iter().position(|t| t.is_empty()) {
            return Err(VizError::Vocabulary(format!(
                "blank token on line {}",
                line + 1
            )));
        }
        Self::from_tokens(tokens, kind)
    }

    /// Load a token file from disk
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Vocabulary`] if the file cannot be read or has a blank line.
    pub fn load(path: &Path, kind: LabelKind) -> VizResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| VizError::Vocabulary(format!("cannot read {}: {e}", path.display())))?;
        Self::from_text(&text, kind)
    }

    /// Number of tokens read from the file (excluding SOS/EOS)
    #[must_use]
    pub fn num_tokens(&self) -> usize {
        self.id_to_token.len() - 2
    }

    /// Index of the end-of-sequence token
    #[must_use]
    pub fn eos_index(&self) -> usize {
        self.num_tokens() + 1
    }

    /// Label granularity of this vocabulary
    #[must_use]
    pub const fn kind(&self) -> LabelKind {
        self.kind
    }

    /// Get the token for an index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.id_to_token.get(index).map(String::as_str)
    }

    /// Decode a label-index sequence into text
    ///
    /// Padding entries are dropped. Character vocabularies concatenate tokens,
    /// word vocabularies join them with `_`.
    ///
    /// # Errors
    ///
    /// Returns [`VizError::Vocabulary`] for a negative (non-padding) or out-of-range index.
    pub fn decode(&self, indices: &[i64]) -> VizResult<String> {
        let mut tokens = Vec::with_capacity(indices.len());
        for &index in indices {
            if index == special_tokens::PAD_INDEX {
                continue;
            }
            let token = usize::try_from(index)
                .ok()
                .and_then(|i| self.get(i))
                .ok_or_else(|| {
                    VizError::Vocabulary(format!(
                        "label index {index} outside vocabulary of {} entries",
                        self.id_to_token.len()
                    ))
                })?;
            tokens.push(token);
        }

        Ok(match self.kind {
            LabelKind::Character => tokens.concat(),
            LabelKind::Word => tokens.join(&special_tokens::SPACE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_vocab() -> VocabularyMap {
        VocabularyMap::from_text("_\na\nc\nt\n", LabelKind::Character).expect("vocab")
    }

    #[test]
    fn test_from_text_appends_control_tokens() {
        let vocab = char_vocab();
        assert_eq!(vocab.num_tokens(), 4);
        assert_eq!(vocab.get(vocab.num_tokens()), Some("<"));
        assert_eq!(vocab.get(vocab.eos_index()), Some(">"));
        assert_eq!(vocab.get(6), None);
    }

    #[test]
    fn test_from_text_trims_crlf() {
        let vocab = VocabularyMap::from_text("a\r\nb\r\n", LabelKind::Character).expect("vocab");
        assert_eq!(vocab.get(0), Some("a"));
        assert_eq!(vocab.get(1), Some("b"));
    }

    #[test]
    fn test_from_text_rejects_blank_line() {
        let err = VocabularyMap::from_text("a\n\nb\n", LabelKind::Character)
            .expect_err("blank line should fail");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_decode_character() {
        let vocab = char_vocab();
        // c a t _ c a t > <pad>
        let text = vocab.decode(&[2, 1, 3, 0, 2, 1, 3, 5, -1]).expect("decode");
        assert_eq!(text, "cat_cat>");
    }

    #[test]
    fn test_decode_word() {
        let vocab =
            VocabularyMap::from_text("the\ncat\nsat\n", LabelKind::Word).expect("vocab");
        let text = vocab.decode(&[0, 1, 2, 4]).expect("decode");
        assert_eq!(text, "the_cat_sat_>");
    }

    #[test]
    fn test_decode_out_of_range() {
        let vocab = char_vocab();
        assert!(matches!(vocab.decode(&[42]), Err(VizError::Vocabulary(_))));
        assert!(matches!(vocab.decode(&[-7]), Err(VizError::Vocabulary(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = VocabularyMap::load(&dir.path().join("nope.txt"), LabelKind::Word)
            .expect_err("missing file");
        assert!(matches!(err, VizError::Vocabulary(_)));
    }
}
