//! # Spell Correction Module
//!
//! Selective, dictionary-based correction of OCR text. Words are matched
//! against a frequency dictionary of general English merged with nutrition
//! label vocabulary, using edit distance with adjacent transpositions.
//! Numeric tokens and unit abbreviations are never touched so the quantities
//! read from a label survive correction unchanged.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::parse_env;
use crate::errors::{AppError, AppResult};

/// Word lists compiled into the binary, merged in order
const EMBEDDED_DICTIONARIES: &[&str] = &[
    include_str!("../config/english_words.txt"),
    include_str!("../config/dictionary.txt"),
];

/// Characters removed from both ends of a token before comparison
const BOUNDARY_PUNCTUATION: &[char] = &['.', ',', ':', ';', '?', '!', '(', ')', '[', ']', '{', '}'];

/// Configuration for selective spell correction
#[derive(Debug, Clone, PartialEq)]
pub struct SpellCheckConfig {
    /// Maximum edit distance for a correction (1-3)
    pub max_edit_distance: usize,
    /// Lowercase tokens that are never corrected
    pub allowed_tokens: Vec<String>,
    /// Additional dictionary merged over the embedded word list
    pub dictionary_path: Option<PathBuf>,
}

impl Default for SpellCheckConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: 2,
            allowed_tokens: vec!["mg".to_string(), "g".to_string(), "kcal".to_string()],
            dictionary_path: None,
        }
    }
}

impl SpellCheckConfig {
    /// Load spell-check settings from environment variables, falling back to defaults
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_edit_distance: parse_env("SPELL_MAX_EDIT_DISTANCE", defaults.max_edit_distance)?,
            allowed_tokens: defaults.allowed_tokens,
            dictionary_path: env::var("SPELL_DICTIONARY_PATH").ok().map(PathBuf::from),
        })
    }

    /// Validate spell-check configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=3).contains(&self.max_edit_distance) {
            return Err(AppError::Config(format!(
                "max_edit_distance must be between 1 and 3, got {}",
                self.max_edit_distance
            )));
        }
        if self.allowed_tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::Config(
                "allowed_tokens cannot contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}

/// Immutable word → frequency table used for correction lookups.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: HashMap<String, u64>,
}

impl Dictionary {
    /// The word lists shipped with the crate
    pub fn embedded() -> Self {
        let mut dictionary = Self::default();
        for content in EMBEDDED_DICTIONARIES {
            dictionary.merge_entries(content);
        }
        dictionary
    }

    /// Parses `word frequency` lines; blank lines and `#` comments are skipped
    /// and a missing frequency counts as 1.
    pub fn parse(content: &str) -> Self {
        let mut dictionary = Self::default();
        dictionary.merge_entries(content);
        dictionary
    }

    /// Embedded words plus the entries of an extra dictionary file
    pub fn with_extra_file(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::FileSystem(format!(
                "Failed to read spell dictionary '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut dictionary = Self::embedded();
        let before = dictionary.len();
        dictionary.merge_entries(&content);
        info!(
            path = %path.display(),
            added_words = dictionary.len() - before,
            total_words = dictionary.len(),
            "Loaded extra spell dictionary"
        );
        Ok(dictionary)
    }

    fn merge_entries(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let frequency = parts.next().and_then(|f| f.parse().ok()).unwrap_or(1);
            let entry = self.words.entry(word.to_lowercase()).or_insert(0);
            *entry = (*entry).max(frequency);
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    pub fn frequency(&self, word: &str) -> Option<u64> {
        self.words.get(word).copied()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Dictionary-backed corrector that leaves quantities and units alone.
///
/// Cheap to clone; clones share the same dictionary.
#[derive(Debug, Clone)]
pub struct SpellCorrector {
    dictionary: Arc<Dictionary>,
    config: SpellCheckConfig,
}

impl SpellCorrector {
    /// Builds a corrector from configuration, loading the extra dictionary file if one is set.
    pub fn new(config: SpellCheckConfig) -> AppResult<Self> {
        config.validate()?;
        let dictionary = match &config.dictionary_path {
            Some(path) => Dictionary::with_extra_file(path)?,
            None => Dictionary::embedded(),
        };
        debug!(words = dictionary.len(), "Spell dictionary ready");
        Ok(Self::with_dictionary(Arc::new(dictionary), config))
    }

    pub fn with_dictionary(dictionary: Arc<Dictionary>, config: SpellCheckConfig) -> Self {
        Self { dictionary, config }
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Best dictionary correction for a single word.
    ///
    /// The word is lowercased first; a known word corrects to itself. Otherwise
    /// the closest word within `max_edit_distance` wins, ties going to the more
    /// frequent word and then to lexical order.
    pub fn lookup(&self, word: &str) -> Option<String> {
        let word = word.to_lowercase();
        if word.is_empty() {
            return None;
        }
        if self.dictionary.contains(&word) {
            return Some(word);
        }

        let max_distance = self.config.max_edit_distance;
        let word_len = word.chars().count();
        let mut best: Option<(usize, u64, &str)> = None;

        for (candidate, &frequency) in &self.dictionary.words {
            if candidate.chars().count().abs_diff(word_len) > max_distance {
                continue;
            }
            let distance = strsim::osa_distance(&word, candidate);
            if distance > max_distance {
                continue;
            }

            let better = match best {
                None => true,
                Some((best_distance, best_frequency, best_word)) => {
                    distance < best_distance
                        || (distance == best_distance
                            && (frequency > best_frequency
                                || (frequency == best_frequency
                                    && candidate.as_str() < best_word)))
                }
            };
            if better {
                best = Some((distance, frequency, candidate));
            }
        }

        best.map(|(_, _, word)| word.to_string())
    }

    /// Tokens that must never be corrected: anything with an ASCII digit, and unit abbreviations.
    ///
    /// Extraction only reads ASCII digits, so other numeric characters get no protection.
    fn is_exempt(&self, stripped: &str) -> bool {
        if stripped.chars().any(|c| c.is_ascii_digit()) {
            return true;
        }
        let lower = stripped.to_lowercase();
        self.config.allowed_tokens.iter().any(|t| *t == lower)
    }

    /// Corrects a whitespace-separated text token by token.
    ///
    /// A replaced token loses its surrounding punctuation; exempt and unknown
    /// tokens are kept verbatim. Tokens are rejoined with single spaces.
    ///
    /// ```
    /// use nutrition_ocr::spell_correction::{SpellCheckConfig, SpellCorrector};
    ///
    /// let corrector = SpellCorrector::new(SpellCheckConfig::default()).unwrap();
    /// assert_eq!(corrector.correct_text("Sodum 120mg"), "sodium 120mg");
    /// ```
    pub fn correct_text(&self, text: &str) -> String {
        let mut replaced = 0usize;
        let corrected: Vec<String> = text
            .split_whitespace()
            .map(|token| {
                let stripped = token.trim_matches(BOUNDARY_PUNCTUATION);
                if self.is_exempt(stripped) {
                    return token.to_string();
                }
                match self.lookup(stripped) {
                    Some(correction) if correction != token => {
                        trace!(token, correction = %correction, "Corrected token");
                        replaced += 1;
                        correction
                    }
                    _ => token.to_string(),
                }
            })
            .collect();

        debug!(
            tokens = corrected.len(),
            replaced, "Spell correction pass completed"
        );
        corrected.join(" ")
    }
}
