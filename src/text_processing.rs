//! # Text Processing Module
//!
//! Regex-based extraction of nutrition quantities from OCR text.
//!
//! ## Features
//!
//! - Whitespace normalization of raw OCR output
//! - Ordered, case-insensitive pattern table per nutrition field
//! - First-pattern-wins matching: pattern order encodes label-layout priority
//! - Unit attachment (`mg` for sodium, `g` for protein and carbohydrates)

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::nutrition::{format_quantity, ExtractionResult, Field};

/// Servings patterns, most specific label layouts first.
///
/// The weight-in-parentheses layout assumes exactly two numbers on the line,
/// the second being the serving count.
const SERVINGS_PATTERNS: &[&str] = &[
    r"(?:No\.?\s+of\s+)?servings?\s+per\s+container(?:\s*/\s*pack)?(?:\s*(?::|about)\s+)([0-9]+)",
    r"(?:No\.?\s+of\s+)?servings?\s+per\s+pack(?:\s*(?::|about)\s+)([0-9]+)",
    r"(?:No\.?\s+of\s+)?servings?\s+per\s+package(?:\s*(?::|about)\s+)([0-9]+)",
    r"about\s+([0-9]+)\s+servings?\s+per\s+container",
    r"([0-9]+)\s+servings?\s+per\s+container",
    r"servings?\s*:\s*([0-9]+)",
    r"servings?\s+per\s+pack\s*\(\s*[0-9]+\s*g\s*\)\s+([0-9]+)",
    r"servings?\s+per\s+container\s+([0-9]+)",
];

const SODIUM_PATTERNS: &[&str] = &[
    r"sodium\s*(?:\(\s*mg\s*\))?\s*(?::|-)?\s*([0-9]+)(?:\s*mg)?",
    r"sodium\s*,\s*mg\s*([0-9]+)",
];

const PROTEIN_PATTERNS: &[&str] =
    &[r"(?:total\s+protein|protein)\s*(?:\(\s*g\s*\))?\s*(?::|-)?\s*([0-9]+)(?:\s*g)?"];

// Covers the common OCR spellings: carbohydrate(s), carbohyrates, carbo, carb.
const CARBOHYDRATE_PATTERNS: &[&str] = &[
    r"(?:total\s+carbo(?:hydra(?:te?s?)?|hyrates?)|total\s+carbohydrate(?:s)?|carbo(?:hydra(?:te?s?)?|hydrate)?|carb\.?)\s*(?:\(\s*g\s*\))?\s*(?::|-)?\s*([0-9]+)(?:\s*g)?",
];

fn compile_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){}", p)).expect("Nutrition field pattern should be valid")
        })
        .collect()
}

lazy_static! {
    static ref WHITESPACE_REGEX: Regex =
        Regex::new(r"\s+").expect("Whitespace pattern should be valid");
    static ref SERVINGS_REGEXES: Vec<Regex> = compile_patterns(SERVINGS_PATTERNS);
    static ref SODIUM_REGEXES: Vec<Regex> = compile_patterns(SODIUM_PATTERNS);
    static ref PROTEIN_REGEXES: Vec<Regex> = compile_patterns(PROTEIN_PATTERNS);
    static ref CARBOHYDRATE_REGEXES: Vec<Regex> = compile_patterns(CARBOHYDRATE_PATTERNS);
}

/// Compiled patterns for a field, in declared priority order
pub fn field_patterns(field: Field) -> &'static [Regex] {
    match field {
        Field::Servings => &SERVINGS_REGEXES,
        Field::Sodium => &SODIUM_REGEXES,
        Field::Protein => &PROTEIN_REGEXES,
        Field::Carbohydrates => &CARBOHYDRATE_REGEXES,
    }
}

/// Collapses every run of whitespace (including newlines) into a single space.
///
/// Leading and trailing runs become one space each rather than being removed.
///
/// ```
/// use nutrition_ocr::text_processing::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("Sodium\n\t 200mg"), "Sodium 200mg");
/// assert_eq!(normalize_whitespace("  x  "), " x ");
/// ```
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text, " ").into_owned()
}

/// Finds the value of one field in already-normalized text.
///
/// Patterns are tried in order. The first one that matches is inspected group
/// by group and the first non-empty capture, trimmed, is returned with the
/// field's unit appended. A match with only empty groups falls through to the
/// next pattern.
pub fn match_field(text: &str, field: Field) -> Option<String> {
    for (index, pattern) in field_patterns(field).iter().enumerate() {
        let Some(captures) = pattern.captures(text) else {
            continue;
        };

        let value = captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .find(|group| !group.is_empty());

        if let Some(value) = value {
            trace!(field = %field, pattern_index = index, value, "Field pattern matched");
            return Some(format_quantity(value.trim(), field.unit()));
        }
    }
    None
}

/// Runs one extraction pass: normalizes `text`, then matches every field.
///
/// Stateless and safe to call concurrently.
///
/// ```
/// use nutrition_ocr::text_processing::extract_nutrition;
///
/// let result = extract_nutrition("Total Protein: 7g");
/// assert_eq!(result.protein.as_deref(), Some("7 g"));
/// assert_eq!(result.sodium, None);
/// ```
pub fn extract_nutrition(text: &str) -> ExtractionResult {
    let normalized = normalize_whitespace(text);
    ExtractionResult::from_fn(|field| match_field(&normalized, field))
}
