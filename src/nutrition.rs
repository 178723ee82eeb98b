//! # Nutrition Data Model
//!
//! The closed set of label fields, the per-pass extraction mapping, pass
//! reconciliation, and the derivation of whole-container totals from
//! per-serving values.

use serde::{Deserialize, Serialize};

/// One of the structured quantities read from a nutrition label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Servings,
    Sodium,
    Protein,
    Carbohydrates,
}

impl Field {
    /// Every field, in reporting order
    pub const ALL: [Field; 4] = [
        Field::Servings,
        Field::Sodium,
        Field::Protein,
        Field::Carbohydrates,
    ];

    /// Fields that are multiplied by the serving count to produce totals
    pub const PER_SERVING: [Field; 3] = [Field::Protein, Field::Sodium, Field::Carbohydrates];

    /// Key used in serialized extraction mappings
    pub fn name(&self) -> &'static str {
        match self {
            Field::Servings => "servings",
            Field::Sodium => "sodium",
            Field::Protein => "protein",
            Field::Carbohydrates => "carbohydrates",
        }
    }

    /// Unit appended to matched values; servings are a bare count
    pub fn unit(&self) -> &'static str {
        match self {
            Field::Servings => "",
            Field::Sodium => "mg",
            Field::Protein | Field::Carbohydrates => "g",
        }
    }

    /// Key of this field's total in pipeline and batch results
    pub fn total_key(&self) -> &'static str {
        match self {
            Field::Servings => "servings_total",
            Field::Sodium => "sodium_total",
            Field::Protein => "protein_total",
            Field::Carbohydrates => "carbs_total",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Formats a number with a field's unit: `"12 mg"`, or `"12"` when unitless.
pub fn format_quantity(value: &str, unit: &str) -> String {
    if unit.is_empty() {
        value.to_string()
    } else {
        format!("{} {}", value, unit)
    }
}

/// Result of one extraction pass: one optional matched value per field.
///
/// Every field always has an entry, so the type itself rules out missing or
/// extraneous keys. Serializes as `{"servings": .., "sodium": .., "protein": ..,
/// "carbohydrates": ..}` with `null` for absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub servings: Option<String>,
    pub sodium: Option<String>,
    pub protein: Option<String>,
    pub carbohydrates: Option<String>,
}

impl ExtractionResult {
    /// An all-null mapping
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a mapping by asking `lookup` for every field
    pub fn from_fn(mut lookup: impl FnMut(Field) -> Option<String>) -> Self {
        Self {
            servings: lookup(Field::Servings),
            sodium: lookup(Field::Sodium),
            protein: lookup(Field::Protein),
            carbohydrates: lookup(Field::Carbohydrates),
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Servings => self.servings.as_deref(),
            Field::Sodium => self.sodium.as_deref(),
            Field::Protein => self.protein.as_deref(),
            Field::Carbohydrates => self.carbohydrates.as_deref(),
        }
    }

    /// Number of fields with a value
    pub fn matched_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }
}

/// Which pass supplied a reconciled field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Raw,
    Corrected,
    Missing,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSource::Raw => "raw",
            FieldSource::Corrected => "corrected",
            FieldSource::Missing => "missing",
        }
    }
}

/// Decides which pass supplies `field`.
///
/// The raw pass always wins when it has a value: unmodified OCR text keeps
/// digit sequences exactly as read. The corrected pass only fills fields whose
/// label words were too garbled for any raw pattern. This is the single place
/// to change if a field ever needs to prefer the corrected pass.
pub fn field_source(
    raw: &ExtractionResult,
    corrected: &ExtractionResult,
    field: Field,
) -> FieldSource {
    if raw.get(field).is_some() {
        FieldSource::Raw
    } else if corrected.get(field).is_some() {
        FieldSource::Corrected
    } else {
        FieldSource::Missing
    }
}

/// Merges the raw and corrected passes field by field: raw, else corrected, else null.
pub fn reconcile(raw: &ExtractionResult, corrected: &ExtractionResult) -> ExtractionResult {
    ExtractionResult::from_fn(|field| match field_source(raw, corrected, field) {
        FieldSource::Raw => raw.get(field).map(str::to_string),
        FieldSource::Corrected => corrected.get(field).map(str::to_string),
        FieldSource::Missing => None,
    })
}

/// Parses the leading integer of a matched value (`"12 mg"` → 12).
///
/// Returns `None` for an absent value, a value without leading digits, or a
/// number too large to represent.
pub fn parse_leading_number(value: Option<&str>) -> Option<u64> {
    let value = value?;
    let digits_end = value
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    if digits_end == 0 {
        return None;
    }
    value[..digits_end].parse().ok()
}

/// Whole-container totals derived from the reconciled per-serving values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedTotals {
    pub protein_total: Option<String>,
    pub sodium_total: Option<String>,
    pub carbs_total: Option<String>,
}

impl DerivedTotals {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Protein => self.protein_total.as_deref(),
            Field::Sodium => self.sodium_total.as_deref(),
            Field::Carbohydrates => self.carbs_total.as_deref(),
            Field::Servings => None,
        }
    }
}

/// `per_serving * servings`, formatted with the field's unit.
///
/// Absent unless both inputs are present and the product fits in a `u64`.
pub fn derive_total(field: Field, per_serving: Option<u64>, servings: Option<u64>) -> Option<String> {
    let product = per_serving?.checked_mul(servings?)?;
    Some(format_quantity(&product.to_string(), field.unit()))
}

/// Computes every per-serving field's total independently from a final extraction.
pub fn derive_totals(final_extracted: &ExtractionResult) -> DerivedTotals {
    let servings = parse_leading_number(final_extracted.get(Field::Servings));
    let total_for = |field: Field| {
        derive_total(field, parse_leading_number(final_extracted.get(field)), servings)
    };

    DerivedTotals {
        protein_total: total_for(Field::Protein),
        sodium_total: total_for(Field::Sodium),
        carbs_total: total_for(Field::Carbohydrates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(pairs: &[(Field, &str)]) -> ExtractionResult {
        ExtractionResult::from_fn(|field| {
            pairs
                .iter()
                .find(|(f, _)| *f == field)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn test_field_units_and_names() {
        assert_eq!(Field::Servings.unit(), "");
        assert_eq!(Field::Sodium.unit(), "mg");
        assert_eq!(Field::Protein.unit(), "g");
        assert_eq!(Field::Carbohydrates.unit(), "g");
        assert_eq!(Field::Carbohydrates.total_key(), "carbs_total");
        assert_eq!(Field::Sodium.to_string(), "sodium");
    }

    #[test]
    fn test_extraction_result_serializes_every_field() {
        let result = extraction(&[(Field::Protein, "7 g")]);
        let json = serde_json::to_value(&result).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["protein"], "7 g");
        assert!(object["servings"].is_null());
        assert!(object["sodium"].is_null());
        assert!(object["carbohydrates"].is_null());
    }

    #[test]
    fn test_reconcile_prefers_raw_then_corrected() {
        let raw = extraction(&[(Field::Sodium, "200 mg")]);
        let corrected = extraction(&[(Field::Sodium, "210 mg"), (Field::Protein, "5 g")]);

        let merged = reconcile(&raw, &corrected);
        assert_eq!(merged.sodium.as_deref(), Some("200 mg"));
        assert_eq!(merged.protein.as_deref(), Some("5 g"));
        assert_eq!(merged.servings, None);
        assert_eq!(merged.carbohydrates, None);

        assert_eq!(field_source(&raw, &corrected, Field::Sodium), FieldSource::Raw);
        assert_eq!(field_source(&raw, &corrected, Field::Protein), FieldSource::Corrected);
        assert_eq!(field_source(&raw, &corrected, Field::Servings), FieldSource::Missing);
    }

    #[test]
    fn test_parse_leading_number() {
        assert_eq!(parse_leading_number(Some("12 mg")), Some(12));
        assert_eq!(parse_leading_number(Some("5")), Some(5));
        assert_eq!(parse_leading_number(Some("mg 12")), None);
        assert_eq!(parse_leading_number(Some("")), None);
        assert_eq!(parse_leading_number(None), None);
        assert_eq!(parse_leading_number(Some("99999999999999999999999 g")), None);
    }

    #[test]
    fn test_derive_totals_requires_servings() {
        let with_servings = extraction(&[(Field::Protein, "4 g"), (Field::Servings, "3")]);
        let totals = derive_totals(&with_servings);
        assert_eq!(totals.protein_total.as_deref(), Some("12 g"));
        assert_eq!(totals.sodium_total, None);
        assert_eq!(totals.carbs_total, None);

        let without_servings = extraction(&[(Field::Protein, "4 g")]);
        assert_eq!(derive_totals(&without_servings).protein_total, None);
    }

    #[test]
    fn test_derive_totals_formats_units_per_field() {
        let result = extraction(&[
            (Field::Servings, "2"),
            (Field::Sodium, "150 mg"),
            (Field::Carbohydrates, "30 g"),
        ]);
        let totals = derive_totals(&result);
        assert_eq!(totals.sodium_total.as_deref(), Some("300 mg"));
        assert_eq!(totals.carbs_total.as_deref(), Some("60 g"));
        assert_eq!(totals.get(Field::Sodium), Some("300 mg"));
        assert_eq!(totals.get(Field::Servings), None);
    }

    #[test]
    fn test_derive_total_overflow_is_absent() {
        assert_eq!(derive_total(Field::Sodium, Some(u64::MAX), Some(2)), None);
    }
}
