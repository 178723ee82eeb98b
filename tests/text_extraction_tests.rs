//! # Text Extraction Tests
//!
//! Label layouts seen in real OCR output, run through extraction and spell
//! correction without any image handling.

#[cfg(test)]
mod tests {
    use nutrition_ocr::nutrition::{derive_totals, reconcile, ExtractionResult, Field};
    use nutrition_ocr::spell_correction::{Dictionary, SpellCheckConfig, SpellCorrector};
    use nutrition_ocr::text_processing::extract_nutrition;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_servings_layouts() {
        let cases = [
            ("Servings per container: 8", Some("8")),
            ("No. of servings per pack: 12", Some("12")),
            ("Servings per package about 6", Some("6")),
            ("About 10 servings per container", Some("10")),
            ("4 servings per container", Some("4")),
            ("Servings: 3", Some("3")),
            ("Servings per pack (40g) 5", Some("5")),
            ("Serving size 1 cup", None),
        ];
        for (text, expected) in cases {
            assert_eq!(
                extract_nutrition(text).servings.as_deref(),
                expected,
                "servings in {:?}",
                text
            );
        }
    }

    #[test]
    fn test_field_layouts_with_units() {
        let result = extract_nutrition("Sodium (mg) 140  Protein (g): 9  Total Carbohydrates - 27 g");
        assert_eq!(result.sodium.as_deref(), Some("140 mg"));
        assert_eq!(result.protein.as_deref(), Some("9 g"));
        assert_eq!(result.carbohydrates.as_deref(), Some("27 g"));

        let result = extract_nutrition("SODIUM, mg 75");
        assert_eq!(result.sodium.as_deref(), Some("75 mg"));
    }

    #[test]
    fn test_multiline_label_is_normalized_before_matching() {
        let result = extract_nutrition("Servings per\ncontainer:\n  2\nProtein\n11g");
        assert_eq!(result.servings.as_deref(), Some("2"));
        assert_eq!(result.protein.as_deref(), Some("11 g"));
    }

    #[test]
    fn test_raw_value_wins_over_corrected_value() {
        let raw = ExtractionResult {
            protein: Some("3 g".to_string()),
            ..Default::default()
        };
        let corrected = ExtractionResult {
            protein: Some("8 g".to_string()),
            sodium: Some("50 mg".to_string()),
            ..Default::default()
        };
        let merged = reconcile(&raw, &corrected);
        assert_eq!(merged.get(Field::Protein), Some("3 g"));
        assert_eq!(merged.get(Field::Sodium), Some("50 mg"));
        assert_eq!(merged.get(Field::Servings), None);
    }

    #[test]
    fn test_totals_need_servings() {
        let extracted = extract_nutrition("Sodium 120mg Protein 4g");
        let totals = derive_totals(&extracted);
        assert_eq!(totals.sodium_total, None);
        assert_eq!(totals.protein_total, None);
    }

    #[test]
    fn test_numbers_and_units_survive_correction() {
        let corrector = SpellCorrector::new(SpellCheckConfig::default()).unwrap();
        let corrected = corrector.correct_text("Sodum 120mg 5 g kcal");
        assert_eq!(corrected, "sodium 120mg 5 g kcal");
    }

    #[test]
    fn test_extra_dictionary_file_adds_words() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# brand words").unwrap();
        writeln!(file, "quinoa 500").unwrap();
        file.flush().unwrap();

        let config = SpellCheckConfig {
            dictionary_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let corrector = SpellCorrector::new(config).unwrap();
        assert_eq!(corrector.lookup("quinao").as_deref(), Some("quinoa"));
        assert!(corrector.dictionary().contains("sodium"));
    }

    #[test]
    fn test_missing_dictionary_file_is_an_error() {
        let config = SpellCheckConfig {
            dictionary_path: Some("/nonexistent/nutrition/words.txt".into()),
            ..Default::default()
        };
        assert!(SpellCorrector::new(config).is_err());
    }

    #[test]
    fn test_shared_dictionary_between_correctors() {
        let dictionary = Arc::new(Dictionary::parse("fiber 10\nfibre 5"));
        let strict = SpellCorrector::with_dictionary(
            Arc::clone(&dictionary),
            SpellCheckConfig {
                max_edit_distance: 1,
                ..Default::default()
            },
        );
        let loose = SpellCorrector::with_dictionary(dictionary, SpellCheckConfig::default());

        assert_eq!(strict.lookup("fibr").as_deref(), Some("fiber"));
        assert_eq!(strict.lookup("fbx"), None);
        assert_eq!(loose.lookup("fibx").as_deref(), Some("fiber"));
    }
}
