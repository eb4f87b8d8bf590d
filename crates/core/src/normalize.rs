//! Text normalization for title slide fields.
//!
//! Shape text comes out of the source decks with stray indentation around
//! the value and mixed Unicode composition. Only the ends of a field are
//! touched; inner spacing and line breaks are kept as the deck has them.

use unicode_normalization::UnicodeNormalization;

/// Clean a single metadata field: NFC composition, then trim both ends.
pub fn clean_field(text: &str) -> String {
    let composed: String = text.nfc().collect();
    composed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_field_trims() {
        assert_eq!(clean_field("  Holy, Holy, Holy  "), "Holy, Holy, Holy");
        assert_eq!(clean_field("\n\t138\n"), "138");
    }

    #[test]
    fn test_clean_field_keeps_inner_whitespace() {
        assert_eq!(clean_field("Holy,  Holy\tHoly"), "Holy,  Holy\tHoly");
        assert_eq!(
            clean_field(" Words:\u{000B}Heber\nMusic:  Dykes "),
            "Words:\u{000B}Heber\nMusic:  Dykes"
        );
    }

    #[test]
    fn test_clean_field_composes_unicode() {
        // "e" followed by a combining acute accent
        assert_eq!(clean_field("Cre\u{0301}ateur"), "Cr\u{00E9}ateur");
    }

    #[test]
    fn test_clean_field_empty() {
        assert_eq!(clean_field("   \n  "), "");
    }
}
