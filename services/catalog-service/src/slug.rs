use std::time::{SystemTime, UNIX_EPOCH};
use unicode_normalization::UnicodeNormalization;

const FALLBACK_PREFIX: &str = "series";
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Lowercase, hyphen-delimited slug. Letters and digits from any script are
/// kept; Latin diacritics are folded away. May be empty.
///
/// Non-ASCII letters survive, so the result is only URL-safe once
/// percent-encoded.
pub fn slugify(input: &str) -> String {
    // Decompose, drop combining accents, then recompose so kana voicing marks
    // (which live outside the combining-diacritics block) rejoin their base.
    let folded: String = input
        .nfkd()
        .filter(|ch| !is_combining_diacritic(*ch))
        .nfc()
        .collect();

    let mut slug = String::with_capacity(folded.len());
    let mut gap = false;
    for ch in folded.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            gap = false;
            slug.push(ch);
        } else {
            gap = true;
        }
    }
    slug
}

/// Slug for a new series, falling back to `series-<base36 millis>` when the
/// title has nothing sluggable in it.
pub fn generate_series_slug(title: &str) -> String {
    let slug = slugify(title);
    if !slug.is_empty() {
        return slug;
    }
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{FALLBACK_PREFIX}-{}", base36(millis))
}

/// Collision candidate derived from the base slug, never from a previous
/// candidate.
pub fn with_suffix(base: &str, suffix: u32) -> String {
    format!("{base}-{suffix}")
}

fn is_combining_diacritic(ch: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&ch)
}

fn base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize] as char);
        value /= 36;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_titles_fold_accents_and_punctuation() {
        assert_eq!(slugify("Café Noir!"), "cafe-noir");
        assert_eq!(slugify("  --Hello__World--  "), "hello-world");
        assert_eq!(slugify("Ｓｅａｓｏｎ　２"), "season-2");
    }

    #[test]
    fn japanese_title_is_stable() {
        let first = generate_series_slug("癒し乃さくら");
        assert_eq!(first, "癒し乃さくら");
        for _ in 0..5 {
            assert_eq!(generate_series_slug("癒し乃さくら"), first);
        }
    }

    #[test]
    fn voiced_kana_survive_normalization() {
        assert_eq!(slugify("がぎ ぱ"), "がぎ-ぱ");
    }

    #[test]
    fn emoji_only_title_uses_fallback() {
        assert_eq!(slugify("🎬🎬🎬"), "");
        let slug = generate_series_slug("🎬🎬🎬");
        let token = slug.strip_prefix("series-").expect("fallback prefix");
        assert!(!token.is_empty());
        assert!(token
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch.is_ascii_lowercase()));
    }

    #[test]
    fn empty_input_still_yields_slug() {
        assert!(generate_series_slug("").starts_with("series-"));
    }

    #[test]
    fn generated_slugs_have_no_edge_or_double_hyphens() {
        for title in ["A -- B", "!!x!!", "Ep. 01: Start", "MIXED Case"] {
            let slug = generate_series_slug(title);
            assert!(!slug.starts_with('-') && !slug.ends_with('-'), "{slug}");
            assert!(!slug.contains("--"), "{slug}");
            assert_eq!(slug, slug.to_lowercase());
        }
    }

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }

    #[test]
    fn suffix_appends_to_base() {
        assert_eq!(with_suffix("sakura", 42), "sakura-42");
    }

    #[test]
    fn only_ascii_separator_is_hyphen() {
        let slug = slugify("癒し乃さくら: Season 2 / 第二期");
        assert_eq!(slug, "癒し乃さくら-season-2-第二期");
        assert!(slug
            .chars()
            .filter(char::is_ascii)
            .all(|ch| ch == '-' || ch.is_ascii_lowercase() || ch.is_ascii_digit()));
    }
}
