// 📏 Similarity Scorer - normalized Levenshtein similarity between names
//
// similarity = 1 - distance / max(len_a, len_b), lengths in chars after
// normalization. Identical normalized forms (including two empty strings)
// score exactly 1.0.

use crate::normalize::normalize;

/// Similarity of two display names in [0.0, 1.0]
///
/// Example:
/// - similarity("Burj Khalifa", "Burj Kalifa") ≈ 0.917 (one deletion over 12 chars)
/// - similarity("Dubai", "DUBAI!") = 1.0
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    normalized_similarity(&a, &b)
}

/// Same as `similarity` but for strings that are already normalized
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let longest = len_a.max(len_b);

    let distance = levenshtein_distance(a, b);
    1.0 - distance as f64 / longest as f64
}

/// Calculate Levenshtein distance between two strings
///
/// Levenshtein distance = minimum number of single-character edits
/// (insertions, deletions, substitutions) to change one string into another
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    // Two rolling rows instead of the full matrix
    let mut previous: Vec<usize> = (0..=len2).collect();
    let mut current = vec![0; len2 + 1];

    for i in 1..=len1 {
        current[0] = i;

        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] {
                0
            } else {
                1
            };

            current[j] = std::cmp::min(
                std::cmp::min(
                    previous[j] + 1,    // deletion
                    current[j - 1] + 1, // insertion
                ),
                previous[j - 1] + cost, // substitution
            );
        }

        std::mem::swap(&mut previous, &mut current);
    }

    previous[len2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "ab"), 1);
        assert_eq!(levenshtein_distance("abc", "abcd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "dubai"), 5);
    }

    #[test]
    fn test_levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein_distance("café", "cafe"), 1);
        assert_eq!(levenshtein_distance("zürich", "zurich"), 1);
    }

    #[test]
    fn test_identity_scores_one() {
        for s in ["", "Dubai", "Burj Khalifa", "  !!  ", "Café"] {
            assert_eq!(similarity(s, s), 1.0);
        }
    }

    #[test]
    fn test_both_empty_after_normalization() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("!!!", "   "), 1.0);
    }

    #[test]
    fn test_one_empty() {
        assert_eq!(similarity("", "Dubai"), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("Burj Khalifa", "Burj Kalifa"),
            ("Dubai Mall", "The Dubai Mall"),
            ("Atlantis", "Atlantis The Palm"),
            ("", "x"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn test_burj_khalifa_typo() {
        let s = similarity("Burj Khalifa", "Burj Kalifa");
        assert!((s - 11.0 / 12.0).abs() < 1e-9);
        assert!(s > 0.9 && s < 0.95);
    }

    #[test]
    fn test_typo_scores_higher_than_extra_word() {
        let typo = similarity("Dubai Marina", "Dubai Marena");
        let extra_word = similarity("Dubai Marina", "Dubai Marina Walk");
        assert!(typo > extra_word);
    }

    #[test]
    fn test_fewer_edits_scores_higher_same_length() {
        let one_edit = similarity("abcdefgh", "abcdefgX");
        let two_edits = similarity("abcdefgh", "abcdefXX");
        assert!(one_edit > two_edits);
    }

    #[test]
    fn test_normalization_applies_before_scoring() {
        assert_eq!(similarity("DUBAI!", "dubai"), 1.0);
        assert_eq!(similarity("Reader\u{2019}s Guide", "reader's guide"), 1.0);
    }

    #[test]
    fn test_range() {
        let s = similarity("Louvre", "Colosseum");
        assert!((0.0..=1.0).contains(&s));
    }
}
