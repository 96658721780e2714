//! Recognizer grammar construction.
//!
//! A constrained recognizer only ever outputs words from the vocabulary it
//! was created with, which is what keeps accuracy usable for command
//! input. The vocabulary here is every spoken number 0..=1000 plus the
//! fixed navigation keyword set; it is rebuilt once per session start and
//! handed to the engine, never mutated afterwards.

use std::collections::HashSet;

use crate::numbers::{MAX_SPOKEN, number_to_words};

/// Keywords the command patterns match on. "prev", "goto" and friends are
/// kept because recognizers emit them as single tokens.
pub const NAVIGATION_KEYWORDS: [&str; 17] = [
    "next", "previous", "prev", "forward", "backward", "back", "go to", "goto", "select", "open",
    "show", "order", "orders", "first", "last", "page", "item",
];

/// Build the full session vocabulary. Pure and deterministic; the output
/// is duplicate-free.
pub fn build_vocabulary() -> Vec<String> {
    build_vocabulary_with_extra(&[])
}

/// [`build_vocabulary`] plus caller-supplied words (config-provided
/// additions), deduplicated against the built-in set.
pub fn build_vocabulary_with_extra(extra: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut vocabulary = Vec::with_capacity(MAX_SPOKEN as usize + 1 + NAVIGATION_KEYWORDS.len());

    for n in 0..=MAX_SPOKEN {
        push_unique(&mut vocabulary, &mut seen, number_to_words(n));
    }
    for keyword in NAVIGATION_KEYWORDS {
        push_unique(&mut vocabulary, &mut seen, keyword.to_string());
    }
    for word in extra {
        push_unique(&mut vocabulary, &mut seen, word.to_lowercase());
    }

    vocabulary
}

fn push_unique(vocabulary: &mut Vec<String>, seen: &mut HashSet<String>, word: String) {
    if seen.insert(word.clone()) {
        vocabulary.push(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_numbers_and_keywords() {
        let vocab = build_vocabulary();
        assert!(vocab.contains(&"zero".to_string()));
        assert!(vocab.contains(&"five hundred sixty seven".to_string()));
        assert!(vocab.contains(&"one thousand".to_string()));
        for keyword in NAVIGATION_KEYWORDS {
            assert!(vocab.contains(&keyword.to_string()), "missing {}", keyword);
        }
    }

    #[test]
    fn test_duplicate_free() {
        let vocab = build_vocabulary();
        let unique: HashSet<_> = vocab.iter().collect();
        assert_eq!(unique.len(), vocab.len());
        // 1001 number phrases, none of which collide with a keyword.
        assert_eq!(vocab.len(), 1001 + NAVIGATION_KEYWORDS.len());
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(build_vocabulary(), build_vocabulary());
    }

    #[test]
    fn test_extra_words_deduplicated() {
        let extra = vec!["invoice".to_string(), "Next".to_string()];
        let vocab = build_vocabulary_with_extra(&extra);
        assert!(vocab.contains(&"invoice".to_string()));
        assert_eq!(vocab.iter().filter(|w| *w == "next").count(), 1);
    }
}
