//! Number-word vocabulary shared by the spoken-number parser and the
//! grammar builder.
//!
//! The tables form a closed vocabulary: every value in 0..=1000 can be
//! written as a composition of these entries, which the round-trip tests
//! in `numbers` rely on.

/// Words for 0 through 9.
pub const ONES: [(&str, u32); 10] = [
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
];

/// Words for 10 through 19.
pub const TEENS: [(&str, u32); 10] = [
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
];

/// Words for the multiples of ten from 20 through 90.
pub const TENS: [(&str, u32); 8] = [
    ("twenty", 20),
    ("thirty", 30),
    ("forty", 40),
    ("fifty", 50),
    ("sixty", 60),
    ("seventy", 70),
    ("eighty", 80),
    ("ninety", 90),
];

/// Scale words.
pub const HUNDRED: &str = "hundred";
pub const THOUSAND: &str = "thousand";

/// Recognizer-artifact homophones. Speech engines routinely emit "to" and
/// "for" where the speaker said "two" and "four"; both must parse as the
/// digit. This is deliberate tolerance, not sloppy matching.
pub const HOMOPHONES: [(&str, u32); 3] = [("to", 2), ("too", 2), ("for", 4)];

/// Exact lexicon lookup for a single word (zero through ninety).
pub fn word_value(word: &str) -> Option<u32> {
    ONES.iter()
        .chain(TEENS.iter())
        .chain(TENS.iter())
        .find(|(w, _)| *w == word)
        .map(|(_, v)| *v)
}

/// Like [`word_value`], but also accepts the documented homophones.
pub fn spoken_word_value(word: &str) -> Option<u32> {
    word_value(word).or_else(|| {
        HOMOPHONES
            .iter()
            .find(|(w, _)| *w == word)
            .map(|(_, v)| *v)
    })
}

/// Value of a ones word (one through nine), homophones included.
/// Used for the multiplier in "<ones> hundred" and the trailing digit in
/// compound tens.
pub fn ones_value(word: &str) -> Option<u32> {
    spoken_word_value(word).filter(|v| (1..=9).contains(v))
}

/// Value of a tens word (twenty through ninety).
pub fn tens_value(word: &str) -> Option<u32> {
    TENS.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
}

/// Word for a value in 0..=19.
pub fn unit_word(n: u32) -> Option<&'static str> {
    ONES.iter()
        .chain(TEENS.iter())
        .find(|(_, v)| *v == n)
        .map(|(w, _)| *w)
}

/// Word for a multiple of ten in 20..=90.
pub fn tens_word(n: u32) -> Option<&'static str> {
    TENS.iter().find(|(_, v)| *v == n).map(|(w, _)| *w)
}
