//! Spoken-number parsing for order selection.
//!
//! Converts utterance fragments like "thirty one", "five hundred and sixty
//! seven", or "order 12" into integers in 0..=1000. The inverse,
//! [`number_to_words`], exists only to enumerate the recognizer grammar and
//! round-trips through the parser for every value in the domain.

use crate::lexicon;

/// Largest value a spoken phrase may resolve to.
pub const MAX_SPOKEN: u32 = 1000;

/// Parse a spoken fragment into an integer in 0..=1000.
///
/// Match attempts run in priority order: literal digits, "thousand",
/// hundreds phrases (with recursive remainder), compound tens, then a
/// single lexicon word anywhere in the fragment. Returns `None` when
/// nothing matches or the value falls outside the domain.
pub fn parse_spoken_number(text: &str) -> Option<u32> {
    let text = text.to_lowercase().replace('-', " ");
    let tokens: Vec<&str> = text.split_whitespace().collect();

    // 1. A literal digit run wins outright, but an oversized one fails the
    // whole parse rather than falling through to word matching.
    if let Some(run) = first_digit_run(&text) {
        let n: u32 = run.parse().ok()?;
        return (n <= MAX_SPOKEN).then_some(n);
    }

    // 2. "thousand" in any position; 1000 is the only supported value.
    if tokens.contains(&lexicon::THOUSAND) {
        return Some(MAX_SPOKEN);
    }

    // 3/4. "<ones> hundred [and] [remainder]". An unparseable remainder
    // counts as zero; a sum past 1000 fails the parse.
    if let Some(idx) = tokens.iter().position(|t| *t == lexicon::HUNDRED) {
        if idx > 0 {
            if let Some(h) = lexicon::ones_value(tokens[idx - 1]) {
                let mut rest = &tokens[idx + 1..];
                if rest.first() == Some(&"and") {
                    rest = &rest[1..];
                }
                let remainder = if rest.is_empty() {
                    0
                } else {
                    parse_spoken_number(&rest.join(" ")).unwrap_or(0)
                };
                let value = h * 100 + remainder;
                return (value <= MAX_SPOKEN).then_some(value);
            }
        }
    }

    // 5. Compound tens: "thirty one", "ninety for" (homophone).
    for pair in tokens.windows(2) {
        if let (Some(t), Some(o)) = (lexicon::tens_value(pair[0]), lexicon::ones_value(pair[1])) {
            return Some(t + o);
        }
    }

    // 6. First token with an exact lexicon match, homophones included.
    tokens.iter().find_map(|t| lexicon::spoken_word_value(t))
}

/// English words for a value in 0..=1000, in the same shape the parser
/// accepts. Out-of-domain values fall back to their digit form.
pub fn number_to_words(n: u32) -> String {
    match n {
        0..=19 => match lexicon::unit_word(n) {
            Some(w) => w.to_string(),
            None => n.to_string(),
        },
        20..=99 => {
            let tens = lexicon::tens_word(n / 10 * 10).unwrap_or_default();
            if n % 10 == 0 {
                tens.to_string()
            } else {
                format!("{} {}", tens, number_to_words(n % 10))
            }
        }
        100..=999 => {
            let hundreds = format!("{} {}", number_to_words(n / 100), lexicon::HUNDRED);
            if n % 100 == 0 {
                hundreds
            } else {
                format!("{} {}", hundreds, number_to_words(n % 100))
            }
        }
        1000 => format!("one {}", lexicon::THOUSAND),
        _ => n.to_string(),
    }
}

fn first_digit_run(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
