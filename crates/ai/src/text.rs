//! Keyword matching helpers shared by the analyzer, rules and scorer.
//!
//! Matching is case-insensitive over a normalized copy of the text. Terms that
//! start or end with an alphanumeric character only match on word boundaries,
//! so "rate" does not match "accurate".

use leadflow_core::Message;

/// Lowercase and fold typographic apostrophes.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Number of boundary-respecting occurrences of `term` in `haystack`.
///
/// `haystack` must already be normalized; `term` must be lowercase.
pub fn count_term(haystack: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let check_start = term.chars().next().is_some_and(is_word_char);
    let check_end = term.chars().last().is_some_and(is_word_char);

    haystack
        .match_indices(term)
        .filter(|(idx, _)| {
            let before_ok = !check_start
                || haystack[..*idx]
                    .chars()
                    .next_back()
                    .is_none_or(|c| !is_word_char(c));
            let after_ok = !check_end
                || haystack[idx + term.len()..]
                    .chars()
                    .next()
                    .is_none_or(|c| !is_word_char(c));
            before_ok && after_ok
        })
        .count()
}

pub fn contains_term(haystack: &str, term: &str) -> bool {
    count_term(haystack, term) > 0
}

pub fn contains_any(haystack: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| contains_term(haystack, t))
}

/// Total occurrences of all terms.
pub fn count_terms(haystack: &str, terms: &[&str]) -> usize {
    terms.iter().map(|t| count_term(haystack, t)).sum()
}

/// Sentences of `text` (split on terminal punctuation and newlines).
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

const POSITIVE: &[&str] = &[
    "great", "love", "perfect", "thanks", "thank you", "awesome", "interested", "excellent",
    "good", "nice", "yes", "sounds good", "excited", "appreciate", "happy",
];

const NEGATIVE: &[&str] = &[
    "bad", "expensive", "hate", "terrible", "annoyed", "stop", "frustrated", "disappointed",
    "ridiculous", "not interested", "waste", "no thanks", "scam", "angry", "unhappy",
];

/// Lexicon sentiment in \[-1, 1\]; 0 when no sentiment word is present.
pub fn sentiment_score(text: &str) -> f64 {
    let norm = normalize(text);
    let pos = count_terms(&norm, POSITIVE) as f64;
    let neg = count_terms(&norm, NEGATIVE) as f64;
    if pos + neg == 0.0 {
        return 0.0;
    }
    (pos - neg) / (pos + neg)
}

/// Normalized text of all inbound messages, oldest first.
pub fn customer_text(transcript: &[Message]) -> String {
    let bodies: Vec<String> = transcript
        .iter()
        .filter(|m| m.is_inbound())
        .map(|m| normalize(&m.body))
        .collect();
    bodies.join("\n")
}

/// Normalized text of the whole transcript.
pub fn transcript_text(transcript: &[Message]) -> String {
    let bodies: Vec<String> = transcript.iter().map(|m| normalize(&m.body)).collect();
    bodies.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_respect_word_boundaries() {
        assert!(contains_term("what's the rate?", "rate"));
        assert!(!contains_term("that is accurate", "rate"));
        assert!(contains_term("need a 4x4", "4x4"));
        assert_eq!(count_term("tow it, tow it again", "tow"), 2);
        assert!(contains_term("about $400 a month", "$"));
    }

    #[test]
    fn normalize_folds_curly_apostrophes() {
        assert_eq!(normalize("What\u{2019}s UP"), "what's up");
    }

    #[test]
    fn sentiment_is_bounded_and_signed() {
        assert_eq!(sentiment_score("ok"), 0.0);
        assert!(sentiment_score("Great, love it, thanks") > 0.9);
        assert!(sentiment_score("this is too expensive, frustrated") < -0.9);
        let mixed = sentiment_score("great truck but expensive");
        assert!((-1.0..=1.0).contains(&mixed));
    }

    #[test]
    fn sentences_split_on_punctuation() {
        let parts: Vec<&str> = sentences("I need to tow. Maybe AWD? ok").collect();
        assert_eq!(parts, vec!["I need to tow", "Maybe AWD", "ok"]);
    }
}
