use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TERM_RE: Regex = Regex::new(r"(?u)[#@]?\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Split post text into index terms: NFKC, lowercase, English stemming.
/// Hashtags and mentions keep their sigil and are left unstemmed.
/// Each term is returned once, in order of first appearance.
pub fn terms(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for mat in TERM_RE.find_iter(&normalized) {
        let token = mat.as_str();
        let term = if token.starts_with('#') || token.starts_with('@') {
            token.to_string()
        } else {
            STEMMER.stem(token).into_owned()
        };
        if seen.insert(term.clone()) {
            out.push(term);
        }
    }
    out
}
