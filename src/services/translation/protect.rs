use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Placeholder -> original term, for one protected text.
pub type TermMap = HashMap<String, String>;

/// Shields proper nouns and configured terms from the translation model by
/// swapping them for `__TERM{n}__` placeholders.
#[derive(Debug, Clone, Default)]
pub struct TermProtector {
    protected_terms: Vec<String>,
}

fn proper_noun_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:\. |, )(\p{Lu}\p{Ll}+)\b").expect("proper noun pattern is valid")
    })
}

impl TermProtector {
    pub fn new(protected_terms: &[String]) -> Self {
        let mut terms: Vec<String> = Vec::new();
        for term in protected_terms {
            let term = term.trim();
            if !term.is_empty() && !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }
        Self { protected_terms: terms }
    }

    /// Capitalized words right after ". " or ", ", in first-seen order.
    pub fn find_proper_nouns(texts: &[String]) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for text in texts {
            for cap in proper_noun_pattern().captures_iter(text) {
                let noun = cap[1].to_string();
                if !found.contains(&noun) {
                    found.push(noun);
                }
            }
        }
        found
    }

    /// Configured terms first, then the proper nouns detected in `texts`.
    pub fn terms_for(&self, texts: &[String]) -> Vec<String> {
        let mut terms = self.protected_terms.clone();
        for noun in Self::find_proper_nouns(texts) {
            if !terms.iter().any(|t| t.eq_ignore_ascii_case(&noun)) {
                terms.push(noun);
            }
        }
        terms
    }

    pub fn protect(&self, texts: &[String]) -> (Vec<String>, Vec<TermMap>) {
        let terms = self.terms_for(texts);
        let patterns: Vec<(String, &String, Option<Regex>)> = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (format!("__TERM{}__", i), term, whole_word(term)))
            .collect();

        let mut protected = Vec::with_capacity(texts.len());
        let mut maps = Vec::with_capacity(texts.len());

        for text in texts {
            let mut current = text.clone();
            let mut map = TermMap::new();
            for (placeholder, term, pattern) in &patterns {
                let Some(pattern) = pattern else { continue };
                if pattern.is_match(&current) {
                    current = pattern
                        .replace_all(&current, regex::NoExpand(placeholder))
                        .into_owned();
                    map.insert(placeholder.clone(), (*term).clone());
                }
            }
            protected.push(current);
            maps.push(map);
        }

        (protected, maps)
    }

    pub fn restore(texts: &[String], maps: &[TermMap]) -> Vec<String> {
        texts
            .iter()
            .zip(maps)
            .map(|(text, map)| {
                map.iter()
                    .fold(text.clone(), |acc, (placeholder, term)| acc.replace(placeholder, term))
            })
            .collect()
    }
}

fn whole_word(term: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(term)))
        .case_insensitive(true)
        .build()
        .ok()
}
