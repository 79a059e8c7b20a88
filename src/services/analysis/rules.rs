use super::{Dependency, LanguageAnalyzer, Token, TokenKind};
use crate::core::error::AnalysisError;
use async_trait::async_trait;
use std::collections::HashSet;

/// Capitalized words that never start a name on their own.
const STOPWORDS: &[&str] = &[
    // English
    "a", "an", "and", "but", "he", "her", "his", "how", "i", "if", "it", "its", "my", "no",
    "not", "oh", "or", "our", "she", "so", "that", "the", "their", "then", "there", "these",
    "they", "this", "those", "we", "well", "what", "when", "where", "who", "why", "yes", "you",
    "your",
    // Spanish
    "al", "allí", "aquí", "con", "cuando", "cómo", "de", "del", "dónde", "el", "ella", "ellas",
    "ellos", "en", "entonces", "esa", "ese", "eso", "esta", "este", "esto", "la", "las", "le",
    "lo", "los", "mi", "nosotros", "o", "para", "pero", "por", "que", "qué", "quién", "se",
    "su", "sus", "sí", "también", "tu", "tú", "un", "una", "unas", "unos", "usted", "y", "yo",
    "él",
];

/// Heuristic analyzer: names are runs of capitalized words, and a name's head
/// is the neighbouring speech verb when there is one.
#[derive(Debug, Clone)]
pub struct RuleBasedAnalyzer {
    speech_verbs: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct RawToken<'a> {
    text: &'a str,
    word: bool,
    sentence_start: bool,
}

/// A run of capitalized words.
#[derive(Debug, Clone, PartialEq)]
struct NameRun {
    /// Token index range of the run, stopwords stripped.
    start: usize,
    end: usize,
    surface: String,
    sentence_start: bool,
}

fn is_stopword(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOPWORDS.contains(&lower.as_str())
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn tokenize(text: &str) -> Vec<RawToken<'_>> {
    let mut tokens = Vec::new();
    let mut boundary = true;
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            if c == '\n' {
                boundary = true;
            }
            prev = Some(c);
            continue;
        }

        if c.is_alphanumeric() {
            let mut end = start + c.len_utf8();
            let mut last = c;
            while let Some(&(i, next)) = chars.peek() {
                let joiner = matches!(next, '\'' | '’' | '-') && last.is_alphanumeric();
                if next.is_alphanumeric() || joiner {
                    end = i + next.len_utf8();
                    last = next;
                    chars.next();
                } else {
                    break;
                }
            }
            let word = text[start..end].trim_end_matches(&['\'', '’', '-'][..]);
            tokens.push(RawToken {
                text: word,
                word: true,
                sentence_start: boundary,
            });
            boundary = false;
            prev = Some(last);
            continue;
        }

        let opening_quote = c == '"' && prev.is_none_or(char::is_whitespace);
        match c {
            '.' | '!' | '?' | '¿' | '¡' | '…' | ':' | '«' | '“' => boundary = true,
            '"' if opening_quote => boundary = true,
            // A closing mark ends the quote, not the surrounding sentence.
            '"' | '»' | '”' => boundary = false,
            ',' | ';' => boundary = false,
            _ => {}
        }
        tokens.push(RawToken {
            text: &text[start..start + c.len_utf8()],
            word: false,
            sentence_start: false,
        });
        prev = Some(c);
    }
    tokens
}

fn name_runs(tokens: &[RawToken<'_>]) -> Vec<NameRun> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if !(tokens[i].word && is_capitalized(tokens[i].text)) {
            i += 1;
            continue;
        }
        let mut end = i + 1;
        while end < tokens.len()
            && tokens[end].word
            && !tokens[end].sentence_start
            && is_capitalized(tokens[end].text)
        {
            end += 1;
        }

        let mut start = i;
        while start < end && is_stopword(tokens[start].text) {
            start += 1;
        }
        let mut stop = end;
        while stop > start && is_stopword(tokens[stop - 1].text) {
            stop -= 1;
        }
        if start < stop {
            let surface = tokens[start..stop]
                .iter()
                .map(|t| t.text)
                .collect::<Vec<_>>()
                .join(" ");
            runs.push(NameRun {
                start,
                end: stop,
                surface,
                sentence_start: start == i && tokens[i].sentence_start,
            });
        }
        i = end;
    }
    runs
}

impl RuleBasedAnalyzer {
    pub fn new(speech_verbs: &[String]) -> Self {
        Self {
            speech_verbs: speech_verbs.iter().map(|v| v.to_lowercase()).collect(),
        }
    }

    /// Capitalized runs are names unless they only ever appear at the start
    /// of a sentence.
    pub fn find_names(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text);
        let runs = name_runs(&tokens);
        let confirmed: HashSet<&str> = runs
            .iter()
            .filter(|r| !r.sentence_start)
            .map(|r| r.surface.as_str())
            .collect();

        let mut names: Vec<String> = Vec::new();
        for run in &runs {
            if confirmed.contains(run.surface.as_str()) && !names.contains(&run.surface) {
                names.push(run.surface.clone());
            }
        }
        names
    }

    fn is_speech_verb(&self, token: &Token) -> bool {
        token.kind == TokenKind::Word && self.speech_verbs.contains(&token.lemma)
    }
}

#[async_trait]
impl LanguageAnalyzer for RuleBasedAnalyzer {
    async fn person_entities(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(self.find_names(text))
    }

    fn parse(&self, text: &str) -> Vec<Token> {
        let raw = tokenize(text);
        let runs = name_runs(&raw);

        let mut tokens: Vec<Token> = Vec::with_capacity(raw.len());
        let mut i = 0;
        let mut run_iter = runs.iter().peekable();
        while i < raw.len() {
            if let Some(run) = run_iter.next_if(|r| r.start == i) {
                tokens.push(Token {
                    text: run.surface.clone(),
                    lemma: run.surface.to_lowercase(),
                    kind: TokenKind::ProperNoun,
                    dep: Dependency::Subject,
                    head: None,
                });
                i = run.end;
                continue;
            }
            let t = &raw[i];
            tokens.push(Token {
                text: t.text.to_string(),
                lemma: t.text.to_lowercase(),
                kind: if t.word { TokenKind::Word } else { TokenKind::Punct },
                dep: Dependency::Other,
                head: None,
            });
            i += 1;
        }

        // Attach every name to a neighbouring word, preferring a speech verb.
        for idx in 0..tokens.len() {
            if tokens[idx].kind != TokenKind::ProperNoun {
                continue;
            }
            let prev = idx
                .checked_sub(1)
                .filter(|&p| tokens[p].kind == TokenKind::Word);
            let next = Some(idx + 1).filter(|&n| n < tokens.len() && tokens[n].kind == TokenKind::Word);

            let head = next
                .filter(|&n| self.is_speech_verb(&tokens[n]))
                .or_else(|| prev.filter(|&p| self.is_speech_verb(&tokens[p])))
                .or(prev)
                .or(next);
            tokens[idx].head = head;
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::super::children;
    use super::*;
    use crate::services::analysis::default_speech_verbs;

    fn analyzer() -> RuleBasedAnalyzer {
        let mut verbs = default_speech_verbs();
        verbs.push("said".to_string());
        RuleBasedAnalyzer::new(&verbs)
    }

    #[test]
    fn test_names_in_first_appearance_order() {
        let text = "Juan miró a María. \"¿Vienes?\", preguntó Juan. \"Sí,\" respondió María.";
        assert_eq!(analyzer().find_names(text), vec!["Juan", "María"]);
    }

    #[test]
    fn test_sentence_initial_words_need_confirmation() {
        let text = "He said nothing. \"Hello,\" said Mara. \"Fine.\"";
        assert_eq!(analyzer().find_names(text), vec!["Mara"]);
    }

    #[test]
    fn test_name_right_after_closing_quote_is_not_sentence_initial() {
        let text = "\"¡Corre!\" Mara gritó.\n\n\"¿Adónde?\" Kiran preguntó. «¡Ya!» Eva susurró.";
        assert_eq!(analyzer().find_names(text), vec!["Mara", "Kiran", "Eva"]);
    }

    #[test]
    fn test_multi_word_names_are_merged() {
        let text = "The order came from Capitana Eva Ruiz. Nobody argued with Capitana Eva Ruiz.";
        assert_eq!(analyzer().find_names(text), vec!["Capitana Eva Ruiz"]);
    }

    #[test]
    fn test_leading_stopword_is_stripped() {
        let text = "But Kiran laughed, and then Kiran left.";
        assert_eq!(analyzer().find_names(text), vec!["Kiran"]);
    }

    #[test]
    fn test_parse_attaches_subject_to_speech_verb() {
        let a = analyzer();
        let tokens = a.parse(", preguntó Juan. ");
        let verb = tokens.iter().position(|t| t.lemma == "preguntó").unwrap();
        let subjects: Vec<&str> = children(&tokens, verb)
            .filter(|t| t.dep == Dependency::Subject)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(subjects, vec!["Juan"]);
    }

    #[test]
    fn test_parse_prefers_following_speech_verb() {
        let a = analyzer();
        let tokens = a.parse(" then Mara said quietly.");
        let mara = tokens.iter().find(|t| t.text == "Mara").unwrap();
        assert_eq!(tokens[mara.head.unwrap()].lemma, "said");
    }

    #[test]
    fn test_tokenize_keeps_apostrophes_inside_words() {
        let words: Vec<&str> = tokenize("Kiran's ship, isn't it?")
            .into_iter()
            .filter(|t| t.word)
            .map(|t| t.text)
            .collect();
        assert_eq!(words, vec!["Kiran's", "ship", "isn't", "it"]);
    }
}
