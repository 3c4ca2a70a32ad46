//! Pronunciation tokenizer.
//! Splits a pronunciation string into syllable tokens (rendered as chips) and
//! punctuation separators (`/ ? ! ,`, rendered inline).

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Punctuation marks that become standalone separator tokens.
pub const SEPARATORS: [&str; 4] = ["/", "?", "!", ","];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Token {
    Syllable(String),
    Separator(String),
}

impl Token {
    pub fn as_str(&self) -> &str {
        match self {
            Token::Syllable(s) | Token::Separator(s) => s,
        }
    }

    pub fn is_separator(&self) -> bool {
        matches!(self, Token::Separator(_))
    }
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[/?!,]").unwrap())
}

/// Pad every separator with spaces, collapse whitespace runs and trim.
pub fn normalize(pron: &str) -> String {
    let spaced = separator_pattern().replace_all(pron, " $0 ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokenize a pronunciation string. Hyphens split syllables within a word;
/// empty fragments from doubled hyphens are dropped.
pub fn tokenize(pron: &str) -> Vec<Token> {
    let normalized = normalize(pron);
    let mut tokens = Vec::new();

    for word in normalized.split_whitespace() {
        if SEPARATORS.contains(&word) {
            tokens.push(Token::Separator(word.to_string()));
        } else {
            tokens.extend(
                word.split('-')
                    .filter(|syllable| !syllable.is_empty())
                    .map(|syllable| Token::Syllable(syllable.to_string())),
            );
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(Token::as_str).collect()
    }

    #[test]
    fn greeting_example() {
        let tokens = tokenize("kon-ni-chi-wa , ogenki desu ka ?");
        assert_eq!(
            texts(&tokens),
            vec!["kon", "ni", "chi", "wa", ",", "ogenki", "desu", "ka", "?"]
        );
        assert!(tokens[4].is_separator());
        assert!(!tokens[5].is_separator());
    }

    #[test]
    fn separators_attached_to_words_are_split_out() {
        let tokens = tokenize("sa-wat-dee/khrap!");
        assert_eq!(texts(&tokens), vec!["sa", "wat", "dee", "/", "khrap", "!"]);
    }

    #[test]
    fn adjacent_hyphens_drop_empty_fragments() {
        assert_eq!(texts(&tokenize("a--ri-")), vec!["a", "ri"]);
        assert_eq!(texts(&tokenize("-")), Vec::<&str>::new());
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["a,b", "  x  /  y ", "ni-hao?!", "", "one , two"] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn tokens_reconstruct_normalized_words() {
        let input = "dan-ke  schön ,bit-te!";
        let rebuilt: Vec<String> = normalize(input)
            .split_whitespace()
            .map(|w| {
                if SEPARATORS.contains(&w) {
                    w.to_string()
                } else {
                    w.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-")
                }
            })
            .collect();

        let flattened: Vec<String> = rebuilt
            .iter()
            .flat_map(|w| w.split('-').map(str::to_string).collect::<Vec<_>>())
            .collect();
        assert_eq!(texts(&tokenize(input)), flattened);
        assert_eq!(rebuilt.join(" "), "dan-ke schön , bit-te !");
    }
}
