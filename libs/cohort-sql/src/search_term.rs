//! Free-text search term normalization.
//!
//! Turns what a user typed into the criteria search box into either a code
//! prefix pattern (`001.1%`) or a boolean-mode full-text expression
//! (`+"lung"+can*`). The function is total: anything that yields no usable
//! words normalizes to [`SearchTerm::Empty`].

use phf::phf_set;
use std::collections::HashSet;
use std::fmt;

/// MySQL InnoDB default full-text stop words.
static DEFAULT_STOP_WORDS: phf::Set<&'static str> = phf_set! {
    "a", "about", "an", "are", "as", "at", "be", "by", "com", "de", "en", "for",
    "from", "how", "i", "in", "is", "it", "la", "of", "on", "or", "that", "the",
    "this", "to", "was", "what", "when", "where", "who", "will", "with", "und",
    "www",
};

/// Boolean-mode operators that carry no meaning inside a bare word.
const OPERATOR_CHARS: &[char] = &['<', '>', '(', ')', '~', '*', '"', '@'];

/// Case-insensitive stop-word set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWords {
    words: HashSet<String>,
}

impl StopWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn none() -> Self {
        Self {
            words: HashSet::new(),
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }
}

impl Default for StopWords {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_WORDS.iter())
    }
}

/// Normalized form of a search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    /// Nothing searchable remained
    Empty,
    /// Numeric code, matched by prefix with `LIKE`
    Like(String),
    /// Boolean-mode full-text expression
    Match(String),
}

impl SearchTerm {
    pub fn parse(raw: &str, stop_words: &StopWords) -> Self {
        let trimmed = raw.trim();
        if is_numeric_code(trimmed) {
            return SearchTerm::Like(format!("{}%", trimmed));
        }

        let terms = collect_terms(trimmed, stop_words);
        if terms.is_empty() {
            return SearchTerm::Empty;
        }
        SearchTerm::Match(render_terms(&terms))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SearchTerm::Empty => "",
            SearchTerm::Like(s) | SearchTerm::Match(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SearchTerm::Empty)
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize `raw` into a LIKE pattern or boolean-mode expression; empty when
/// nothing searchable remains.
pub fn normalize(raw: &str, stop_words: &StopWords) -> String {
    SearchTerm::parse(raw, stop_words).as_str().to_string()
}

fn is_numeric_code(s: &str) -> bool {
    !s.is_empty()
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
        && s.matches('.').count() <= 1
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Word { sigil: Option<char>, text: String },
    Phrase { sigil: Option<char>, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    /// Bare inclusion word, candidate for the trailing wildcard
    Word(String),
    Phrase { exclude: bool, text: String },
    Exclude(String),
}

fn collect_terms(input: &str, stop_words: &StopWords) -> Vec<Term> {
    let mut terms = Vec::new();
    for tok in Lexer::new(input) {
        match tok {
            Tok::Word {
                sigil: Some('*'), ..
            }
            | Tok::Phrase {
                sigil: Some('*'), ..
            } => continue,
            Tok::Phrase { sigil, text } => {
                let text = text
                    .split(|c: char| c.is_whitespace() || c == '"')
                    .filter(|w| !w.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                if text.is_empty() {
                    continue;
                }
                terms.push(Term::Phrase {
                    exclude: sigil == Some('-'),
                    text,
                });
            }
            Tok::Word { sigil, text } => {
                let cleaned: String = text.chars().filter(|c| !OPERATOR_CHARS.contains(c)).collect();
                let cleaned = cleaned.trim_matches(|c: char| !c.is_alphanumeric());
                if cleaned.is_empty() || stop_words.contains(cleaned) {
                    continue;
                }
                let punctuated = cleaned.chars().any(|c| !c.is_alphanumeric());
                terms.push(match (sigil, punctuated) {
                    (Some('-'), _) => Term::Exclude(cleaned.to_string()),
                    (_, true) => Term::Phrase {
                        exclude: false,
                        text: cleaned.to_string(),
                    },
                    (_, false) => Term::Word(cleaned.to_string()),
                });
            }
        }
    }
    terms
}

fn render_terms(terms: &[Term]) -> String {
    let last_word = terms.iter().rposition(|t| matches!(t, Term::Word(_)));
    let mut out = String::new();
    for (i, term) in terms.iter().enumerate() {
        match term {
            Term::Word(w) if Some(i) == last_word => {
                out.push('+');
                out.push_str(w);
                out.push('*');
            }
            Term::Word(w) => {
                out.push_str("+\"");
                out.push_str(w);
                out.push('"');
            }
            Term::Phrase { exclude, text } => {
                out.push(if *exclude { '-' } else { '+' });
                out.push('"');
                out.push_str(text);
                out.push('"');
            }
            Term::Exclude(w) if w.chars().any(|c| !c.is_alphanumeric()) => {
                out.push_str("-\"");
                out.push_str(w);
                out.push('"');
            }
            Term::Exclude(w) => {
                out.push('-');
                out.push_str(w);
            }
        }
    }
    out
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.consume_char();
        }
    }

    fn next_tok(&mut self) -> Option<Tok> {
        self.skip_ws();
        self.peek_char()?;

        // Only the first sigil counts; `--x` is `-x`.
        let mut sigil = None;
        while let Some(c @ ('+' | '-' | '*')) = self.peek_char() {
            self.consume_char();
            if sigil.is_none() {
                sigil = Some(c);
            }
        }

        match self.peek_char() {
            Some(q @ ('"' | '\'')) => Some(self.lex_phrase(sigil, q)),
            _ => Some(self.lex_word(sigil)),
        }
    }

    /// Runs to the closing quote, or to the end of input when unterminated.
    fn lex_phrase(&mut self, sigil: Option<char>, quote: char) -> Tok {
        self.consume_char();
        let mut text = String::new();
        while let Some(c) = self.consume_char() {
            if c == quote {
                break;
            }
            text.push(c);
        }
        // Trailing junk glued to the closing quote is ignored.
        while matches!(self.peek_char(), Some(c) if !c.is_whitespace()) {
            self.consume_char();
        }
        Tok::Phrase { sigil, text }
    }

    fn lex_word(&mut self, sigil: Option<char>) -> Tok {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if !c.is_whitespace()) {
            self.consume_char();
        }
        Tok::Word {
            sigil,
            text: self.input[start..self.pos].to_string(),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Tok;

    fn next(&mut self) -> Option<Tok> {
        self.next_tok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        normalize(raw, &StopWords::default())
    }

    #[test]
    fn single_word_gets_wildcard() {
        assert_eq!(norm("lun"), "+lun*");
    }

    #[test]
    fn only_last_word_gets_wildcard() {
        assert_eq!(norm("lung can"), "+\"lung\"+can*");
        assert_eq!(norm("type two diab"), "+\"type\"+\"two\"+diab*");
    }

    #[test]
    fn numeric_codes_become_prefix_patterns() {
        assert_eq!(norm("001.1"), "001.1%");
        assert_eq!(norm(" 250 "), "250%");
        assert_eq!(
            SearchTerm::parse("001.1", &StopWords::default()),
            SearchTerm::Like("001.1%".into())
        );
    }

    #[test]
    fn dotted_non_numeric_codes_are_phrases() {
        assert_eq!(norm("1.2.3"), "+\"1.2.3\"");
        assert_eq!(norm("E11.9"), "+\"E11.9\"");
    }

    #[test]
    fn unanchored_words_are_dropped() {
        assert_eq!(norm("*statin pita"), "+pita*");
        assert_eq!(norm("*statin"), "");
    }

    #[test]
    fn exclusions_have_no_wildcard() {
        assert_eq!(norm("-diabet"), "-diabet");
        assert_eq!(norm("lung -smoker can"), "+\"lung\"-smoker+can*");
    }

    #[test]
    fn hyphenated_words_are_quoted() {
        assert_eq!(norm("covid-19"), "+\"covid-19\"");
        assert_eq!(norm("covid-19 vacc"), "+\"covid-19\"+vacc*");
    }

    #[test]
    fn quoted_phrases_keep_their_sigil() {
        assert_eq!(norm("\"lung cancer\""), "+\"lung cancer\"");
        assert_eq!(norm("-\"lung cancer\" tum"), "-\"lung cancer\"+tum*");
        assert_eq!(norm("'heart  attack'"), "+\"heart attack\"");
    }

    #[test]
    fn double_quotes_inside_single_quoted_phrase_are_dropped() {
        assert_eq!(norm("'say \"hi' lung"), "+\"say hi\"+lung*");
        assert_eq!(norm("'\"'"), "");
    }

    #[test]
    fn stop_words_are_removed_outside_quotes() {
        assert_eq!(norm("the lung"), "+lung*");
        assert_eq!(norm("\"the lung\""), "+\"the lung\"");
        assert_eq!(norm("THE"), "");
    }

    #[test]
    fn plus_sigil_is_inclusion() {
        assert_eq!(norm("+lung +can"), "+\"lung\"+can*");
    }

    #[test]
    fn operator_characters_are_stripped() {
        assert_eq!(norm("(lung)"), "+lung*");
        assert_eq!(norm("~ @"), "");
    }

    #[test]
    fn empty_input() {
        assert_eq!(norm(""), "");
        assert_eq!(norm("   "), "");
        assert!(SearchTerm::parse("+ -", &StopWords::none()).is_empty());
    }

    #[test]
    fn custom_stop_words() {
        let stop = StopWords::new(["Lung"]);
        assert_eq!(normalize("lung can", &stop), "+can*");
        assert_eq!(normalize("the", &stop), "+the*");
    }
}
