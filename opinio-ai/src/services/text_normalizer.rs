//! Comment text normalization
//!
//! Produces the canonical form used as the deduplication key:
//! lowercase → trim → collapse whitespace → lexical corrections.
//!
//! Corrections run as one left-to-right pass over a single precompiled
//! alternation, so each source word is corrected at most once and a
//! replacement is never fed back into another correction.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Literal word correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub from: String,
    pub to: String,
}

impl Correction {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Built-in corrections for common misspellings and chat abbreviations
pub const DEFAULT_CORRECTIONS: &[(&str, &str)] = &[
    ("exelente", "excelente"),
    ("exelentes", "excelentes"),
    ("pesimo", "pésimo"),
    ("pesima", "pésima"),
    ("servisio", "servicio"),
    ("grasias", "gracias"),
    ("atencion", "atención"),
    ("rapido", "rápido"),
    ("rapida", "rápida"),
    ("facil", "fácil"),
    ("tambien", "también"),
    ("xq", "porque"),
    ("porq", "porque"),
    ("pq", "porque"),
    ("tb", "también"),
    ("tmb", "también"),
    ("q", "que"),
    ("k", "que"),
    ("muy muy", "muy"),
];

/// Comment text normalizer
pub struct TextNormalizer {
    whitespace: Regex,
    corrections: Option<Regex>,
    replacements: HashMap<String, String>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(&default_corrections()).expect("built-in corrections compile")
    }
}

impl TextNormalizer {
    /// Compile a normalizer for the given ordered correction table
    ///
    /// When two corrections match at the same position the longer one wins,
    /// then the earlier one. Duplicate `from` entries keep the first
    /// replacement.
    pub fn new(corrections: &[Correction]) -> Result<Self, regex::Error> {
        let whitespace = Regex::new(r"\s+")?;

        let mut replacements = HashMap::new();
        let mut sources = Vec::new();
        for correction in corrections {
            let from = collapse(&whitespace, &correction.from.to_lowercase());
            if from.is_empty() || replacements.contains_key(&from) {
                continue;
            }
            sources.push(from.clone());
            replacements.insert(from, correction.to.to_lowercase());
        }

        // Leftmost-first alternation: longer sources must come first
        sources.sort_by_key(|from| std::cmp::Reverse(from.chars().count()));
        let alternatives: Vec<String> = sources.iter().map(|from| delimited(from)).collect();

        let corrections = if alternatives.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("(?:{})", alternatives.join("|")))?)
        };

        Ok(Self {
            whitespace,
            corrections,
            replacements,
        })
    }

    /// Normalize raw comment text
    ///
    /// Returns an empty string for blank input; callers treat that as rejected.
    pub fn normalize(&self, raw: &str) -> String {
        if is_null_marker(raw) {
            return String::new();
        }

        let text = collapse(&self.whitespace, &raw.to_lowercase());
        if text.is_empty() {
            return text;
        }

        match &self.corrections {
            Some(pattern) => pattern
                .replace_all(&text, |caps: &regex::Captures<'_>| {
                    let matched = &caps[0];
                    self.replacements
                        .get(matched)
                        .cloned()
                        .unwrap_or_else(|| matched.to_string())
                })
                .into_owned(),
            None => text,
        }
    }

    /// Normalize an optional cell value (null → empty)
    pub fn normalize_cell(&self, raw: Option<&str>) -> String {
        raw.map(|r| self.normalize(r)).unwrap_or_default()
    }

    /// Number of distinct corrections compiled
    pub fn correction_count(&self) -> usize {
        self.replacements.len()
    }
}

/// Built-in correction table
pub fn default_corrections() -> Vec<Correction> {
    DEFAULT_CORRECTIONS
        .iter()
        .map(|(from, to)| Correction::new(*from, *to))
        .collect()
}

/// Strip accents (NFD, drop combining marks) and lowercase
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Accent-folded word tokens (split on anything not alphanumeric)
pub fn tokenize(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whitespace-separated token count
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Escaped source with a boundary assertion on each end
///
/// A word-character end must sit on a word boundary (`\b`). A symbol end
/// must not touch a word character (`\B`), so `c++` matches in "me gusta c++"
/// but `:(` does not match inside "mal:(".
fn delimited(from: &str) -> String {
    let edge = |c: Option<char>| match c {
        Some(c) if c.is_alphanumeric() || c == '_' => r"\b",
        _ => r"\B",
    };
    format!(
        "{}{}{}",
        edge(from.chars().next()),
        regex::escape(from).replace(r"\ ", " "),
        edge(from.chars().last())
    )
}

fn collapse(whitespace: &Regex, text: &str) -> String {
    whitespace.replace_all(text.trim(), " ").into_owned()
}

/// Textual NaN produced by upstream spreadsheet exports
fn is_null_marker(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("nan")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_trim_collapse() {
        let n = TextNormalizer::new(&[]).unwrap();
        assert_eq!(n.normalize("  Muy   BUEN\tservicio \n"), "muy buen servicio");
    }

    #[test]
    fn test_blank_and_nan_are_empty() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("   "), "");
        assert_eq!(n.normalize("NaN"), "");
        assert_eq!(n.normalize_cell(None), "");
    }

    #[test]
    fn test_corrections_whole_word_only() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("Exelente atencion"), "excelente atención");
        // "q" inside a word is left alone
        assert_eq!(n.normalize("quiero q me llamen"), "quiero que me llamen");
    }

    #[test]
    fn test_single_pass_does_not_compound() {
        // a→b and b→c must not turn "a" into "c"
        let n = TextNormalizer::new(&[Correction::new("a", "b"), Correction::new("b", "c")]).unwrap();
        assert_eq!(n.normalize("a b"), "b c");
    }

    #[test]
    fn test_first_entry_wins_on_duplicates() {
        let n = TextNormalizer::new(&[Correction::new("xq", "porque"), Correction::new("xq", "por qué")])
            .unwrap();
        assert_eq!(n.correction_count(), 1);
        assert_eq!(n.normalize("xq no"), "porque no");
    }

    #[test]
    fn test_multi_word_correction() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("Muy  muy bueno"), "muy bueno");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let n = TextNormalizer::new(&[Correction::new("c++", "cpp")]).unwrap();
        assert_eq!(n.normalize("cxx"), "cxx");
        assert_eq!(n.normalize("me gusta C++ mucho"), "me gusta cpp mucho");
        assert_eq!(n.normalize("c++"), "cpp");
    }

    #[test]
    fn test_symbol_entries_match_standalone() {
        let n = TextNormalizer::new(&[Correction::new(":(", "triste"), Correction::new("c++", "cpp")])
            .unwrap();
        assert_eq!(n.normalize("todo mal :("), "todo mal triste");
        assert_eq!(n.normalize(":( otra vez"), "triste otra vez");
        // Glued to a word, the symbol is not a standalone entry
        assert_eq!(n.normalize("mal:("), "mal:(");
        assert_eq!(n.normalize("c++x"), "c++x");
    }

    #[test]
    fn test_longest_correction_wins_at_same_position() {
        let n = TextNormalizer::new(&[Correction::new("q", "que"), Correction::new("q tal", "qué tal")])
            .unwrap();
        assert_eq!(n.normalize("hola q tal"), "hola qué tal");
        assert_eq!(n.normalize("q dices"), "que dices");
    }

    #[test]
    fn test_fold_and_tokenize() {
        assert_eq!(fold("Pésimo Servicio"), "pesimo servicio");
        assert_eq!(
            tokenize("Muy mal servicio, pésimo!"),
            vec!["muy", "mal", "servicio", "pesimo"]
        );
        assert_eq!(token_count("muy mal servicio, pésimo"), 4);
    }
}
