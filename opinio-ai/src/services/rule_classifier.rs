//! Deterministic rule-based classifier
//!
//! Whole-word matching against the lexicon. Text and lexicon entries are both
//! accent-folded, so "pesimo" and "pésimo" match the same entry. Multi-word
//! entries ("no funciona") match a contiguous run of tokens.
//!
//! Sentiment is the majority of positive vs negative hits; ties (including no
//! hits) are neutral.

use super::lexicon::Lexicon;
use super::text_normalizer::tokenize;
use crate::models::Sentiment;
use std::collections::{BTreeSet, HashSet};

/// Outcome of rule-based classification
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub themes: BTreeSet<String>,
    pub positive_hits: usize,
    pub negative_hits: usize,
}

/// Precompiled word/phrase set
#[derive(Debug, Clone, Default)]
struct PhraseSet {
    words: HashSet<String>,
    phrases: Vec<Vec<String>>,
}

impl PhraseSet {
    fn new(entries: &[String]) -> Self {
        let mut set = Self::default();
        for entry in entries {
            let tokens = tokenize(entry);
            match tokens.len() {
                0 => {}
                1 => {
                    set.words.extend(tokens);
                }
                _ => {
                    if !set.phrases.contains(&tokens) {
                        set.phrases.push(tokens);
                    }
                }
            }
        }
        set
    }

    /// Number of word hits plus phrase hits
    fn count(&self, tokens: &[String]) -> usize {
        let words = tokens.iter().filter(|t| self.words.contains(*t)).count();
        let phrases: usize = self
            .phrases
            .iter()
            .map(|p| tokens.windows(p.len()).filter(|w| *w == p.as_slice()).count())
            .sum();
        words + phrases
    }

    fn matches(&self, tokens: &[String]) -> bool {
        tokens.iter().any(|t| self.words.contains(t))
            || self
                .phrases
                .iter()
                .any(|p| tokens.windows(p.len()).any(|w| w == p.as_slice()))
    }
}

/// Rule-based sentiment and theme classifier
pub struct RuleClassifier {
    positive: PhraseSet,
    negative: PhraseSet,
    themes: Vec<(String, PhraseSet)>,
}

impl RuleClassifier {
    /// Compile classifier from a lexicon
    pub fn new(lexicon: &Lexicon) -> Self {
        Self {
            positive: PhraseSet::new(&lexicon.positive),
            negative: PhraseSet::new(&lexicon.negative),
            themes: lexicon
                .themes
                .iter()
                .filter(|(name, _)| !name.trim().is_empty())
                .map(|(name, words)| (name.clone(), PhraseSet::new(words)))
                .collect(),
        }
    }

    /// Classify normalized comment text
    pub fn classify(&self, text: &str) -> RuleVerdict {
        let tokens = tokenize(text);

        let positive_hits = self.positive.count(&tokens);
        let negative_hits = self.negative.count(&tokens);

        let (sentiment, confidence) = score(positive_hits, negative_hits);

        let themes = self
            .themes
            .iter()
            .filter(|(_, set)| set.matches(&tokens))
            .map(|(name, _)| name.clone())
            .collect();

        RuleVerdict {
            sentiment,
            confidence,
            themes,
            positive_hits,
            negative_hits,
        }
    }
}

/// Majority vote; confidence is the winning share of all hits
fn score(positive: usize, negative: usize) -> (Sentiment, f32) {
    let total = positive + negative;
    if total == 0 {
        return (Sentiment::Neutral, 0.0);
    }
    if positive == negative {
        return (Sentiment::Neutral, 0.5);
    }
    let winner = positive.max(negative);
    let sentiment = if positive > negative {
        Sentiment::Positive
    } else {
        Sentiment::Negative
    };
    (sentiment, winner as f32 / total as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn classifier() -> RuleClassifier {
        RuleClassifier::new(&Lexicon::builtin())
    }

    #[test]
    fn test_positive_majority() {
        let verdict = classifier().classify("excelente servicio, muy amable");
        assert_eq!(verdict.sentiment, Sentiment::Positive);
        assert_eq!(verdict.confidence, 1.0);
        assert!(verdict.themes.contains("servicio"));
        assert!(verdict.themes.contains("atencion_cliente"));
    }

    #[test]
    fn test_negative_with_accents_folded() {
        let verdict = classifier().classify("muy mal servicio, pesimo");
        assert_eq!(verdict.sentiment, Sentiment::Negative);
        assert_eq!(verdict.negative_hits, 2);
    }

    #[test]
    fn test_whole_word_not_substring() {
        // "mal" must not match inside "normal" or "animal"
        let verdict = classifier().classify("todo normal con el animal");
        assert_eq!(verdict.negative_hits, 0);
        assert_eq!(verdict.sentiment, Sentiment::Neutral);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn test_tie_is_neutral() {
        let verdict = classifier().classify("buena comida pero mala música");
        assert_eq!(verdict.positive_hits, 1);
        assert_eq!(verdict.negative_hits, 1);
        assert_eq!(verdict.sentiment, Sentiment::Neutral);
        assert_eq!(verdict.confidence, 0.5);
    }

    #[test]
    fn test_phrase_match() {
        let verdict = classifier().classify("la app no funciona desde ayer");
        assert_eq!(verdict.sentiment, Sentiment::Negative);
        assert!(verdict.themes.contains("calidad_producto"));
    }

    #[test]
    fn test_zero_or_many_themes() {
        let verdict = classifier().classify("hola que tal");
        assert!(verdict.themes.is_empty());

        let verdict = classifier().classify("precio caro y entrega tarde");
        assert!(verdict.themes.contains("precio"));
        assert!(verdict.themes.contains("entrega"));
        assert!(verdict.themes.contains("tiempo_espera"));
    }

    #[test]
    fn test_injected_theme_lexicon() {
        let mut themes = BTreeMap::new();
        themes.insert("parking".to_string(), vec!["estacionamiento".to_string()]);
        let lexicon = Lexicon {
            positive: vec![],
            negative: vec![],
            themes,
            corrections: vec![],
        };

        let verdict = RuleClassifier::new(&lexicon).classify("no hay estacionamiento cerca");
        assert_eq!(verdict.themes.into_iter().collect::<Vec<_>>(), vec!["parking"]);
        assert_eq!(verdict.sentiment, Sentiment::Neutral);
    }
}
