//! Sentiment and theme lexicons
//!
//! Lexicons are configuration data: loaded from a TOML file when configured,
//! otherwise the built-in Spanish/English lexicon is used. A section missing
//! from the file falls back to the built-in section; a section present but
//! empty stays empty.
//!
//! ```toml
//! positive = ["excelente", "muy bien"]
//! negative = ["mal", "no funciona"]
//!
//! [themes]
//! precio = ["precio", "caro", "barato"]
//!
//! [[corrections]]
//! from = "exelente"
//! to = "excelente"
//! ```

use super::text_normalizer::{default_corrections, Correction};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Lexicon loading errors
#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Failed to read lexicon {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse lexicon: {0}")]
    Parse(String),
}

const POSITIVE: &[&str] = &[
    "excelente", "excelentes", "bueno", "buena", "buenos", "buenas", "buen", "genial",
    "perfecto", "perfecta", "rápido", "rápida", "amable", "amables", "satisfecho",
    "satisfecha", "recomiendo", "encanta", "encantó", "gracias", "mejor", "fácil",
    "eficiente", "agradable", "contento", "contenta", "feliz", "muy bien",
    "great", "good", "excellent", "fast", "friendly", "helpful", "love",
];

const NEGATIVE: &[&str] = &[
    "mal", "malo", "mala", "malos", "malas", "pésimo", "pésima", "horrible", "terrible",
    "lento", "lenta", "demora", "demoras", "tarde", "caro", "cara", "sucio", "sucia",
    "peor", "problema", "problemas", "queja", "deficiente", "molesto", "molesta",
    "decepcionado", "decepcionada", "nunca", "no funciona", "no sirve",
    "bad", "slow", "poor", "worst", "broken", "rude",
];

const THEMES: &[(&str, &[&str])] = &[
    (
        "atencion_cliente",
        &["atención", "personal", "trato", "amable", "amables", "empleado", "empleados",
          "vendedor", "asesor", "cajero", "staff"],
    ),
    (
        "tiempo_espera",
        &["espera", "demora", "demoras", "lento", "lenta", "tarde", "rápido", "rápida",
          "tiempo", "cola", "fila"],
    ),
    (
        "precio",
        &["precio", "precios", "caro", "cara", "barato", "barata", "costo", "tarifa",
          "cobro", "price"],
    ),
    (
        "calidad_producto",
        &["calidad", "producto", "productos", "defecto", "defectuoso", "roto", "funciona",
          "quality"],
    ),
    (
        "servicio",
        &["servicio", "soporte", "ayuda", "service", "support"],
    ),
    (
        "entrega",
        &["entrega", "envío", "pedido", "llegó", "delivery", "shipping"],
    ),
    (
        "limpieza",
        &["limpio", "limpia", "sucio", "sucia", "limpieza", "baño"],
    ),
];

/// Lexicon file layout
#[derive(Debug, Default, Deserialize)]
struct LexiconFile {
    positive: Option<Vec<String>>,
    negative: Option<Vec<String>>,
    themes: Option<BTreeMap<String, Vec<String>>>,
    corrections: Option<Vec<Correction>>,
}

/// Sentiment words, theme keyword sets and text corrections
#[derive(Debug, Clone, PartialEq)]
pub struct Lexicon {
    /// Positive words/phrases
    pub positive: Vec<String>,
    /// Negative words/phrases
    pub negative: Vec<String>,
    /// Theme name → keywords
    pub themes: BTreeMap<String, Vec<String>>,
    /// Ordered correction table for the normalizer
    pub corrections: Vec<Correction>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Lexicon {
    /// Built-in lexicon
    pub fn builtin() -> Self {
        Self {
            positive: to_owned(POSITIVE),
            negative: to_owned(NEGATIVE),
            themes: THEMES
                .iter()
                .map(|(name, words)| (name.to_string(), to_owned(words)))
                .collect(),
            corrections: default_corrections(),
        }
    }

    /// Load lexicon from a TOML file
    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let content = std::fs::read_to_string(path).map_err(|source| LexiconError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let lexicon = Self::from_toml_str(&content)?;

        info!(
            path = %path.display(),
            positive = lexicon.positive.len(),
            negative = lexicon.negative.len(),
            themes = lexicon.themes.len(),
            corrections = lexicon.corrections.len(),
            "Loaded lexicon"
        );
        Ok(lexicon)
    }

    /// Parse lexicon TOML; missing sections use built-in values
    pub fn from_toml_str(content: &str) -> Result<Self, LexiconError> {
        let file: LexiconFile =
            toml::from_str(content).map_err(|e| LexiconError::Parse(e.to_string()))?;
        let builtin = Self::builtin();

        Ok(Self {
            positive: file.positive.unwrap_or(builtin.positive),
            negative: file.negative.unwrap_or(builtin.negative),
            themes: file.themes.unwrap_or(builtin.themes),
            corrections: file.corrections.unwrap_or(builtin.corrections),
        })
    }

    /// Load from `path` when given, otherwise built-in
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, LexiconError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }
}

fn to_owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_all_sections() {
        let lexicon = Lexicon::builtin();
        assert!(lexicon.positive.contains(&"excelente".to_string()));
        assert!(lexicon.negative.contains(&"pésimo".to_string()));
        assert!(lexicon.themes.contains_key("precio"));
        assert!(!lexicon.corrections.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_builtin_sections() {
        let lexicon = Lexicon::from_toml_str(
            r#"
            [themes]
            parking = ["estacionamiento", "parking"]
            "#,
        )
        .unwrap();

        assert_eq!(lexicon.themes.len(), 1);
        assert!(lexicon.themes.contains_key("parking"));
        assert_eq!(lexicon.positive, Lexicon::builtin().positive);
    }

    #[test]
    fn test_empty_section_stays_empty() {
        let lexicon = Lexicon::from_toml_str("corrections = []").unwrap();
        assert!(lexicon.corrections.is_empty());
    }

    #[test]
    fn test_corrections_table() {
        let lexicon = Lexicon::from_toml_str(
            r#"
            [[corrections]]
            from = "bn"
            to = "bien"
            "#,
        )
        .unwrap();
        assert_eq!(lexicon.corrections, vec![Correction::new("bn", "bien")]);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Lexicon::from_toml_str("positive = ["),
            Err(LexiconError::Parse(_))
        ));
    }
}
