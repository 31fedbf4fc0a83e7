//! Comment column detection
//!
//! Runs once per file. Header names are tried first against the configured
//! candidate list (priority order, accent- and case-insensitive). Failing that,
//! the first column whose sampled values read like free text wins.

use super::text_normalizer::{fold, token_count};
use crate::config::ReaderSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::models::CellValue;
use tracing::debug;

/// How the comment column was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Header matched a candidate name
    HeaderName,
    /// Sampled values averaged enough tokens
    FreeText,
}

/// Detected comment column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedColumn {
    pub index: usize,
    pub name: String,
    pub method: DetectionMethod,
}

/// Comment column detector
#[derive(Debug, Clone)]
pub struct ColumnDetector {
    /// Configured candidate names as written, highest priority first
    names: Vec<String>,
    /// Folded form of `names`
    candidates: Vec<String>,
    min_avg_tokens: f64,
}

impl ColumnDetector {
    pub fn new(settings: &ReaderSettings) -> Self {
        let names: Vec<String> = settings
            .comment_columns
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self {
            candidates: names.iter().map(|c| fold(c)).collect(),
            names,
            min_avg_tokens: settings.min_avg_tokens,
        }
    }

    /// Header whose folded name matches a candidate, by candidate priority
    pub fn by_name(&self, headers: &[String]) -> Option<usize> {
        let folded: Vec<String> = headers.iter().map(|h| fold(h.trim())).collect();
        self.candidates
            .iter()
            .find_map(|candidate| folded.iter().position(|h| h == candidate))
    }

    /// First column whose non-blank sampled values average enough tokens
    pub fn by_content(&self, column_count: usize, sample: &[Vec<CellValue>]) -> Option<usize> {
        (0..column_count).find(|&idx| {
            let (values, tokens) = sample
                .iter()
                .filter_map(|row| row.get(idx))
                .filter(|cell| !cell.is_blank())
                .fold((0usize, 0usize), |(n, t), cell| (n + 1, t + token_count(&cell.as_text())));

            if values == 0 {
                return false;
            }
            let average = tokens as f64 / values as f64;
            debug!(column = idx, values, average, "Free-text column candidate");
            average >= self.min_avg_tokens
        })
    }

    /// Detect the comment column or fail with the headers seen
    pub fn detect(&self, headers: &[String], sample: &[Vec<CellValue>]) -> PipelineResult<DetectedColumn> {
        let found = self
            .by_name(headers)
            .map(|idx| (idx, DetectionMethod::HeaderName))
            .or_else(|| {
                self.by_content(headers.len(), sample)
                    .map(|idx| (idx, DetectionMethod::FreeText))
            });

        match found {
            Some((index, method)) => Ok(DetectedColumn {
                index,
                name: headers[index].clone(),
                method,
            }),
            None => Err(PipelineError::NoCommentColumn {
                headers: headers.to_vec(),
                candidates: self.names.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_header_match_ignores_case_accents_and_whitespace() {
        let detector = ColumnDetector::new(&ReaderSettings::default());
        let found = detector
            .detect(&headers(&["ID", "Fecha", "  Observación "]), &[])
            .unwrap();
        assert_eq!(found.index, 2);
        assert_eq!(found.name, "  Observación ");
        assert_eq!(found.method, DetectionMethod::HeaderName);
    }

    #[test]
    fn test_candidate_priority_beats_column_order() {
        let detector = ColumnDetector::new(&ReaderSettings::default());
        // "comentario" outranks "texto" even though it comes later
        assert_eq!(detector.by_name(&headers(&["texto", "comentario"])), Some(1));
    }

    #[test]
    fn test_free_text_heuristic() {
        let detector = ColumnDetector::new(&ReaderSettings::default());
        let sample = vec![
            vec![CellValue::Number(1.0), text("ok"), text("el pedido llegó tarde otra vez")],
            vec![CellValue::Number(2.0), CellValue::Blank, text("muy buena atención en tienda")],
            vec![CellValue::Number(3.0), text("si"), CellValue::Blank],
        ];

        let found = detector
            .detect(&headers(&["id", "respondio", "notas_cliente"]), &sample)
            .unwrap();
        assert_eq!(found.index, 2);
        assert_eq!(found.method, DetectionMethod::FreeText);
    }

    #[test]
    fn test_no_column_lists_headers() {
        let detector = ColumnDetector::new(&ReaderSettings::default());
        let sample = vec![vec![CellValue::Number(1.0), text("sí")]];

        match detector.detect(&headers(&["id", "flag"]), &sample) {
            Err(PipelineError::NoCommentColumn { headers, candidates }) => {
                assert_eq!(headers, vec!["id", "flag"]);
                assert_eq!(candidates[0], "comentario");
            }
            other => panic!("expected NoCommentColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_configured_candidates_replace_defaults() {
        let settings = ReaderSettings {
            comment_columns: vec!["Verbatim".to_string()],
            ..Default::default()
        };
        let detector = ColumnDetector::new(&settings);
        assert_eq!(detector.by_name(&headers(&["comment", "verbatim"])), Some(1));

        // Guidance names the configured candidate, not the built-in list
        let err = detector.detect(&headers(&["id"]), &[]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'Verbatim'"));
        assert!(!msg.contains("comentario"));
    }
}
