//! Comment deduplication
//!
//! Collapses normalized comments to unique keys with an occurrence count.
//! State lives for one run and grows with unique comments only.

use super::text_normalizer::token_count;
use crate::models::Comment;
use std::collections::HashMap;

/// Outcome of feeding one row's comment
#[derive(Debug, PartialEq, Eq)]
pub enum Accumulated<'a> {
    /// First occurrence of this normalized text
    New(&'a Comment),
    /// Existing comment; its count was incremented
    Repeat(&'a Comment),
    /// Fewer than the minimum number of tokens
    TooShort,
}

/// Deduplication counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Rows that passed the token minimum
    pub accepted_rows: usize,
    /// Unique comments
    pub unique: usize,
    /// Accepted rows collapsed into an existing comment
    pub duplicates: usize,
    /// Rows rejected for too few tokens
    pub rejected_short: usize,
}

/// Normalized text → comment map, kept in first-seen order
pub struct Deduplicator {
    min_tokens: usize,
    index: HashMap<String, usize>,
    comments: Vec<Comment>,
    stats: DedupStats,
}

impl Deduplicator {
    pub fn new(min_tokens: usize) -> Self {
        Self {
            min_tokens,
            index: HashMap::new(),
            comments: Vec::new(),
            stats: DedupStats::default(),
        }
    }

    /// Feed one row's raw and normalized comment text
    pub fn accumulate(&mut self, raw_text: &str, normalized_text: &str) -> Accumulated<'_> {
        let tokens = token_count(normalized_text);
        if tokens == 0 || tokens < self.min_tokens {
            self.stats.rejected_short += 1;
            return Accumulated::TooShort;
        }

        self.stats.accepted_rows += 1;

        match self.index.get(normalized_text) {
            Some(&idx) => {
                self.stats.duplicates += 1;
                let comment = &mut self.comments[idx];
                comment.occurrence_count += 1;
                Accumulated::Repeat(comment)
            }
            None => {
                let idx = self.comments.len();
                self.index.insert(normalized_text.to_string(), idx);
                self.comments.push(Comment::new(raw_text.trim(), normalized_text));
                self.stats.unique += 1;
                Accumulated::New(&self.comments[idx])
            }
        }
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }

    /// Number of unique comments so far
    pub fn unique_count(&self) -> usize {
        self.comments.len()
    }

    /// Unique comments in first-seen order
    pub fn into_comments(self) -> Vec<Comment> {
        self.comments
    }
}
