//! analyzer.rs — Dutch sentiment scoring and the language gate.
//!
//! Scoring is lexicon-based: AFINN-stijl gewichten (-5..5) per woord, som
//! gedeeld door het aantal tokens (comparative score), daarna geklemd op
//! [-1, 1]. Negators binnen een venster van 3 tokens keren het teken om.
//!
//! The language gate keeps Dutch and undetermined text and drops only
//! confidently-foreign posts; the confidence cutoff is configurable because
//! short social posts sit right on the detection boundary.

use chrono::Utc;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use whatlang::Lang;

use crate::config::AnalyzerConfig;
use crate::types::{clamp_score, AnalyzedPost, RawPost};

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../dutch_sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// Outcome of the language gate for one text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageVerdict {
    /// Detected Dutch; tagged `"nl"`.
    Dutch,
    /// Detection absent or below the confidence cutoff; kept, tagged `"und"`.
    Undetermined,
    /// Confidently another language; the post is dropped.
    Foreign(Lang),
}

#[derive(Debug, Clone)]
pub struct SentimentAnalyzer {
    language_threshold: f64,
}

impl SentimentAnalyzer {
    pub fn new(cfg: &AnalyzerConfig) -> Self {
        Self {
            language_threshold: cfg.language_detection_threshold,
        }
    }

    /// Mostly for tests: build with an explicit confidence cutoff.
    pub fn with_threshold(language_threshold: f64) -> Self {
        Self { language_threshold }
    }

    /// Classify the text's language per the keep/drop policy.
    pub fn classify_language(&self, text: &str) -> LanguageVerdict {
        match whatlang::detect(text) {
            Some(info) if info.lang() == Lang::Nld => LanguageVerdict::Dutch,
            Some(info) if info.confidence() >= self.language_threshold => {
                LanguageVerdict::Foreign(info.lang())
            }
            _ => LanguageVerdict::Undetermined,
        }
    }

    /// Comparative lexicon score, clamped to [-1, 1]. Empty text scores 0.
    pub fn score_text(&self, text: &str) -> f64 {
        let tokens: Vec<String> = tokenize(text).collect();
        if tokens.is_empty() {
            return 0.0;
        }

        let mut sum: i32 = 0;
        for i in 0..tokens.len() {
            let base = word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            // negator in the previous 1..=3 tokens flips the sign
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            sum += if negated { -base } else { base };
        }

        clamp_score(f64::from(sum) / tokens.len() as f64)
    }

    /// Score one post; `None` means it was filtered by the language gate.
    pub fn analyze_post(&self, post: &RawPost, topics: Vec<String>) -> Option<AnalyzedPost> {
        let language = match self.classify_language(&post.text) {
            LanguageVerdict::Dutch => "nl",
            LanguageVerdict::Undetermined => "und",
            LanguageVerdict::Foreign(lang) => {
                tracing::debug!(
                    post_id = %post.id,
                    detected = lang.code(),
                    "dropping confidently foreign post"
                );
                return None;
            }
        };

        Some(AnalyzedPost {
            id: post.id.clone(),
            source: post.source,
            text: post.text.clone(),
            sentiment_score: self.score_text(&post.text),
            language: language.to_string(),
            topics,
            created_at: post.created_at,
            analyzed_at: Utc::now(),
        })
    }

    /// Analyze a whole fetch result; filtered posts are dropped silently,
    /// an individual failure never aborts the batch.
    pub fn analyze_batch(
        &self,
        posts: &[RawPost],
        extract_topics: impl Fn(&str) -> Vec<String>,
    ) -> Vec<AnalyzedPost> {
        posts
            .iter()
            .filter_map(|p| self.analyze_post(p, extract_topics(&p.text)))
            .collect()
    }
}

/// Arithmetic mean over analyzed posts; 0 for an empty slice (neutral, not an
/// error).
pub fn calculate_aggregate_score(posts: &[AnalyzedPost]) -> f64 {
    if posts.is_empty() {
        return 0.0;
    }
    let sum: f64 = posts.iter().map(|p| p.sentiment_score).sum();
    clamp_score(sum / posts.len() as f64)
}

#[inline]
fn word_score(w: &str) -> i32 {
    *LEXICON.get(w).unwrap_or(&0)
}

/// Unicode-aware tokenization: alphanumeric runs, lowercased (Dutch text
/// carries diacritics, so no ASCII shortcut here).
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Nederlandse negators; tokenization splitst "niet" etc. als losse tokens.
fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "niet" | "geen" | "nooit" | "niks" | "niets" | "zonder" | "nee" | "niemand" | "nergens"
    )
}
