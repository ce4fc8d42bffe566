//! Analytics parameters and their form encoding

use serde::{Deserialize, Serialize};
use std::fmt;

/// Analytics the backend can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TopChatters,
    TopPastes,
    TopEmoticons,
    ChatActivity,
    KeywordsSearch,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::TopChatters,
        Metric::TopPastes,
        Metric::TopEmoticons,
        Metric::ChatActivity,
        Metric::KeywordsSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TopChatters => "top_chatters",
            Metric::TopPastes => "top_pastes",
            Metric::TopEmoticons => "top_emoticons",
            Metric::ChatActivity => "chat_activity",
            Metric::KeywordsSearch => "keywords_search",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| format!("unknown metric: {}", s))
    }
}

/// Split a comma-separated keyword field into trimmed, non-empty entries.
pub fn normalize_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Analytics form as entered by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub metrics: Vec<Metric>,
    pub top_chatters_count: u32,
    pub top_pastes_count: u32,
    pub emoticons_count: u32,
    /// Free text, comma separated
    pub keywords: String,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            metrics: Metric::ALL.to_vec(),
            top_chatters_count: 10,
            top_pastes_count: 10,
            emoticons_count: 10,
            keywords: String::new(),
        }
    }
}

impl AnalysisParams {
    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Normalise the keyword field; everything else passes through.
    pub fn into_form(self) -> AnalysisForm {
        AnalysisForm {
            keywords: normalize_keywords(&self.keywords),
            metrics: self.metrics,
            top_chatters_count: self.top_chatters_count,
            top_pastes_count: self.top_pastes_count,
            emoticons_count: self.emoticons_count,
        }
    }
}

/// Analytics form ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisForm {
    pub metrics: Vec<Metric>,
    pub top_chatters_count: u32,
    pub top_pastes_count: u32,
    pub emoticons_count: u32,
    pub keywords: Vec<String>,
}

impl AnalysisForm {
    /// `keywords` as the backend expects it: a JSON list of strings
    pub fn keywords_json(&self) -> String {
        serde_json::to_string(&self.keywords).unwrap_or_else(|_| "[]".to_string())
    }

    /// Form fields in submission order. `metrics` repeats once per metric.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields: Vec<(&'static str, String)> = self
            .metrics
            .iter()
            .map(|m| ("metrics", m.as_str().to_string()))
            .collect();
        fields.push(("top_chatters_count", self.top_chatters_count.to_string()));
        fields.push(("top_pastes_count", self.top_pastes_count.to_string()));
        fields.push(("emoticons_count", self.emoticons_count.to_string()));
        fields.push(("keywords", self.keywords_json()));
        fields
    }
}
