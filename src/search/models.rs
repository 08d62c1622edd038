//! Search result types and their presentation

use crate::protocol::{ItemStatus, OutputItem};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Longest body text kept per result in tool content
const MAX_CONTENT_CHARS: usize = 500;

/// A single search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Best available body text
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snippet: String,
}

/// Everything one provider returned for a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<SearchResult>,
}

impl SearchResults {
    pub fn new(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            query: query.into(),
            results,
        }
    }

    /// Human-readable rendering used as tool-result content
    pub fn format(&self) -> String {
        if self.results.is_empty() {
            return "No search results found.".to_string();
        }

        let mut out = format!("Search results for: {}\n\n", self.query);
        for (i, r) in self.results.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, r.title);
            if !r.url.is_empty() {
                let _ = writeln!(out, "   URL: {}", r.url);
            }
            if !r.snippet.is_empty() {
                let _ = writeln!(out, "   Summary: {}", r.snippet);
            }
            if !r.content.is_empty() && r.content != r.snippet {
                let _ = writeln!(out, "   Content: {}", truncate(&r.content, MAX_CONTENT_CHARS));
            }
            out.push('\n');
        }
        out
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// The fate of one intercepted search call
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub call_id: String,
    pub query: String,
    pub status: ItemStatus,
    pub results: Vec<SearchResult>,
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn completed(call_id: impl Into<String>, results: SearchResults) -> Self {
        Self {
            call_id: call_id.into(),
            query: results.query,
            status: ItemStatus::Completed,
            results: results.results,
            error: None,
        }
    }

    pub fn failed(
        call_id: impl Into<String>,
        query: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            query: query.into(),
            status: ItemStatus::Failed,
            results: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Content of the tool-role message answering the call
    pub fn tool_content(&self) -> String {
        match &self.error {
            Some(error) => format!("Search failed: {}", error),
            None => SearchResults::new(self.query.clone(), self.results.clone()).format(),
        }
    }

    pub fn to_output_item(&self) -> OutputItem {
        OutputItem::web_search_call(format!("ws_{}", self.call_id), &self.query, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results() {
        let results = SearchResults::new(
            "rust async",
            vec![
                SearchResult {
                    title: "Tokio".to_string(),
                    url: "https://tokio.rs".to_string(),
                    content: "x".repeat(600),
                    snippet: "An async runtime".to_string(),
                },
                SearchResult {
                    title: "Same".to_string(),
                    url: String::new(),
                    content: "dup".to_string(),
                    snippet: "dup".to_string(),
                },
            ],
        );
        let text = results.format();

        assert!(text.starts_with("Search results for: rust async\n\n1. Tokio\n"));
        assert!(text.contains("   URL: https://tokio.rs\n"));
        assert!(text.contains("   Summary: An async runtime\n"));
        assert!(text.contains(&format!("   Content: {}...\n", "x".repeat(500))));
        assert!(!text.contains("Content: dup"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(501);
        let cut = truncate(&text, 500);
        assert_eq!(cut.chars().count(), 503);
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(
            SearchResults::new("q", vec![]).format(),
            "No search results found."
        );
    }

    #[test]
    fn test_failed_outcome_content() {
        let outcome = SearchOutcome::failed("call_1", "q", "web search is disabled");
        assert_eq!(outcome.tool_content(), "Search failed: web search is disabled");
        let item = outcome.to_output_item();
        assert_eq!(item.id, "ws_call_1");
        assert_eq!(item.status, Some(ItemStatus::Failed));
    }
}
