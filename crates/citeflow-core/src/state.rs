//! The record threaded through the research and drafting stages.

use serde::{Deserialize, Serialize};

use crate::CiteflowError;
use crate::providers::RawSearchResult;

/// A single normalised search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchItem {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl ResearchItem {
    /// Build an item from a provider result, keeping at most `max_chars`
    /// characters of its content.
    pub fn from_raw(raw: RawSearchResult, max_chars: usize) -> Self {
        Self {
            title: raw.title,
            url: raw.url,
            content: truncate_chars(raw.content, max_chars),
        }
    }
}

/// Keep the leading `max_chars` characters of `text`.
pub fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut text = text;
            text.truncate(byte_idx);
            text
        }
        None => text,
    }
}

/// State of one workflow run.
///
/// `research_data` and `drafted_answer` are each written once, in that order,
/// and `messages` only grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    query: String,
    research_data: Vec<ResearchItem>,
    drafted_answer: Option<String>,
    messages: Vec<String>,
    #[serde(default)]
    research_recorded: bool,
}

impl WorkflowState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            research_data: Vec::new(),
            drafted_answer: None,
            messages: Vec::new(),
            research_recorded: false,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn research_data(&self) -> &[ResearchItem] {
        &self.research_data
    }

    pub fn drafted_answer(&self) -> Option<&str> {
        self.drafted_answer.as_deref()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Whether the research stage has written its outcome, even an empty one.
    pub fn has_research(&self) -> bool {
        self.research_recorded
    }

    /// Store the research outcome together with its summary line.
    pub fn record_research(
        &mut self,
        items: Vec<ResearchItem>,
        message: impl Into<String>,
    ) -> Result<(), CiteflowError> {
        if self.has_research() {
            return Err(CiteflowError::StateViolation(
                "research data already recorded".into(),
            ));
        }
        self.research_data = items;
        self.research_recorded = true;
        self.messages.push(message.into());
        Ok(())
    }

    /// Store the drafted answer together with its summary line.
    pub fn record_draft(
        &mut self,
        answer: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), CiteflowError> {
        if !self.has_research() {
            return Err(CiteflowError::StateViolation(
                "drafting requires recorded research data".into(),
            ));
        }
        if self.drafted_answer.is_some() {
            return Err(CiteflowError::StateViolation(
                "drafted answer already recorded".into(),
            ));
        }
        self.drafted_answer = Some(answer.into());
        self.messages.push(message.into());
        Ok(())
    }
}
