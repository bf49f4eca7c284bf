//! Terminal rendering of a finished workflow state.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use citeflow_core::{RunTrace, WorkflowState};
use citeflow_core::providers::{CompletionProvider, CompletionRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tracing::warn;

/// Visible length of a research snippet.
pub const SNIPPET_MAX_CHARS: usize = 450;
/// Visible length of the conclusion.
pub const CONCLUSION_MAX_CHARS: usize = 320;

static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[sources?\s*:\s*([^\]]+)\]").expect("invalid citation regex"));

static MARKDOWN_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"!\[([^\]]*)\]\([^)]*\)", "$1"),
        (r"\[([^\]]+)\]\([^)]*\)", "$1"),
        (r"(?m)^\s{0,3}#{1,6}\s*", ""),
        (r"(?m)^\s{0,3}>\s?", ""),
        (r"(?m)^\s*(?:[-*+]|\d+\.)\s+", ""),
        (r"`([^`]*)`", "$1"),
        (r"\*\*(.*?)\*\*", "$1"),
        (r"__(.*?)__", "$1"),
        (r"\*(.*?)\*", "$1"),
        (r"\b_(.*?)_\b", "$1"),
        (r"(?m)^(?:-{3,}|_{3,}|\*{3,})\s*$", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("invalid markdown regex"),
            replacement,
        )
    })
    .collect()
});

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("invalid sentence regex"));

/// Answer text with `[Source: ...]` groups replaced by numbered markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedAnswer {
    pub text: String,
    /// URL groups in marker order; marker `n` refers to `references[n - 1]`.
    pub references: Vec<Vec<String>>,
}

/// Replace each `[Source: a; b]` group with `[n]`. Identical groups share a
/// number.
pub fn compact_citations(text: &str) -> CompactedAnswer {
    let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
    let mut references: Vec<Vec<String>> = Vec::new();

    let compacted = CITATION.replace_all(text, |caps: &regex::Captures| {
        let urls: Vec<String> = caps[1]
            .split([';', ','])
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        let index = *seen.entry(urls.clone()).or_insert_with(|| {
            references.push(urls);
            references.len()
        });
        format!("[{index}]")
    });

    CompactedAnswer {
        text: compacted.into_owned(),
        references,
    }
}

/// Remove common Markdown syntax, keeping the readable text.
pub fn strip_markdown(text: &str) -> String {
    MARKDOWN_RULES
        .iter()
        .fold(text.to_string(), |acc, (regex, replacement)| {
            regex.replace_all(&acc, *replacement).into_owned()
        })
}

/// Plain, single-line preview of `content`, clamped to `max_chars`.
pub fn snippet(content: &str, max_chars: usize) -> String {
    let plain = strip_markdown(content);
    let normalised = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    clamp(&normalised, max_chars)
}

fn clamp(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}…", head.trim_end())
}

/// Host of `url` without a leading `www.`.
pub fn source_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// First `count` sentences of `text`.
fn leading_sentences(text: &str, count: usize) -> String {
    let mut end = text.len();
    for (seen, found) in SENTENCE_END.find_iter(text).enumerate() {
        if seen + 1 == count {
            end = found.start() + 1;
            break;
        }
    }
    text[..end].trim().to_string()
}

/// Conclusion built without the model: citations removed, first two sentences.
pub fn heuristic_conclusion(answer: &str) -> String {
    let without_citations = CITATION.replace_all(answer, "");
    let normalised = without_citations
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    clamp(&leading_sentences(&normalised, 2), CONCLUSION_MAX_CHARS)
}

/// Ask the model for a one or two sentence takeaway of `answer`, falling back
/// to [`heuristic_conclusion`] when the call fails.
pub async fn conclusion(model: &dyn CompletionProvider, model_name: &str, answer: &str) -> String {
    let request = CompletionRequest {
        model: model_name.to_string(),
        prompt: format!(
            "Summarize the following content into 1-2 clear, simple sentences. \
No lists, no citations, no markdown. Focus on the key takeaway for a general user.\n\n\
Content:\n{answer}"
        ),
    };

    match model.complete(&request).await {
        Ok(text) => {
            let short = leading_sentences(text.trim(), 2);
            let short = if short.is_empty() { text.trim().to_string() } else { short };
            clamp(&short, CONCLUSION_MAX_CHARS)
        }
        Err(err) => {
            warn!(error = %err, "conclusion request failed; using heuristic summary");
            heuristic_conclusion(answer)
        }
    }
}

/// Render the full text report.
pub fn render_text(
    state: &WorkflowState,
    trace: &RunTrace,
    elapsed: Duration,
    conclusion: Option<&str>,
) -> String {
    let mut out = String::new();
    let research = state.research_data();

    let _ = writeln!(
        out,
        "Collected {} sources in {:.1}s.\n",
        research.len(),
        elapsed.as_secs_f64()
    );

    let _ = writeln!(out, "== Research Summary ==");
    let answer = state.drafted_answer().unwrap_or_default();
    if answer.trim().is_empty() {
        let _ = writeln!(out, "No drafted answer returned.");
    } else {
        let compacted = compact_citations(answer);
        let _ = writeln!(out, "{}", compacted.text.trim_end());
        if !compacted.references.is_empty() {
            let _ = writeln!(out);
            for (idx, urls) in compacted.references.iter().enumerate() {
                let _ = writeln!(out, "[{}] {}", idx + 1, urls.join(", "));
            }
        }
    }

    let _ = writeln!(out, "\n== Research Data ==");
    if research.is_empty() {
        let _ = writeln!(
            out,
            "No research results found or there was an error during search."
        );
    } else {
        for (idx, item) in research.iter().enumerate() {
            let title = match item.title.trim() {
                "" => format!("Result {}", idx + 1),
                title => title.to_string(),
            };
            let label = match source_domain(&item.url) {
                Some(domain) => format!("{}. {title} ({domain})", idx + 1),
                None => format!("{}. {title}", idx + 1),
            };
            let _ = writeln!(out, "{label}");
            if !item.url.trim().is_empty() {
                let _ = writeln!(out, "   Link: {}", item.url.trim());
            }
            let preview = snippet(&item.content, SNIPPET_MAX_CHARS);
            if !preview.is_empty() {
                let _ = writeln!(out, "   {preview}");
            }
        }
    }

    if let Some(conclusion) = conclusion {
        let _ = writeln!(out, "\n== Conclusion ==");
        let _ = writeln!(out, "{conclusion}");
    }

    let _ = writeln!(out, "\n== Log ==");
    out.push_str(&trace.render_log());

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use citeflow_core::ProviderError;

    #[test]
    fn citations_are_numbered_and_deduplicated() {
        let compacted = compact_citations(
            "Alpha [Source: https://a.io]. Beta [Sources: https://b.io; https://c.io]. \
Gamma [source: https://a.io].",
        );

        assert_eq!(compacted.text, "Alpha [1]. Beta [2]. Gamma [1].");
        assert_eq!(
            compacted.references,
            vec![
                vec!["https://a.io".to_string()],
                vec!["https://b.io".to_string(), "https://c.io".to_string()],
            ]
        );
    }

    #[test]
    fn text_without_citations_is_unchanged() {
        let compacted = compact_citations("Nothing cited here.");
        assert_eq!(compacted.text, "Nothing cited here.");
        assert!(compacted.references.is_empty());
    }

    #[test]
    fn markdown_is_stripped() {
        let stripped = strip_markdown(
            "## Heading\n- **bold** item with [a link](https://x.io)\n> quoted `code`\n![img](p.png)",
        );
        assert_eq!(stripped, "Heading\nbold item with a link\nquoted code\nimg");
    }

    #[test]
    fn snippet_normalises_and_clamps() {
        let preview = snippet("one\n\n  two   three", 450);
        assert_eq!(preview, "one two three");

        let long = "word ".repeat(200);
        let preview = snippet(&long, 20);
        assert!(preview.ends_with('…'));
        assert!(preview.chars().count() <= 21);
    }

    #[test]
    fn domain_drops_www() {
        assert_eq!(
            source_domain("https://www.nature.com/articles/1"),
            Some("nature.com".to_string())
        );
        assert_eq!(source_domain("not a url"), None);
    }

    #[test]
    fn heuristic_conclusion_keeps_two_sentences_without_citations() {
        let conclusion = heuristic_conclusion(
            "Qubits improved [Source: https://a.io]. Hardware scaled. Costs fell.",
        );
        assert_eq!(conclusion, "Qubits improved . Hardware scaled.");
    }

    struct FailingModel;

    #[async_trait]
    impl CompletionProvider for FailingModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Timeout)
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct WordyModel;

    #[async_trait]
    impl CompletionProvider for WordyModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Ok("First point. Second point. Third point.".to_string())
        }

        fn name(&self) -> &str {
            "wordy"
        }
    }

    #[tokio::test]
    async fn conclusion_falls_back_on_model_error() {
        let text = conclusion(&FailingModel, "m", "One. Two. Three.").await;
        assert_eq!(text, "One. Two.");
    }

    #[tokio::test]
    async fn conclusion_trims_model_output_to_two_sentences() {
        let text = conclusion(&WordyModel, "m", "ignored").await;
        assert_eq!(text, "First point. Second point.");
    }

    #[test]
    fn report_lists_sources_and_log() {
        let mut state = WorkflowState::new("q");
        state
            .record_research(
                vec![citeflow_core::ResearchItem {
                    title: "Quantum".into(),
                    url: "https://www.example.com/q".into(),
                    content: "**Big** news".into(),
                }],
                "Collected 1 research items.",
            )
            .unwrap();
        state
            .record_draft(
                "Answer [Source: https://www.example.com/q].",
                "Drafted answer completed.",
            )
            .unwrap();

        let mut trace = RunTrace::default();
        trace.record("researcher", "Collected 1 research items.");
        trace.record("drafter", "Drafted answer completed.");

        let report = render_text(&state, &trace, Duration::from_millis(1500), Some("Short."));

        assert!(report.contains("Collected 1 sources in 1.5s."));
        assert!(report.contains("Answer [1]."));
        assert!(report.contains("[1] https://www.example.com/q"));
        assert!(report.contains("1. Quantum (example.com)"));
        assert!(report.contains("   Big news"));
        assert!(report.contains("== Conclusion ==\nShort."));
        assert!(report.contains("== Log ==\n1. [researcher +"));
        assert!(report.contains("] Drafted answer completed.\n"));
    }
}
