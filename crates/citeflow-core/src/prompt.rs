use std::fmt::Write as _;

use crate::state::ResearchItem;

/// Build the drafting prompt for `query` over the collected research items.
pub fn drafting_prompt(query: &str, items: &[ResearchItem]) -> String {
    let mut research = String::new();
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            research.push('\n');
        }
        let _ = writeln!(
            research,
            "[{}] Title: {}\nURL: {}\nContent: {}",
            idx + 1,
            item.title,
            item.url,
            item.content
        );
    }

    format!(
        "You are an expert answer drafter. Using the research data below, write a concise, \
well-structured and informative answer that addresses the user query directly.

**User Query**: {query}

**Research Data**:
{research}
**Instructions**:
- Summarize the key findings.
- Keep the answer clear and concise (max 500 words).
- Cite every source you rely on inline, right after the claim, using the [Source: URL] format. \
Separate several URLs in one citation with semicolons.
- If the research data does not answer the query, explain the limitation and suggest next steps.
"
    )
}
