//! Prompts for the assistant API service
//!
//! This module builds the provider prompts behind the two assistant
//! endpoints: a single-line search-query rewrite and a markdown narrative
//! over the ranked results.

use crate::search::SearchResult;

const ENHANCEMENT_INSTRUCTIONS: &str = r#"You rewrite search queries for a semantic search over Google Summer of Code project ideas.

Rewrite the user's query into one search-effective line: expand abbreviations, add the obvious synonyms and related technical terms, and keep the user's intent.

Respond with the rewritten query only. No explanation, no quotes, one line."#;

const SUMMARY_INSTRUCTIONS: &str = r#"You summarize Google Summer of Code project ideas for a prospective contributor.

Write a markdown narrative over the ranked results below. Start with the heading '# GSoC Project Ideas'. Give each result its own numbered '## N. <organization>' section describing what the project is about, what a contributor would work on, and why it might be a good fit. Mention the organization's idea-list link where one is given. Keep the ranking order."#;

/// Builds the query-enhancement prompt
///
/// # Examples
///
/// ```
/// use ideascope::prompts::build_enhancement_prompt;
///
/// let prompt = build_enhancement_prompt("ml");
/// assert!(prompt.contains("ml"));
/// ```
pub fn build_enhancement_prompt(query: &str) -> String {
    format!("{ENHANCEMENT_INSTRUCTIONS}\n\nQuery: {query}")
}

/// Builds the summarization prompt over a ranked result set
pub fn build_summary_prompt(results: &[SearchResult]) -> String {
    let mut prompt = String::from(SUMMARY_INSTRUCTIONS);
    prompt.push_str("\n\nRanked results:\n");

    for (i, result) in results.iter().enumerate() {
        prompt.push_str(&format!(
            "\n### Result {} (relevance {:.2})\n",
            i + 1,
            result.similarity_score
        ));
        if !result.metadata.organization_name.is_empty() {
            prompt.push_str(&format!(
                "Organization: {}\n",
                result.metadata.organization_name
            ));
        }
        if let Some(count) = result.metadata.no_of_ideas {
            prompt.push_str(&format!("Ideas listed: {count}\n"));
        }
        if let Some(url) = &result.metadata.idea_list_url {
            prompt.push_str(&format!("Idea list: {url}\n"));
        }
        prompt.push_str(result.document.trim());
        prompt.push('\n');
    }

    prompt
}
