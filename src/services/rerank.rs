use std::collections::HashSet;
use std::time::Duration;

use crate::{
    models::CatalogItem,
    services::providers::{CompletionError, CompletionProvider},
};

/// Candidates listed in the prompt
pub const MAX_PROMPT_CANDIDATES: usize = 20;
/// Fewer matched names than this and the AI ranking is discarded
pub const MIN_MATCHES: usize = 4;
/// Matched names kept, in the AI's order
pub const MAX_MATCHES: usize = 8;

const SYSTEM_PROMPT: &str = "You are a product recommendation assistant for a directory of \
durable, buy-it-for-life goods. Rank the candidate products for the shopper described. \
Respond with product names only, one per line, best match first, using names exactly as listed.";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RerankError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("AI ranking matched {matched} candidates, need at least {required}")]
    InsufficientMatches { matched: usize, required: usize },
}

/// Builds the user prompt: the shopper context followed by the candidate list
pub fn build_prompt(context: &str, candidates: &[CatalogItem]) -> String {
    let listing = candidates
        .iter()
        .take(MAX_PROMPT_CANDIDATES)
        .map(describe_candidate)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nCandidate products:\n{}\n\nReturn the {} best matches, one product name per line.",
        context.trim(),
        listing,
        MAX_MATCHES
    )
}

fn describe_candidate(item: &CatalogItem) -> String {
    let mut line = format!("- {} (overall {:.1}/10", item.name, item.overall_score);
    for (label, score) in [
        ("durability", item.durability_score),
        ("repairability", item.repairability_score),
        ("warranty", item.warranty_score),
    ] {
        if let Some(score) = score {
            line.push_str(&format!(", {} {:.1}", label, score));
        }
    }
    if let Some(price) = item.price {
        line.push_str(&format!(", ${:.2}", price));
    }
    line.push(')');
    line
}

/// Strips list markers and emphasis from one response line
fn clean_line(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| {
            c.is_ascii_digit() || c.is_whitespace() || matches!(c, '.' | ')' | '-' | '*' | '•' | '#')
        })
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '"' | '\'' | '`' | '_'))
}

/// Maps response lines to candidates, in response order.
///
/// A line matches a candidate when either lowercased string contains the other.
/// Each candidate is used at most once; at most `MAX_MATCHES` are returned.
/// Candidates with a blank name never match, since they would match any line.
pub fn match_candidates(response: &str, candidates: &[CatalogItem]) -> Vec<CatalogItem> {
    let mut matched = Vec::new();
    let mut used = HashSet::new();

    for line in response.lines() {
        let cleaned = clean_line(line).to_lowercase();
        if cleaned.is_empty() {
            continue;
        }

        let found = candidates.iter().find(|candidate| {
            let name = candidate.name.trim().to_lowercase();
            if name.is_empty() || used.contains(&candidate.id) {
                return false;
            }
            cleaned.contains(&name) || name.contains(&cleaned)
        });

        if let Some(candidate) = found {
            used.insert(candidate.id);
            matched.push(candidate.clone());
            if matched.len() == MAX_MATCHES {
                break;
            }
        }
    }

    matched
}

/// Asks the completion provider to order `candidates` for `context`.
///
/// Only the first `MAX_PROMPT_CANDIDATES` candidates are offered to the model,
/// and the answer is mapped back onto them with `match_candidates`. Anything the
/// model invents is dropped.
///
/// The call is bounded by `timeout`. Fails when the provider fails, times out,
/// or its answer names fewer than `MIN_MATCHES` candidates; callers treat every
/// failure as a signal to fall back to heuristic ranking.
#[tracing::instrument(
    skip_all,
    fields(provider = provider.name(), candidates = candidates.len())
)]
pub async fn rerank(
    provider: &dyn CompletionProvider,
    timeout: Duration,
    context: &str,
    candidates: &[CatalogItem],
) -> Result<Vec<CatalogItem>, RerankError> {
    let shortlist = &candidates[..candidates.len().min(MAX_PROMPT_CANDIDATES)];
    let prompt = build_prompt(context, shortlist);

    let response = tokio::time::timeout(timeout, provider.complete(&prompt, SYSTEM_PROMPT))
        .await
        .map_err(|_| CompletionError::Timeout)??;

    let matched = match_candidates(&response, shortlist);
    if matched.len() < MIN_MATCHES {
        return Err(RerankError::InsufficientMatches {
            matched: matched.len(),
            required: MIN_MATCHES,
        });
    }

    tracing::debug!(
        provider = provider.name(),
        candidates = shortlist.len(),
        matched = matched.len(),
        "AI re-rank succeeded"
    );

    Ok(matched)
}
