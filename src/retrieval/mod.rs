// Retrieval module
// Relevance gating of index matches and rendering of the context block

#[cfg(test)]
mod tests;

use std::fmt::Write as _;

use tracing::debug;

use crate::Result;
use crate::index::{DocumentIndex, IndexStore, SearchMatch};

/// Matches at or above this score are trusted as a group
pub const HIGH_RELEVANCE: f32 = 0.7;
/// Below this score even the best match is not used
pub const MIN_RELEVANCE: f32 = 0.5;
/// Most matches rendered into one context block
pub const MAX_CONTEXT_BLOCKS: usize = 5;
pub const DEFAULT_TOP_N: usize = 10;

const CONTEXT_HEADER: &str = "ИНФОРМАЦИЯ ИЗ РУКОВОДСТВА ПО ЭКСПЛУАТАЦИИ:\n\n";
const CONTEXT_FOOTER: &str = "\nВАЖНО: Используй ТОЛЬКО эту информацию для ответа.";
const RULE_WIDTH: usize = 50;

/// Rendered in place of a context block when there is nothing to render
pub const NO_RELEVANT_INFORMATION: &str = "Релевантная информация не найдена в документе.";
pub const NO_INFORMATION_FOUND: &str = "В руководстве не найдено информации по вашему вопросу.";
pub const NOT_PRECISE_ENOUGH: &str = "Не найдено достаточно точной информации в документе.";

/// Outcome of gating a search
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// The search returned nothing
    NoInformation,
    /// Even the best match scored below [`MIN_RELEVANCE`]
    NotPrecise,
    /// Trusted matches, best first, at most [`MAX_CONTEXT_BLOCKS`]
    Matches(Vec<SearchMatch>),
}

/// Apply the two-tier relevance gate to matches sorted by descending score.
///
/// Every match at or above [`HIGH_RELEVANCE`] is kept; failing that only the
/// single best match survives, and only if it reaches [`MIN_RELEVANCE`].
#[inline]
pub fn gate(matches: Vec<SearchMatch>) -> Retrieval {
    if matches.is_empty() {
        return Retrieval::NoInformation;
    }

    let high: Vec<SearchMatch> = matches
        .iter()
        .filter(|m| m.score >= HIGH_RELEVANCE)
        .cloned()
        .collect();

    let mut chosen = if high.is_empty() {
        let Some(best) = matches
            .into_iter()
            .reduce(|best, m| if m.score > best.score { m } else { best })
        else {
            return Retrieval::NoInformation;
        };
        if best.score < MIN_RELEVANCE {
            debug!("Best match scored {:.3}, below the minimum", best.score);
            return Retrieval::NotPrecise;
        }
        vec![best]
    } else {
        high
    };

    chosen.sort_by(|a, b| b.score.total_cmp(&a.score));
    chosen.truncate(MAX_CONTEXT_BLOCKS);
    Retrieval::Matches(chosen)
}

/// Search the index and gate the results
#[inline]
pub async fn retrieve(
    store: &IndexStore,
    index: &DocumentIndex,
    query: &str,
    top_n: usize,
) -> Result<Retrieval> {
    let matches = store.search(index, query, top_n).await?;
    debug!(
        "Search in {} returned {} candidates",
        index.collection_name,
        matches.len()
    );
    Ok(gate(matches))
}

/// Render matches into a single context block for the language model
#[inline]
pub fn format_context(matches: &[SearchMatch]) -> String {
    if matches.is_empty() {
        return NO_RELEVANT_INFORMATION.to_string();
    }

    let rule = "-".repeat(RULE_WIDTH);
    let mut block = String::from(CONTEXT_HEADER);

    for (i, m) in matches.iter().enumerate() {
        // Writing to a String cannot fail
        let _ = write!(
            block,
            "БЛОК {}:\nСтраница: {}\nРелевантность: {:.2}\nТекст: {}\n{}\n",
            i + 1,
            m.metadata.page,
            m.score,
            m.text,
            rule
        );
    }

    block.push_str(CONTEXT_FOOTER);
    block
}
