// Ranking engine
// Turns raw nearest-neighbour hits into the ordered, deduplicated table list returned to callers

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;
use crate::catalog::{CatalogEntry, CatalogSnapshot};
use crate::config::CatalogLinks;
use crate::index::{CatalogIndex, Neighbour};

/// Hits at or beyond this cosine distance are not confident enough to return
pub const DISTANCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_TOP_K: usize = 3;

/// A table kept by [`select_matches`] with its effective distance
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub table_name: String,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedColumn {
    pub column_name: String,
    pub description: String,
    pub data_type: String,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTable {
    pub similarity_score: f64,
    pub table_name: String,
    pub table_description: String,
    pub openmetadata_url: String,
    pub column_descriptions: Vec<RankedColumn>,
}

/// Apply exact-name promotion, the distance threshold and per-table deduplication.
///
/// A neighbour whose table name equals `query` ignoring case is kept at distance 0.0 ahead of
/// everything else. Other tables are kept only below [`DISTANCE_THRESHOLD`], at the smallest
/// distance seen, clamped to zero. The rest are sorted by distance after the exact match; equal
/// distances keep first-seen order.
#[inline]
pub fn select_matches(query: &str, neighbours: &[Neighbour]) -> Vec<ScoredMatch> {
    let query_upper = query.to_uppercase();
    let exact = neighbours
        .iter()
        .find(|n| n.table_name.to_uppercase() == query_upper)
        .map(|n| n.table_name.as_str());

    let mut matches: Vec<ScoredMatch> = Vec::new();
    if let Some(table_name) = exact {
        info!("Exact table name match: {}", table_name);
        matches.push(ScoredMatch {
            table_name: table_name.to_string(),
            distance: 0.0,
        });
    }

    for neighbour in neighbours {
        if exact.is_some() && neighbour.table_name.to_uppercase() == query_upper {
            continue;
        }
        let confident = neighbour.distance < DISTANCE_THRESHOLD;
        if !confident {
            continue;
        }

        let distance = non_negative(neighbour.distance);
        match matches
            .iter_mut()
            .find(|m| m.table_name == neighbour.table_name)
        {
            Some(existing) => existing.distance = existing.distance.min(distance),
            None => matches.push(ScoredMatch {
                table_name: neighbour.table_name.clone(),
                distance,
            }),
        }
    }

    if matches.is_empty() {
        if let Some(closest) = neighbours.first() {
            info!(
                "No table under distance {} (closest {} at {:.4})",
                DISTANCE_THRESHOLD, closest.table_name, closest.distance
            );
        }
        return matches;
    }

    // The exact match stays pinned at index 0
    let ranked_from = usize::from(exact.is_some());
    if let Some(rest) = matches.get_mut(ranked_from..) {
        rest.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }
    matches
}

/// Cosine distance from `1 - cos` can dip just below zero for near-identical vectors
fn non_negative(distance: f32) -> f32 {
    if distance > 0.0 { distance } else { 0.0 }
}

/// Round a distance to four decimal places for reporting
#[inline]
pub fn similarity_score(distance: f32) -> f64 {
    let rounded = (f64::from(distance) * 10_000.0).round() / 10_000.0;
    if rounded > 0.0 { rounded } else { 0.0 }
}

/// Expand matches into result rows, dropping tables the snapshot no longer knows
#[inline]
pub fn resolve_matches(
    matches: &[ScoredMatch],
    snapshot: &CatalogSnapshot,
    links: &CatalogLinks,
) -> Vec<RankedTable> {
    matches
        .iter()
        .filter_map(|m| match snapshot.get(&m.table_name) {
            Some(entry) => Some(ranked_table(m, entry, links)),
            None => {
                debug!("Skipping {}: not in the current catalog", m.table_name);
                None
            }
        })
        .collect()
}

fn ranked_table(m: &ScoredMatch, entry: &CatalogEntry, links: &CatalogLinks) -> RankedTable {
    RankedTable {
        similarity_score: similarity_score(m.distance),
        table_name: m.table_name.clone(),
        table_description: entry.description.clone(),
        openmetadata_url: links.table_url(&m.table_name),
        column_descriptions: entry
            .columns
            .iter()
            .map(|c| RankedColumn {
                column_name: c.name.clone(),
                description: c.description.clone(),
                data_type: c.data_type.clone(),
                is_primary_key: c.is_primary_key,
            })
            .collect(),
    }
}

/// Rank the `top_k` nearest documents of `index` for an already embedded query
#[inline]
pub async fn search(
    index: &CatalogIndex,
    snapshot: &CatalogSnapshot,
    links: &CatalogLinks,
    query: &str,
    query_vector: &[f32],
    top_k: usize,
) -> Result<Vec<RankedTable>> {
    let neighbours = index.nearest(query_vector, top_k).await?;

    for (i, neighbour) in neighbours.iter().enumerate() {
        debug!(
            "  [{}] distance {:.4}: {}",
            i + 1,
            neighbour.distance,
            neighbour.table_name
        );
    }

    let matches = select_matches(query, &neighbours);
    Ok(resolve_matches(&matches, snapshot, links))
}
