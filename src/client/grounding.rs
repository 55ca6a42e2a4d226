//! Parsing and deduplication of provider grounding metadata.
//!
//! The raw response nests citations under `groundingMetadata` as chunk and
//! support arrays joined by index. This module flattens that into the
//! normalized [`GroundingMetadata`] shape and deduplicates sources.

use serde::Deserialize;

use crate::types::{GroundingMetadata, GroundingSource};

/// How two sources are considered the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Collapse all sources from the same normalized domain.
    #[default]
    ByDomain,
    /// Keep distinct paths; collapse only exact normalized URLs.
    ByUrl,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<RawChunk>,
    #[serde(default)]
    grounding_supports: Vec<RawSupport>,
}

#[derive(Debug, Deserialize)]
struct RawChunk {
    web: Option<RawWeb>,
}

#[derive(Debug, Deserialize)]
struct RawWeb {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSupport {
    segment: Option<RawSegment>,
    #[serde(default)]
    grounding_chunk_indices: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    text: Option<String>,
}

/// Parse raw `groundingMetadata` JSON into the normalized shape.
///
/// Tolerant of missing fields: chunks without a web URI are skipped, empty
/// metadata parses to an empty source list.
pub fn parse_grounding(raw: &serde_json::Value, policy: DedupPolicy) -> GroundingMetadata {
    let Ok(metadata) = serde_json::from_value::<RawGroundingMetadata>(raw.clone()) else {
        tracing::debug!("unrecognized grounding metadata shape, ignoring");
        return GroundingMetadata::default();
    };

    // Collect per-chunk supported segments first, then flatten.
    let mut sources: Vec<GroundingSource> = Vec::new();
    for (index, chunk) in metadata.grounding_chunks.iter().enumerate() {
        let Some(web) = &chunk.web else { continue };
        let Some(uri) = web.uri.as_deref().filter(|u| !u.is_empty()) else {
            continue;
        };
        let segments = metadata
            .grounding_supports
            .iter()
            .filter(|s| s.grounding_chunk_indices.contains(&index))
            .filter_map(|s| s.segment.as_ref().and_then(|seg| seg.text.clone()))
            .collect();
        sources.push(GroundingSource {
            source_url: uri.to_string(),
            title: web.title.clone().unwrap_or_default(),
            segments,
        });
    }

    GroundingMetadata {
        sources: dedup_sources(sources, policy),
    }
}

/// Deduplicate sources under the given policy, merging support segments of
/// collapsed duplicates into the first occurrence.
pub fn dedup_sources(sources: Vec<GroundingSource>, policy: DedupPolicy) -> Vec<GroundingSource> {
    let mut kept: Vec<(String, GroundingSource)> = Vec::new();
    for source in sources {
        let key = match policy {
            DedupPolicy::ByDomain => normalized_domain(&source.source_url),
            DedupPolicy::ByUrl => normalize_url(&source.source_url),
        };
        if let Some((_, existing)) = kept.iter_mut().find(|(k, _)| *k == key) {
            for segment in source.segments {
                if !existing.segments.contains(&segment) {
                    existing.segments.push(segment);
                }
            }
        } else {
            kept.push((key, source));
        }
    }
    kept.into_iter().map(|(_, s)| s).collect()
}

/// Lowercased host with any `www.` prefix stripped.
pub fn normalized_domain(url: &str) -> String {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    host.to_lowercase()
        .trim_start_matches("www.")
        .to_string()
}

/// Normalized full URL: lowercased scheme+host, fragment stripped, trailing
/// slash removed.
pub fn normalize_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    match without_fragment.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            let path = path.trim_end_matches('/');
            if path.is_empty() {
                format!("{}://{}", scheme.to_lowercase(), host.to_lowercase())
            } else {
                format!("{}://{}/{}", scheme.to_lowercase(), host.to_lowercase(), path)
            }
        }
        None => without_fragment.trim_end_matches('/').to_string(),
    }
}
