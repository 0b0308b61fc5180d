//! Address normalization for entity resolution.
//!
//! Two providers registered at "123 Main Street, Suite 4" and
//! "123 MAIN ST STE 4" are the same location. Normalization lower-cases,
//! strips punctuation, collapses whitespace and canonicalises common street
//! suffixes and unit designators.

use crate::{model::Provider, types::ProviderId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TOKEN_ALIASES: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("av", "ave"),
    ("boulevard", "blvd"),
    ("road", "rd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("court", "ct"),
    ("place", "pl"),
    ("parkway", "pkwy"),
    ("highway", "hwy"),
    ("circle", "cir"),
    ("suite", "ste"),
    ("apartment", "apt"),
    ("unit", "ste"),
    ("#", "ste"),
    ("building", "bldg"),
    ("floor", "fl"),
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
];

/// Canonical form of an address, or None when nothing meaningful remains.
pub fn normalize_address(raw: &str) -> Option<String> {
    let spaced: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else if c == '#' {
                '#'
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = spaced
        .split_whitespace()
        .flat_map(split_hash)
        .map(|t| {
            TOKEN_ALIASES
                .iter()
                .find(|(from, _)| *from == t)
                .map(|(_, to)| *to)
                .unwrap_or(t)
        })
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// "#4" becomes ["#", "4"] so the hash maps onto the unit designator.
fn split_hash(token: &str) -> Vec<&str> {
    match token.strip_prefix('#') {
        Some("") => vec!["#"],
        Some(rest) => vec!["#", rest],
        None => vec![token],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressCluster {
    pub normalized_address: String,
    pub provider_ids:       Vec<ProviderId>,
    pub provider_count:     usize,
}

/// Groups of two or more providers sharing a normalized address, largest
/// group first, then by address.
pub fn cluster_by_address(providers: &[Provider]) -> Vec<AddressCluster> {
    let mut groups: BTreeMap<String, Vec<ProviderId>> = BTreeMap::new();
    for p in providers {
        if let Some(addr) = p.address.as_deref().and_then(normalize_address) {
            groups.entry(addr).or_default().push(p.provider_id);
        }
    }

    let mut clusters: Vec<AddressCluster> = groups
        .into_iter()
        .filter(|(_, ids)| ids.len() >= 2)
        .map(|(normalized_address, mut provider_ids)| {
            provider_ids.sort_unstable();
            provider_ids.dedup();
            AddressCluster {
                normalized_address,
                provider_count: provider_ids.len(),
                provider_ids,
            }
        })
        .filter(|c| c.provider_count >= 2)
        .collect();
    clusters.sort_by(|a, b| {
        b.provider_count
            .cmp(&a.provider_count)
            .then_with(|| a.normalized_address.cmp(&b.normalized_address))
    });
    clusters
}
