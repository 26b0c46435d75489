//! Offer deduplication and advisory similarity matching.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::Offer;

/// Weights and thresholds for the similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum score for a candidate to count as similar.
    pub similarity_threshold: f64,
    /// Weight of name token overlap.
    pub name_weight: f64,
    /// Weight of the star rating match.
    pub stars_weight: f64,
    /// Weight of price closeness.
    pub price_weight: f64,
    /// Relative price difference that still earns full price credit.
    pub price_band: f64,
    /// Star credit when both ratings are known but differ.
    pub star_mismatch_credit: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            name_weight: 0.6,
            stars_weight: 0.2,
            price_weight: 0.2,
            price_band: 0.2,
            star_mismatch_credit: 0.0,
        }
    }
}

/// Collapses offers that describe the same hotel or package.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::with_config(DedupConfig::default())
    }

    pub fn with_config(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Group offers by normalized name and city, keeping the cheapest offer
    /// per source (`keep_all_sources`) or the single cheapest offer overall.
    ///
    /// Groups appear in the order their first member was seen.
    pub fn deduplicate(&self, offers: Vec<Offer>, keep_all_sources: bool) -> Vec<Offer> {
        let mut order: Vec<(String, String)> = Vec::new();
        let mut groups: HashMap<(String, String), Vec<Offer>> = HashMap::new();

        for offer in offers {
            let key = (offer.name_normalized.clone(), offer.city.clone());
            let group = groups.entry(key.clone()).or_default();
            if group.is_empty() {
                order.push(key);
            }
            group.push(offer);
        }

        let mut result = Vec::new();
        for key in order {
            let Some(group) = groups.remove(&key) else {
                continue;
            };

            if keep_all_sources {
                let mut source_order: Vec<String> = Vec::new();
                let mut by_source: HashMap<String, Offer> = HashMap::new();
                for offer in group {
                    match by_source.get(&offer.source_name) {
                        Some(best) if sort_price(best) <= sort_price(&offer) => {}
                        Some(_) => {
                            by_source.insert(offer.source_name.clone(), offer);
                        }
                        None => {
                            source_order.push(offer.source_name.clone());
                            by_source.insert(offer.source_name.clone(), offer);
                        }
                    }
                }
                result.extend(
                    source_order
                        .into_iter()
                        .filter_map(|source| by_source.remove(&source)),
                );
            } else {
                let mut cheapest: Option<Offer> = None;
                for offer in group {
                    match &cheapest {
                        Some(best) if sort_price(best) <= sort_price(&offer) => {}
                        _ => cheapest = Some(offer),
                    }
                }
                result.extend(cheapest);
            }
        }

        result
    }

    /// Candidates in the same city whose similarity score reaches the
    /// configured threshold.
    pub fn find_similar<'a>(&self, offer: &Offer, candidates: &'a [Offer]) -> Vec<&'a Offer> {
        candidates
            .iter()
            .filter(|c| c.city == offer.city)
            .filter(|c| self.similarity(offer, c) >= self.config.similarity_threshold)
            .collect()
    }

    /// Weighted similarity score in [0, 1].
    pub fn similarity(&self, a: &Offer, b: &Offer) -> f64 {
        let name = name_similarity(&a.name_normalized, &b.name_normalized);

        let stars = match (a.stars, b.stars) {
            (Some(x), Some(y)) if x == y => 1.0,
            (None, None) => 1.0,
            _ => self.config.star_mismatch_credit,
        };

        let price = self.price_closeness(a.effective_price_idr(), b.effective_price_idr());

        name * self.config.name_weight + stars * self.config.stars_weight + price * self.config.price_weight
    }

    /// Full credit within the price band, decaying linearly to zero at twice
    /// the band.
    fn price_closeness(&self, a: Option<f64>, b: Option<f64>) -> f64 {
        let (Some(a), Some(b)) = (a, b) else {
            return 0.0;
        };
        let band = self.config.price_band;
        if band <= 0.0 {
            return if a == b { 1.0 } else { 0.0 };
        }
        let relative = (a - b).abs() / a.max(b);
        if relative <= band {
            1.0
        } else {
            (1.0 - (relative - band) / band).max(0.0)
        }
    }
}

/// Price used for picking survivors: missing or zero prices sort last.
fn sort_price(offer: &Offer) -> f64 {
    offer.effective_price_idr().unwrap_or(f64::INFINITY)
}

/// Jaccard overlap of whitespace-separated tokens.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}
