//! Outcome ruleset
//!
//! On-line lookup from `(variant, category)` to fingerprint sets, seeded from
//! the offline classifier. Per variant the static categories must partition
//! the 216 ordered triples; [`OutcomeRuleset::verify_partition`] checks it.

use crate::auth::{Authority, Capability};
use crate::errors::RulesetError;
use crate::games::classifier::ClassifierOutput;
use crate::games::types::{DieTriple, Fingerprint, OutcomeCategory, VariantId, ORDERED_TRIPLES};
use dashmap::DashMap;
use std::collections::HashSet;

pub struct OutcomeRuleset {
    authority: Authority,
    outcomes: DashMap<(VariantId, OutcomeCategory), HashSet<Fingerprint>>,
}

impl OutcomeRuleset {
    /// Create an empty ruleset; the returned capability seeds it
    pub fn new() -> (Self, Capability) {
        let (authority, capability) = Authority::new();
        let ruleset = Self {
            authority,
            outcomes: DashMap::new(),
        };
        (ruleset, capability)
    }

    /// Add fingerprints to a category. Additive: existing entries are kept.
    pub fn set_outcome(
        &self,
        capability: &Capability,
        variant: VariantId,
        category: OutcomeCategory,
        fingerprints: impl IntoIterator<Item = Fingerprint>,
    ) -> Result<(), RulesetError> {
        if !self.authority.permits(capability) {
            return Err(RulesetError::Unauthorized);
        }
        if category.is_meta() {
            return Err(RulesetError::MetaCategory(category));
        }

        let mut entry = self.outcomes.entry((variant, category)).or_default();
        let before = entry.len();
        entry.extend(fingerprints);
        tracing::debug!(%variant, %category, added = entry.len() - before, "outcome fingerprints set");
        Ok(())
    }

    /// Load every category of a classifier run into one variant
    pub fn seed(
        &self,
        capability: &Capability,
        variant: VariantId,
        output: &ClassifierOutput,
    ) -> Result<(), RulesetError> {
        for (category, fingerprints) in &output.outcomes {
            self.set_outcome(capability, variant, *category, fingerprints.iter().copied())?;
        }
        tracing::info!(%variant, fingerprints = output.fingerprint_count(), "ruleset seeded");
        Ok(())
    }

    /// The unique static category containing the triple's fingerprint
    pub fn classify(&self, variant: VariantId, triple: &DieTriple) -> Option<OutcomeCategory> {
        let fingerprint = triple.fingerprint();
        let mut matches = OutcomeCategory::STATIC.iter().filter(|category| {
            self.outcomes
                .get(&(variant, **category))
                .map_or(false, |set| set.contains(&fingerprint))
        });

        let first = *matches.next()?;
        if matches.next().is_some() {
            tracing::error!(%variant, %triple, "triple matches more than one category");
            return None;
        }
        Some(first)
    }

    pub fn classify_faces(&self, variant: VariantId, d1: u8, d2: u8, d3: u8) -> Option<OutcomeCategory> {
        let triple = DieTriple::new(d1, d2, d3).ok()?;
        self.classify(variant, &triple)
    }

    /// Check that the variant's categories partition all ordered triples
    pub fn verify_partition(&self, variant: VariantId) -> Result<(), RulesetError> {
        let mut covered = 0;
        for triple in DieTriple::all() {
            let fingerprint = triple.fingerprint();
            let hits = OutcomeCategory::STATIC
                .iter()
                .filter(|category| {
                    self.outcomes
                        .get(&(variant, **category))
                        .map_or(false, |set| set.contains(&fingerprint))
                })
                .count();
            match hits {
                0 => {}
                1 => covered += 1,
                _ => {
                    return Err(RulesetError::OverlappingPartition {
                        variant,
                        triple: triple.to_string(),
                    })
                }
            }
        }

        if covered != ORDERED_TRIPLES {
            return Err(RulesetError::IncompletePartition { variant, covered });
        }
        Ok(())
    }

    pub fn fingerprints(&self, variant: VariantId, category: OutcomeCategory) -> usize {
        self.outcomes
            .get(&(variant, category))
            .map_or(0, |set| set.len())
    }
}
