//! Offline permutation classifier
//!
//! Enumerates every ordered three-die roll from the 18-element face multiset,
//! classifies each one against a companion rule table and emits the
//! fingerprint sets that seed an [`OutcomeRuleset`](crate::games::OutcomeRuleset).

use crate::errors::RulesetError;
use crate::games::types::{DieTriple, Fingerprint, OutcomeCategory, DIE_FACES, ORDERED_TRIPLES};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Each face appears this many times in the source multiset
const FACE_MULTIPLICITY: usize = 3;

/// One row of a companion rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub roll: [u8; 3],
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Maps a combination of faces to its outcome category.
///
/// Entries are matched on the sorted faces, so one entry covers every ordering
/// of its roll.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<[u8; 3], OutcomeCategory>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard Chinchiro rules for all 56 combinations
    pub fn chinchiro() -> Self {
        let mut table = Self::new();
        for a in 1..=DIE_FACES {
            for b in a..=DIE_FACES {
                for c in b..=DIE_FACES {
                    table.insert([a, b, c], chinchiro_category([a, b, c]));
                }
            }
        }
        table
    }

    /// Load a rule table from JSON entries.
    ///
    /// An entry whose `outcome` is `"point"` takes its category from `name`
    /// (for example `"point_three"`).
    pub fn from_json(json: &str) -> Result<Self, RulesetError> {
        let entries: Vec<RuleEntry> =
            serde_json::from_str(json).map_err(|e| RulesetError::InvalidRuleTable(e.to_string()))?;
        Self::from_entries(&entries)
    }

    pub fn from_entries(entries: &[RuleEntry]) -> Result<Self, RulesetError> {
        let mut table = Self::new();
        for entry in entries {
            let triple = DieTriple::try_from(entry.roll)
                .map_err(|e| RulesetError::InvalidRuleTable(e.to_string()))?;
            let label = if entry.outcome == "point" {
                entry.name.as_deref().ok_or_else(|| {
                    RulesetError::InvalidRuleTable(format!("point entry {} has no name", triple))
                })?
            } else {
                entry.outcome.as_str()
            };
            table.insert(triple.sorted(), label.parse()?);
        }
        Ok(table)
    }

    pub fn insert(&mut self, roll: [u8; 3], category: OutcomeCategory) {
        let mut key = roll;
        key.sort_unstable();
        self.rules.insert(key, category);
    }

    pub fn lookup(&self, triple: &DieTriple) -> Option<OutcomeCategory> {
        self.rules.get(&triple.sorted()).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn entries(&self) -> Vec<RuleEntry> {
        let mut entries: Vec<RuleEntry> = self
            .rules
            .iter()
            .map(|(roll, category)| match category.point_value() {
                Some(_) => RuleEntry {
                    roll: *roll,
                    outcome: "point".to_string(),
                    name: Some(category.as_str().to_string()),
                },
                None => RuleEntry {
                    roll: *roll,
                    outcome: category.as_str().to_string(),
                    name: None,
                },
            })
            .collect();
        entries.sort_by_key(|e| e.roll);
        entries
    }
}

fn chinchiro_category(sorted: [u8; 3]) -> OutcomeCategory {
    match sorted {
        [4, 5, 6] => OutcomeCategory::Shigoro,
        [1, 2, 3] => OutcomeCategory::Hifumi,
        [a, b, c] if a == b && b == c => OutcomeCategory::Zorome,
        [a, b, c] if a == b => OutcomeCategory::point(c).unwrap_or(OutcomeCategory::Menashi),
        [a, b, c] if b == c => OutcomeCategory::point(a).unwrap_or(OutcomeCategory::Menashi),
        _ => OutcomeCategory::Menashi,
    }
}

/// Fingerprint sets per category, ready to seed a ruleset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub outcomes: BTreeMap<OutcomeCategory, Vec<Fingerprint>>,
    /// Ordered triples the rule table did not cover
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DieTriple>,
}

impl ClassifierOutput {
    pub fn fingerprint_count(&self) -> usize {
        self.outcomes.values().map(Vec::len).sum()
    }
}

/// Builds the classification table from the face multiset
pub struct PermutationClassifier {
    rules: RuleTable,
}

impl PermutationClassifier {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    /// The 18-element multiset: each face three times
    pub fn face_multiset() -> Vec<u8> {
        (1..=DIE_FACES)
            .flat_map(|face| std::iter::repeat(face).take(FACE_MULTIPLICITY))
            .collect()
    }

    /// Unique unordered value triples, in first-seen order
    pub fn combinations() -> Vec<[u8; 3]> {
        let data = Self::face_multiset();
        let mut seen = HashSet::new();
        let mut unique = Vec::new();

        for i in 0..data.len() - 2 {
            for j in i + 1..data.len() - 1 {
                for k in j + 1..data.len() {
                    let combination = [data[i], data[j], data[k]];
                    if seen.insert(combination) {
                        unique.push(combination);
                    }
                }
            }
        }
        unique
    }

    /// Every ordering of every combination, deduplicated
    pub fn permutations() -> Vec<DieTriple> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(ORDERED_TRIPLES);

        for combination in Self::combinations() {
            for faces in heap_permutations(combination) {
                if seen.insert(faces) {
                    // Faces come from the 1..=6 multiset
                    if let Ok(triple) = DieTriple::try_from(faces) {
                        ordered.push(triple);
                    }
                }
            }
        }
        ordered
    }

    /// Classify every ordered triple and group fingerprints by category
    pub fn build(&self) -> ClassifierOutput {
        let permutations = Self::permutations();
        debug_assert_eq!(permutations.len(), ORDERED_TRIPLES);

        let mut output = ClassifierOutput::default();
        for triple in permutations {
            match self.rules.lookup(&triple) {
                Some(category) if category.is_meta() => {
                    tracing::debug!(%triple, %category, "skipping meta-relational rule");
                }
                Some(category) => output
                    .outcomes
                    .entry(category)
                    .or_default()
                    .push(triple.fingerprint()),
                None => output.dropped.push(triple),
            }
        }

        tracing::info!(
            categories = output.outcomes.len(),
            fingerprints = output.fingerprint_count(),
            dropped = output.dropped.len(),
            "classification table built"
        );
        output
    }
}

/// Heap's iterative algorithm: successive orderings differ by one swap
fn heap_permutations<const N: usize>(mut items: [u8; N]) -> Vec<[u8; N]> {
    let mut result = vec![items];
    let mut c = [0usize; N];
    let mut i = 1;

    while i < N {
        if c[i] < i {
            let k = if i % 2 == 1 { c[i] } else { 0 };
            items.swap(i, k);
            c[i] += 1;
            i = 1;
            result.push(items);
        } else {
            c[i] = 0;
            i += 1;
        }
    }
    result
}
