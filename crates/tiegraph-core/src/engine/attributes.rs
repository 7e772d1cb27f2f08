//! Attribute similarity between nodes.
//!
//! Only a fixed set of attribute names takes part in a comparison; every other
//! attribute is ignored. The similarity of two nodes is the weighted sum of the
//! per-attribute similarities divided by the number of attributes compared.
//! Occupations are compared through taxonomy records obtained from an
//! [`AttributeLookup`]; a [`SimilarityModel`] resolves each distinct occupation
//! value once up front so comparisons never touch the store.

use std::collections::{BTreeMap, HashMap};

use super::centrality::percentile_nearest;
use super::errors::PredictError;
use super::graph::{HierarchicalGraph, NodeData};
use crate::storage::AttributeLookup;

/// Attribute name → weight. Attributes without an entry weigh 1.
pub type AttributeWeightings = BTreeMap<String, f64>;

/// Threshold used when no existing edge yields a similarity.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

const PERCENTILE_TOP_SIMILAR_COMPETENCES: f64 = 80.0;
const SHARED_FIELD_CREDIT: f64 = 0.3;
const SHARED_SUBJECT_CREDIT: f64 = 0.3;
const COMPETENCE_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Occupation,
    EducationLevel,
    Exact,
}

/// Attributes taken into account, in comparison order.
const RECOGNISED: [(&str, Comparison); 6] = [
    ("occupation", Comparison::Occupation),
    ("level_of_education", Comparison::EducationLevel),
    ("gender", Comparison::Exact),
    ("institution", Comparison::Exact),
    ("type_of_education", Comparison::Exact),
    ("primary_location", Comparison::Exact),
];

/// Whether `name` takes part in similarity comparisons.
pub fn is_recognised(name: &str) -> bool {
    RECOGNISED.iter().any(|(n, _)| *n == name)
}

/// A record of the occupational taxonomy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OccupationRecord {
    /// Job identifier; 0 marks an unclassified occupation.
    pub job_id: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub job_title: String,
    pub field_of_activity: String,
    pub subject_area: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub competences: Vec<String>,
}

/// How an occupation is identified inside a taxonomy branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OccupationKey {
    JobId(u32),
    Title(String),
}

/// Parsed occupation attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OccupationQuery {
    /// A bare job id, e.g. `"4711"`.
    JobId(u32),
    /// A bare job title; may match several records.
    Title(String),
    /// `field>subject>id-or-title`, identifying exactly one record.
    Hierarchy {
        field_of_activity: String,
        subject_area: String,
        key: OccupationKey,
    },
}

impl OccupationQuery {
    pub fn parse(value: &str) -> Result<Self, PredictError> {
        let value = value.trim();
        if value.contains('>') {
            let parts: Vec<&str> = value.split('>').collect();
            if parts.len() < 3 {
                return Err(PredictError::InvalidParameter(format!(
                    "malformed occupation hierarchy '{}'",
                    value
                )));
            }
            let last = parts[2];
            let key = match last.parse::<u32>() {
                Ok(id) => OccupationKey::JobId(id),
                Err(_) => OccupationKey::Title(last.to_string()),
            };
            return Ok(OccupationQuery::Hierarchy {
                field_of_activity: parts[0].to_string(),
                subject_area: parts[1].to_string(),
                key,
            });
        }
        match value.parse::<u32>() {
            Ok(id) => Ok(OccupationQuery::JobId(id)),
            Err(_) => Ok(OccupationQuery::Title(value.to_string())),
        }
    }
}

/// Exact-match similarity.
pub fn exact_similarity(u: &str, v: &str) -> f64 {
    if u == v {
        1.0
    } else {
        0.0
    }
}

/// Education levels decay as `1 / (1 + |Δ|)`; non-numeric levels match exactly.
pub fn education_similarity(u: &str, v: &str) -> f64 {
    match (u.trim().parse::<f64>(), v.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) if a.is_finite() && b.is_finite() => 1.0 / (1.0 + (a - b).abs()),
        _ => exact_similarity(u, v),
    }
}

/// Normalised indel similarity of two strings: `1 - indel / (|a| + |b|)`.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    // Longest common subsequence, one row at a time.
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    let lcs = prev[b.len()];
    let indel = total - 2 * lcs;
    1.0 - indel as f64 / total as f64
}

/// Average of the pairwise competence similarities at or above the 80th percentile.
pub fn competence_similarity(u: &[String], v: &[String]) -> f64 {
    if u.is_empty() || v.is_empty() {
        return 0.0;
    }
    let scores: Vec<f64> = u
        .iter()
        .flat_map(|a| v.iter().map(move |b| indel_ratio(a, b)))
        .collect();
    let Some(cut) = percentile_nearest(&scores, PERCENTILE_TOP_SIMILAR_COMPETENCES) else {
        return 0.0;
    };
    let top: Vec<f64> = scores.into_iter().filter(|s| *s >= cut).collect();
    top.iter().sum::<f64>() / top.len() as f64
}

/// Picks the pair of candidate records to compare: the first pair sharing a
/// subject area, else the last pair sharing a field, else the first records.
fn choose_records<'a>(
    u: &'a [OccupationRecord],
    v: &'a [OccupationRecord],
) -> Option<(&'a OccupationRecord, &'a OccupationRecord)> {
    let mut best = (u.first()?, v.first()?);
    for a in u {
        for b in v {
            if a.subject_area == b.subject_area {
                return Some((a, b));
            }
            if a.field_of_activity == b.field_of_activity {
                best = (a, b);
            }
        }
    }
    Some(best)
}

/// Similarity of two taxonomy records.
pub fn record_similarity(u: &OccupationRecord, v: &OccupationRecord) -> f64 {
    if u.job_id == 0 || v.job_id == 0 {
        return 0.0;
    }
    if u.job_id == v.job_id {
        return 1.0;
    }
    let mut score = 0.0;
    if u.field_of_activity == v.field_of_activity {
        score += SHARED_FIELD_CREDIT;
    }
    if u.subject_area == v.subject_area {
        score += SHARED_SUBJECT_CREDIT;
    }
    score + COMPETENCE_WEIGHT * competence_similarity(&u.competences, &v.competences)
}

/// Weighted attribute similarity with pre-resolved occupations.
#[derive(Debug, Clone, Default)]
pub struct SimilarityModel {
    weightings: AttributeWeightings,
    occupations: HashMap<String, Vec<OccupationRecord>>,
}

impl SimilarityModel {
    /// A model without occupation records; occupation values then compare exactly.
    pub fn new(weightings: AttributeWeightings) -> Self {
        Self {
            weightings,
            occupations: HashMap::new(),
        }
    }

    /// Resolves every distinct occupation value of `nodes` through `lookup`.
    ///
    /// A value the taxonomy does not know is `MissingData`.
    pub fn prepare<'a, I>(
        nodes: I,
        weightings: AttributeWeightings,
        lookup: &dyn AttributeLookup,
    ) -> Result<Self, PredictError>
    where
        I: IntoIterator<Item = &'a NodeData>,
    {
        let mut occupations: HashMap<String, Vec<OccupationRecord>> = HashMap::new();
        for node in nodes {
            let Some(value) = node.attr("occupation") else {
                continue;
            };
            if occupations.contains_key(value) {
                continue;
            }
            let query = OccupationQuery::parse(value)?;
            let records = lookup.resolve(&query)?;
            if records.is_empty() {
                return Err(PredictError::MissingData(format!(
                    "occupation '{}' is not part of the taxonomy",
                    value
                )));
            }
            occupations.insert(value.to_string(), records);
        }
        tracing::debug!(distinct = occupations.len(), "resolved occupations");
        Ok(Self {
            weightings,
            occupations,
        })
    }

    pub fn weightings(&self) -> &AttributeWeightings {
        &self.weightings
    }

    fn occupation_similarity(&self, u: &str, v: &str) -> f64 {
        match (self.occupations.get(u), self.occupations.get(v)) {
            (Some(a), Some(b)) => choose_records(a, b)
                .map(|(x, y)| record_similarity(x, y))
                .unwrap_or(0.0),
            _ => exact_similarity(u, v),
        }
    }

    /// Similarity of `u` and `v`, or `None` when no recognised attribute is
    /// present and non-empty on both.
    pub fn similarity(&self, u: &NodeData, v: &NodeData) -> Option<f64> {
        let mut compared = 0usize;
        let mut total = 0.0;
        for (name, comparison) in RECOGNISED {
            let (Some(a), Some(b)) = (u.attr(name), v.attr(name)) else {
                continue;
            };
            let sim = match comparison {
                Comparison::Occupation => self.occupation_similarity(a, b),
                Comparison::EducationLevel => education_similarity(a, b),
                Comparison::Exact => exact_similarity(a, b),
            };
            let weight = self.weightings.get(name).copied().unwrap_or(1.0);
            total += weight * sim;
            compared += 1;
        }
        (compared > 0).then(|| total / compared as f64)
    }

    /// Similarity with "nothing to compare" read as 0.
    pub fn similarity_or_zero(&self, u: &NodeData, v: &NodeData) -> f64 {
        self.similarity(u, v).unwrap_or(0.0)
    }

    /// Mean similarity over the existing directed edges of `graph`.
    ///
    /// Falls back to [`DEFAULT_THRESHOLD`] for edgeless graphs and when no edge
    /// has a comparable attribute.
    pub fn threshold(&self, graph: &HierarchicalGraph) -> f64 {
        let mut counted = 0usize;
        let mut total = 0.0;
        for (s, t) in graph.directed_edges() {
            let (Some(u), Some(v)) = (graph.node(s), graph.node(t)) else {
                continue;
            };
            if let Some(sim) = self.similarity(u, v) {
                total += sim;
                counted += 1;
            }
        }
        if counted == 0 {
            DEFAULT_THRESHOLD
        } else {
            total / counted as f64
        }
    }
}

/// Numeric value of `attribute` on `node`.
pub fn numeric_attribute(node: &NodeData, attribute: &str) -> Result<f64, PredictError> {
    let raw = node.attr(attribute).ok_or_else(|| {
        PredictError::MissingData(format!(
            "node {} has no attribute '{}'",
            node.id, attribute
        ))
    })?;
    raw.trim().parse::<f64>().map_err(|_| {
        PredictError::MissingData(format!(
            "attribute '{}' of node {} is not numeric ('{}')",
            attribute, node.id, raw
        ))
    })
}
