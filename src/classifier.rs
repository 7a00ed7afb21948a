//! Nearest-part-type classification
//!
//! A product embedding is compared against every part type in a
//! [`TaxonomyIndex`]; the best part type fixes the subcategory and category.
//! Each ancestor is then scored against its own embedding, and the three
//! similarities are averaged into the reported confidence.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::ClassifierConfig;
use crate::embeddings::Embedding;
use crate::errors::Result;
use crate::errors::TaxoMatchError;
use crate::models::ClassificationResult;
use crate::models::MatchProvenance;
use crate::taxonomy::TaxonomyIndex;
use crate::taxonomy::TaxonomyNode;

/// What to do when no part type has a usable embedding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Assign the first part type in index order, scored at `floor_similarity`
    FirstAvailable {
        #[serde(default = "default_floor_similarity")]
        floor_similarity: f32,
    },
    /// Fail with `NoCandidates`
    Reject,
}

const fn default_floor_similarity() -> f32 {
    0.05
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::FirstAvailable {
            floor_similarity: default_floor_similarity(),
        }
    }
}

/// Coarse reading of a confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBand {
    Good,
    Weak,
    Poor,
}

/// Full outcome of matching one embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationMatch {
    pub category_id: i64,
    pub category: String,
    pub subcategory_id: i64,
    pub subcategory: String,
    pub part_type_id: i64,
    pub part_type: String,
    pub category_similarity: f32,
    pub subcategory_similarity: f32,
    pub part_type_similarity: f32,
    pub confidence: u8,
    /// True when the part type was chosen by the fallback policy
    pub fallback: bool,
    pub justification: String,
}

impl ClassificationMatch {
    pub fn into_result(self) -> ClassificationResult {
        ClassificationResult {
            category: self.category,
            subcategory: self.subcategory,
            part_type: self.part_type,
            confidence: self.confidence,
            justification: self.justification,
            provenance: MatchProvenance::Computed,
        }
    }
}

/// Rounded mean of the three level similarities as a percentage
pub fn confidence_score(category: f32, subcategory: f32, part_type: f32) -> u8 {
    let mean = (category + subcategory + part_type) / 3.0;
    (mean * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone)]
pub struct Classifier {
    fallback: FallbackPolicy,
    good_threshold: u8,
    weak_threshold: u8,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            fallback: config.fallback,
            good_threshold: config.good_threshold,
            weak_threshold: config.weak_threshold,
        }
    }

    pub const fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    pub const fn quality_band(&self, confidence: u8) -> QualityBand {
        if confidence >= self.good_threshold {
            QualityBand::Good
        } else if confidence >= self.weak_threshold {
            QualityBand::Weak
        } else {
            QualityBand::Poor
        }
    }

    /// Match `embedding` against the index
    ///
    /// # Errors
    /// - `EmptyTaxonomy` when the index has no part types
    /// - `EmbeddingSpaceMismatch` when the embedding is from another space
    /// - `NoCandidates` when no part type is comparable and the policy rejects
    /// - `OrphanedNode` when the winner's ancestors cannot be resolved
    pub fn classify(
        &self,
        embedding: &Embedding,
        index: &TaxonomyIndex,
    ) -> Result<ClassificationMatch> {
        if index.is_empty() {
            return Err(TaxoMatchError::EmptyTaxonomy);
        }
        if embedding.space() != index.space() {
            return Err(TaxoMatchError::EmbeddingSpaceMismatch {
                expected: index.space().to_string(),
                found: embedding.space().to_string(),
            });
        }

        // Strictly greater: the first part type in index order keeps a tie
        let mut best: Option<(&TaxonomyNode, f32)> = None;
        for part_type in index.all_part_types() {
            let Some(vector) = part_type.embedding() else {
                continue;
            };
            let similarity = embedding.similarity_to_raw(vector)?;
            if best.map_or(true, |(_, top)| similarity > top) {
                best = Some((part_type, similarity));
            }
        }

        let (part_type, part_type_similarity, fallback) = match best {
            Some((node, similarity)) => (node, similarity, false),
            None => match self.fallback {
                FallbackPolicy::Reject => return Err(TaxoMatchError::NoCandidates),
                FallbackPolicy::FirstAvailable { floor_similarity } => {
                    let node = index
                        .all_part_types()
                        .first()
                        .ok_or(TaxoMatchError::EmptyTaxonomy)?;
                    warn!(
                        "No part type embeddings in space {}, falling back to '{}'",
                        index.space(),
                        node.name
                    );
                    (node, floor_similarity, true)
                }
            },
        };

        let subcategory = index.subcategory_of(part_type.id).ok_or_else(|| {
            TaxoMatchError::OrphanedNode(format!(
                "part type {} '{}' has no subcategory",
                part_type.id, part_type.name
            ))
        })?;
        let category = index.category_of(subcategory.id).ok_or_else(|| {
            TaxoMatchError::OrphanedNode(format!(
                "subcategory {} '{}' has no category",
                subcategory.id, subcategory.name
            ))
        })?;

        let subcategory_similarity = ancestor_similarity(embedding, subcategory)?;
        let category_similarity = ancestor_similarity(embedding, category)?;
        let confidence =
            confidence_score(category_similarity, subcategory_similarity, part_type_similarity);

        debug!(
            "Classified as {} > {} > {} (confidence {})",
            category.name, subcategory.name, part_type.name, confidence
        );

        let justification = if fallback {
            format!(
                "No part type embeddings available; assigned first part type '{}' (floor similarity {:.2}), subcategory '{}' ({:.2}), category '{}' ({:.2})",
                part_type.name,
                part_type_similarity,
                subcategory.name,
                subcategory_similarity,
                category.name,
                category_similarity
            )
        } else {
            format!(
                "Closest part type '{}' (similarity {:.2}); subcategory '{}' ({:.2}); category '{}' ({:.2})",
                part_type.name,
                part_type_similarity,
                subcategory.name,
                subcategory_similarity,
                category.name,
                category_similarity
            )
        };

        Ok(ClassificationMatch {
            category_id: category.id,
            category: category.name.clone(),
            subcategory_id: subcategory.id,
            subcategory: subcategory.name.clone(),
            part_type_id: part_type.id,
            part_type: part_type.name.clone(),
            category_similarity,
            subcategory_similarity,
            part_type_similarity,
            confidence,
            fallback,
            justification,
        })
    }
}

/// Ancestors without a usable embedding contribute zero
fn ancestor_similarity(embedding: &Embedding, node: &TaxonomyNode) -> Result<f32> {
    node.embedding()
        .map_or(Ok(0.0), |vector| embedding.similarity_to_raw(vector))
}
