//! Taxonomy index
//!
//! The category tree (category → subcategory → part type) with the node
//! embeddings that can be compared against a product embedding. An index is
//! built for exactly one [`EmbeddingSpace`]: node vectors stored in any other
//! space are kept out of every comparison.

pub mod import;
pub mod store;

use std::collections::HashMap;

pub use import::import_taxonomy;
pub use import::ImportStats;
pub use import::TaxonomyTree;
pub use store::InMemoryTaxonomyStore;
pub use store::TaxonomyStore;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::embeddings::EmbeddingSpace;
use crate::errors::Result;
use crate::models::CategoryRecord;
use crate::models::PartTypeRecord;
use crate::models::SubcategoryRecord;

/// One node of the index
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyNode {
    pub id: i64,
    pub name: String,
    /// Owning node one level up; `None` for categories
    pub parent_id: Option<i64>,
    embedding: Option<Vec<f32>>,
}

impl TaxonomyNode {
    /// The node's vector, present only when it belongs to the index space
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }
}

/// Immutable snapshot of the taxonomy for one embedding space
#[derive(Debug, Clone)]
pub struct TaxonomyIndex {
    space: EmbeddingSpace,
    categories: Vec<TaxonomyNode>,
    subcategories: Vec<TaxonomyNode>,
    part_types: Vec<TaxonomyNode>,
    category_pos: HashMap<i64, usize>,
    subcategory_pos: HashMap<i64, usize>,
    part_type_pos: HashMap<i64, usize>,
    orphans: usize,
}

impl TaxonomyIndex {
    /// Read the whole tree from `store` and index it
    pub async fn load(store: &dyn TaxonomyStore, space: EmbeddingSpace) -> Result<Self> {
        let categories = store.list_categories().await?;
        let subcategories = store.list_subcategories().await?;
        let part_types = store.list_part_types().await?;

        let index = Self::build(categories, subcategories, part_types, space);
        info!(
            "Taxonomy index loaded: {} categories, {} subcategories, {} part types ({} with embeddings), {} orphans skipped",
            index.categories.len(),
            index.subcategories.len(),
            index.part_types.len(),
            index.usable_part_types(),
            index.orphans
        );
        Ok(index)
    }

    /// Index already-loaded rows
    ///
    /// Rows are ordered by ascending id. Subcategories whose category is
    /// unknown and part types whose subcategory is unknown (or was itself
    /// skipped) are left out.
    pub fn build(
        mut categories: Vec<CategoryRecord>,
        mut subcategories: Vec<SubcategoryRecord>,
        mut part_types: Vec<PartTypeRecord>,
        space: EmbeddingSpace,
    ) -> Self {
        categories.sort_by_key(|c| c.id);
        subcategories.sort_by_key(|s| s.id);
        part_types.sort_by_key(|p| p.id);

        let mut index = Self {
            space,
            categories: Vec::with_capacity(categories.len()),
            subcategories: Vec::with_capacity(subcategories.len()),
            part_types: Vec::with_capacity(part_types.len()),
            category_pos: HashMap::new(),
            subcategory_pos: HashMap::new(),
            part_type_pos: HashMap::new(),
            orphans: 0,
        };

        for category in categories {
            let embedding = index.usable(
                "category",
                category.id,
                category.embedding,
                category.embedding_space.as_deref(),
            );
            index.category_pos.insert(category.id, index.categories.len());
            index.categories.push(TaxonomyNode {
                id: category.id,
                name: category.name,
                parent_id: None,
                embedding,
            });
        }

        for subcategory in subcategories {
            if !index.category_pos.contains_key(&subcategory.category_id) {
                warn!(
                    "Skipping orphaned subcategory {} '{}': category {} not found",
                    subcategory.id, subcategory.name, subcategory.category_id
                );
                index.orphans += 1;
                continue;
            }
            let embedding = index.usable(
                "subcategory",
                subcategory.id,
                subcategory.embedding,
                subcategory.embedding_space.as_deref(),
            );
            index
                .subcategory_pos
                .insert(subcategory.id, index.subcategories.len());
            index.subcategories.push(TaxonomyNode {
                id: subcategory.id,
                name: subcategory.name,
                parent_id: Some(subcategory.category_id),
                embedding,
            });
        }

        for part_type in part_types {
            if !index.subcategory_pos.contains_key(&part_type.subcategory_id) {
                warn!(
                    "Skipping orphaned part type {} '{}': subcategory {} not found",
                    part_type.id, part_type.name, part_type.subcategory_id
                );
                index.orphans += 1;
                continue;
            }
            let embedding = index.usable(
                "part type",
                part_type.id,
                part_type.embedding,
                part_type.embedding_space.as_deref(),
            );
            index.part_type_pos.insert(part_type.id, index.part_types.len());
            index.part_types.push(TaxonomyNode {
                id: part_type.id,
                name: part_type.name,
                parent_id: Some(part_type.subcategory_id),
                embedding,
            });
        }

        index
    }

    /// Keep a stored vector only if it was produced in the index space
    fn usable(
        &self,
        kind: &str,
        id: i64,
        embedding: Option<Vec<f32>>,
        stored_space: Option<&str>,
    ) -> Option<Vec<f32>> {
        let embedding = embedding?;
        match stored_space {
            Some(tag) if self.space.matches_tag(tag) && embedding.len() == self.space.dimension => {
                Some(embedding)
            }
            other => {
                debug!(
                    "Ignoring {} {} embedding from space {:?} (active space {})",
                    kind, id, other, self.space
                );
                None
            }
        }
    }

    pub const fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    /// Part types in tie-break order
    pub fn all_part_types(&self) -> &[TaxonomyNode] {
        &self.part_types
    }

    pub fn categories(&self) -> &[TaxonomyNode] {
        &self.categories
    }

    pub fn subcategories(&self) -> &[TaxonomyNode] {
        &self.subcategories
    }

    pub fn part_type(&self, id: i64) -> Option<&TaxonomyNode> {
        self.part_type_pos.get(&id).map(|&i| &self.part_types[i])
    }

    /// Subcategory owning the given part type
    pub fn subcategory_of(&self, part_type_id: i64) -> Option<&TaxonomyNode> {
        let parent = self.part_type(part_type_id)?.parent_id?;
        self.subcategory_pos
            .get(&parent)
            .map(|&i| &self.subcategories[i])
    }

    /// Category owning the given subcategory
    pub fn category_of(&self, subcategory_id: i64) -> Option<&TaxonomyNode> {
        let subcategory = &self.subcategories[*self.subcategory_pos.get(&subcategory_id)?];
        let parent = subcategory.parent_id?;
        self.category_pos.get(&parent).map(|&i| &self.categories[i])
    }

    /// Number of part types that can be compared against a product
    pub fn usable_part_types(&self) -> usize {
        self.part_types
            .iter()
            .filter(|p| p.embedding.is_some())
            .count()
    }

    pub fn part_type_count(&self) -> usize {
        self.part_types.len()
    }

    /// Rows dropped because their parent could not be resolved
    pub const fn orphan_count(&self) -> usize {
        self.orphans
    }

    /// True when there is nothing to classify into
    pub fn is_empty(&self) -> bool {
        self.part_types.is_empty()
    }
}
