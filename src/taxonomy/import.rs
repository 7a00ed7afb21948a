//! Loading a category tree from a nested JSON document

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use super::store::TaxonomyStore;
use crate::errors::Result;
use crate::errors::TaxoMatchError;

/// Nested taxonomy document
///
/// ```json
/// { "categories": [
///     { "name": "Brakes", "subcategories": [
///         { "name": "Pads", "partTypes": ["Brake Pads", "Pad Sensors"] } ] } ] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyTree {
    pub categories: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<SubcategoryNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubcategoryNode {
    pub name: String,
    #[serde(default)]
    pub part_types: Vec<String>,
}

impl TaxonomyTree {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub categories: usize,
    pub subcategories: usize,
    pub part_types: usize,
}

/// Insert every node of `tree` in document order, so document order becomes
/// the tie-break order
///
/// # Errors
/// - `InvalidInput` for a node with a blank name
/// - Store failures
pub async fn import_taxonomy(store: &dyn TaxonomyStore, tree: &TaxonomyTree) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for category in &tree.categories {
        let category_id = store.add_category(non_blank(&category.name)?).await?;
        stats.categories += 1;

        for subcategory in &category.subcategories {
            let subcategory_id = store
                .add_subcategory(category_id, non_blank(&subcategory.name)?)
                .await?;
            stats.subcategories += 1;

            for part_type in &subcategory.part_types {
                store
                    .add_part_type(subcategory_id, non_blank(part_type)?)
                    .await?;
                stats.part_types += 1;
            }
        }
    }

    info!(
        "Imported taxonomy: {} categories, {} subcategories, {} part types",
        stats.categories, stats.subcategories, stats.part_types
    );
    Ok(stats)
}

fn non_blank(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TaxoMatchError::InvalidInput(
            "taxonomy node names must not be blank".to_string(),
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::InMemoryTaxonomyStore;

    const TREE: &str = r#"{
        "categories": [
            {"name": "Brakes", "subcategories": [
                {"name": "Pads", "partTypes": ["Brake Pads", "Pad Sensors"]}
            ]},
            {"name": "Filters", "subcategories": [
                {"name": "Oil", "partTypes": ["Oil Filter"]}
            ]}
        ]
    }"#;

    #[tokio::test]
    async fn test_import_preserves_document_order() {
        let tree: TaxonomyTree = serde_json::from_str(TREE).unwrap();
        let store = InMemoryTaxonomyStore::new();

        let stats = import_taxonomy(&store, &tree).await.unwrap();
        assert_eq!(
            stats,
            ImportStats {
                categories: 2,
                subcategories: 2,
                part_types: 3
            }
        );

        let names: Vec<String> = store
            .list_part_types()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Brake Pads", "Pad Sensors", "Oil Filter"]);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let tree: TaxonomyTree =
            serde_json::from_str(r#"{"categories":[{"name":"  "}]}"#).unwrap();
        let store = InMemoryTaxonomyStore::new();
        assert!(matches!(
            import_taxonomy(&store, &tree).await,
            Err(TaxoMatchError::InvalidInput(_))
        ));
    }
}
