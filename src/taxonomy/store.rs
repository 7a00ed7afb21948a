//! Taxonomy storage contract and the in-memory implementation

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::Result;
use crate::errors::TaxoMatchError;
use crate::models::CategoryRecord;
use crate::models::PartTypeRecord;
use crate::models::SubcategoryRecord;
use crate::models::TaxonomyLevel;

/// Read/write access to the category tree
///
/// List operations return rows in ascending id order, which is the order the
/// classifier breaks ties in.
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>>;

    async fn list_subcategories(&self) -> Result<Vec<SubcategoryRecord>>;

    async fn list_part_types(&self) -> Result<Vec<PartTypeRecord>>;

    async fn get_category(&self, id: i64) -> Result<Option<CategoryRecord>>;

    async fn get_subcategory(&self, id: i64) -> Result<Option<SubcategoryRecord>>;

    async fn get_part_type(&self, id: i64) -> Result<Option<PartTypeRecord>>;

    async fn add_category(&self, name: &str) -> Result<i64>;

    async fn add_subcategory(&self, category_id: i64, name: &str) -> Result<i64>;

    async fn add_part_type(&self, subcategory_id: i64, name: &str) -> Result<i64>;

    /// Store a node's embedding together with the rendered space it belongs to
    async fn set_embedding(
        &self,
        level: TaxonomyLevel,
        id: i64,
        embedding: &[f32],
        space: &str,
    ) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    categories: BTreeMap<i64, CategoryRecord>,
    subcategories: BTreeMap<i64, SubcategoryRecord>,
    part_types: BTreeMap<i64, PartTypeRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Taxonomy kept in process memory
///
/// Ids come from one shared counter, so they are unique across levels and
/// ascend in insertion order.
#[derive(Default)]
pub struct InMemoryTaxonomyStore {
    tables: RwLock<Tables>,
}

impl InMemoryTaxonomyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a category row as is, including its id and embedding
    pub fn insert_category(&self, record: CategoryRecord) -> Result<()> {
        let mut tables = self.write()?;
        tables.next_id = tables.next_id.max(record.id);
        tables.categories.insert(record.id, record);
        Ok(())
    }

    /// Insert a subcategory row as is; the parent is not checked
    pub fn insert_subcategory(&self, record: SubcategoryRecord) -> Result<()> {
        let mut tables = self.write()?;
        tables.next_id = tables.next_id.max(record.id);
        tables.subcategories.insert(record.id, record);
        Ok(())
    }

    /// Insert a part type row as is; the parent is not checked
    pub fn insert_part_type(&self, record: PartTypeRecord) -> Result<()> {
        let mut tables = self.write()?;
        tables.next_id = tables.next_id.max(record.id);
        tables.part_types.insert(record.id, record);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| TaxoMatchError::StoreUnavailable("taxonomy lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| TaxoMatchError::StoreUnavailable("taxonomy lock poisoned".to_string()))
    }
}

#[async_trait]
impl TaxonomyStore for InMemoryTaxonomyStore {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>> {
        Ok(self.read()?.categories.values().cloned().collect())
    }

    async fn list_subcategories(&self) -> Result<Vec<SubcategoryRecord>> {
        Ok(self.read()?.subcategories.values().cloned().collect())
    }

    async fn list_part_types(&self) -> Result<Vec<PartTypeRecord>> {
        Ok(self.read()?.part_types.values().cloned().collect())
    }

    async fn get_category(&self, id: i64) -> Result<Option<CategoryRecord>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn get_subcategory(&self, id: i64) -> Result<Option<SubcategoryRecord>> {
        Ok(self.read()?.subcategories.get(&id).cloned())
    }

    async fn get_part_type(&self, id: i64) -> Result<Option<PartTypeRecord>> {
        Ok(self.read()?.part_types.get(&id).cloned())
    }

    async fn add_category(&self, name: &str) -> Result<i64> {
        let mut tables = self.write()?;
        let id = tables.allocate_id();
        tables.categories.insert(
            id,
            CategoryRecord {
                id,
                name: name.to_string(),
                embedding: None,
                embedding_space: None,
            },
        );
        Ok(id)
    }

    async fn add_subcategory(&self, category_id: i64, name: &str) -> Result<i64> {
        let mut tables = self.write()?;
        if !tables.categories.contains_key(&category_id) {
            return Err(TaxoMatchError::InvalidInput(format!(
                "category {category_id} does not exist"
            )));
        }
        let id = tables.allocate_id();
        tables.subcategories.insert(
            id,
            SubcategoryRecord {
                id,
                category_id,
                name: name.to_string(),
                embedding: None,
                embedding_space: None,
            },
        );
        Ok(id)
    }

    async fn add_part_type(&self, subcategory_id: i64, name: &str) -> Result<i64> {
        let mut tables = self.write()?;
        if !tables.subcategories.contains_key(&subcategory_id) {
            return Err(TaxoMatchError::InvalidInput(format!(
                "subcategory {subcategory_id} does not exist"
            )));
        }
        let id = tables.allocate_id();
        tables.part_types.insert(
            id,
            PartTypeRecord {
                id,
                subcategory_id,
                name: name.to_string(),
                embedding: None,
                embedding_space: None,
            },
        );
        Ok(id)
    }

    async fn set_embedding(
        &self,
        level: TaxonomyLevel,
        id: i64,
        embedding: &[f32],
        space: &str,
    ) -> Result<()> {
        let mut tables = self.write()?;
        let slot = match level {
            TaxonomyLevel::Category => tables
                .categories
                .get_mut(&id)
                .map(|r| (&mut r.embedding, &mut r.embedding_space)),
            TaxonomyLevel::Subcategory => tables
                .subcategories
                .get_mut(&id)
                .map(|r| (&mut r.embedding, &mut r.embedding_space)),
            TaxonomyLevel::PartType => tables
                .part_types
                .get_mut(&id)
                .map(|r| (&mut r.embedding, &mut r.embedding_space)),
        };

        let (stored, stored_space) =
            slot.ok_or_else(|| TaxoMatchError::InvalidInput(format!("{level} {id} does not exist")))?;
        *stored = Some(embedding.to_vec());
        *stored_space = Some(space.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_ascend_in_insertion_order() {
        let store = InMemoryTaxonomyStore::new();
        let brakes = store.add_category("Brakes").await.unwrap();
        let filters = store.add_category("Filters").await.unwrap();
        let pads = store.add_subcategory(brakes, "Pads").await.unwrap();
        store.add_part_type(pads, "Brake Pads").await.unwrap();

        let names: Vec<String> = store
            .list_categories()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Brakes", "Filters"]);
        assert!(brakes < filters && filters < pads);
    }

    #[tokio::test]
    async fn test_add_child_of_missing_parent_rejected() {
        let store = InMemoryTaxonomyStore::new();
        let err = store.add_subcategory(42, "Pads").await.unwrap_err();
        assert!(matches!(err, TaxoMatchError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_set_embedding_updates_row() {
        let store = InMemoryTaxonomyStore::new();
        let id = store.add_category("Brakes").await.unwrap();
        store
            .set_embedding(TaxonomyLevel::Category, id, &[1.0, 0.0], "test/2")
            .await
            .unwrap();

        let row = store.get_category(id).await.unwrap().unwrap();
        assert_eq!(row.embedding, Some(vec![1.0, 0.0]));
        assert_eq!(row.embedding_space.as_deref(), Some("test/2"));
        assert!(store
            .set_embedding(TaxonomyLevel::PartType, id, &[1.0, 0.0], "test/2")
            .await
            .is_err());
    }
}
