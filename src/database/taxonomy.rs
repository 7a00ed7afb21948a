use async_trait::async_trait;
use pgvector::Vector;

use super::Database;
use crate::models::CategoryRecord;
use crate::models::PartTypeRecord;
use crate::models::SubcategoryRecord;
use crate::models::TaxonomyLevel;
use crate::taxonomy::TaxonomyStore;
use crate::Result;
use crate::TaxoMatchError;

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    embedding: Option<Vector>,
    embedding_space: Option<String>,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            embedding: row.embedding.map(|v| v.to_vec()),
            embedding_space: row.embedding_space,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubcategoryRow {
    id: i64,
    category_id: i64,
    name: String,
    embedding: Option<Vector>,
    embedding_space: Option<String>,
}

impl From<SubcategoryRow> for SubcategoryRecord {
    fn from(row: SubcategoryRow) -> Self {
        Self {
            id: row.id,
            category_id: row.category_id,
            name: row.name,
            embedding: row.embedding.map(|v| v.to_vec()),
            embedding_space: row.embedding_space,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PartTypeRow {
    id: i64,
    subcategory_id: i64,
    name: String,
    embedding: Option<Vector>,
    embedding_space: Option<String>,
}

impl From<PartTypeRow> for PartTypeRecord {
    fn from(row: PartTypeRow) -> Self {
        Self {
            id: row.id,
            subcategory_id: row.subcategory_id,
            name: row.name,
            embedding: row.embedding.map(|v| v.to_vec()),
            embedding_space: row.embedding_space,
        }
    }
}

#[async_trait]
impl TaxonomyStore for Database {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, embedding, embedding_space FROM categories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_subcategories(&self) -> Result<Vec<SubcategoryRecord>> {
        let rows = sqlx::query_as::<_, SubcategoryRow>(
            "SELECT id, category_id, name, embedding, embedding_space FROM subcategories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_part_types(&self) -> Result<Vec<PartTypeRecord>> {
        let rows = sqlx::query_as::<_, PartTypeRow>(
            "SELECT id, subcategory_id, name, embedding, embedding_space FROM part_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_category(&self, id: i64) -> Result<Option<CategoryRecord>> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, embedding, embedding_space FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_subcategory(&self, id: i64) -> Result<Option<SubcategoryRecord>> {
        let row = sqlx::query_as::<_, SubcategoryRow>(
            "SELECT id, category_id, name, embedding, embedding_space FROM subcategories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_part_type(&self, id: i64) -> Result<Option<PartTypeRecord>> {
        let row = sqlx::query_as::<_, PartTypeRow>(
            "SELECT id, subcategory_id, name, embedding, embedding_space FROM part_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn add_category(&self, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>("INSERT INTO categories (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn add_subcategory(&self, category_id: i64, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO subcategories (category_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(category_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn add_part_type(&self, subcategory_id: i64, name: &str) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO part_types (subcategory_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(subcategory_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn set_embedding(
        &self,
        level: TaxonomyLevel,
        id: i64,
        embedding: &[f32],
        space: &str,
    ) -> Result<()> {
        // Table names come from a closed enum, never from input
        let sql = format!(
            "UPDATE {} SET embedding = $1, embedding_space = $2 WHERE id = $3",
            level.table()
        );
        let result = sqlx::query(&sql)
            .bind(Vector::from(embedding.to_vec()))
            .bind(space)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TaxoMatchError::InvalidInput(format!("{level} {id} does not exist")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    #[ignore = "Requires PostgreSQL with pgvector"]
    async fn test_taxonomy_round_trip() {
        let config = AppConfig::load().unwrap();
        let db = Database::from_config(&config).await.unwrap();
        db.init_schema(config.embedding_dimension()).await.unwrap();

        let category = db.add_category("Test Category").await.unwrap();
        let subcategory = db.add_subcategory(category, "Test Subcategory").await.unwrap();
        let part_type = db.add_part_type(subcategory, "Test Part").await.unwrap();

        let vector = vec![0.0_f32; config.embedding_dimension()];
        db.set_embedding(TaxonomyLevel::PartType, part_type, &vector, "test/dim")
            .await
            .unwrap();

        let row = db.get_part_type(part_type).await.unwrap().unwrap();
        assert_eq!(row.subcategory_id, subcategory);
        assert_eq!(row.embedding.map(|e| e.len()), Some(config.embedding_dimension()));

        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category)
            .execute(db.pool())
            .await
            .unwrap();
    }
}
