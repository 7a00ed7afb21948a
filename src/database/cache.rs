use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use pgvector::Vector;

use super::Database;
use crate::cache::CacheStore;
use crate::embeddings::Embedding;
use crate::models::CacheEntry;
use crate::models::CacheStoreStats;
use crate::models::SimilarEntry;
use crate::Result;

const ENTRY_COLUMNS: &str = "product_hash, product_name, product_description, \
    suggested_category, suggested_subcategory, suggested_parttype, confidence, \
    validation_reason, embedding, embedding_space, usage_count, last_used_at, created_at";

#[derive(sqlx::FromRow)]
struct CacheRow {
    product_hash: String,
    product_name: String,
    product_description: String,
    suggested_category: String,
    suggested_subcategory: String,
    suggested_parttype: String,
    confidence: i32,
    validation_reason: Option<String>,
    embedding: Option<Vector>,
    embedding_space: Option<String>,
    usage_count: i64,
    last_used_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<CacheRow> for CacheEntry {
    fn from(row: CacheRow) -> Self {
        Self {
            product_hash: row.product_hash,
            product_name: row.product_name,
            product_description: row.product_description,
            suggested_category: row.suggested_category,
            suggested_subcategory: row.suggested_subcategory,
            suggested_parttype: row.suggested_parttype,
            confidence: row.confidence,
            validation_reason: row.validation_reason,
            embedding: row.embedding.map(|v| v.to_vec()),
            embedding_space: row.embedding_space,
            usage_count: row.usage_count,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SimilarRow {
    #[sqlx(flatten)]
    entry: CacheRow,
    similarity: f64,
}

#[async_trait]
impl CacheStore for Database {
    async fn get(&self, product_hash: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM classification_cache WHERE product_hash = $1"
        ))
        .bind(product_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_many(&self, product_hashes: &[String]) -> Result<Vec<CacheEntry>> {
        if product_hashes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, CacheRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM classification_cache WHERE product_hash = ANY($1)"
        ))
        .bind(product_hashes.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO classification_cache (
                product_hash, product_name, product_description,
                suggested_category, suggested_subcategory, suggested_parttype,
                confidence, validation_reason, embedding, embedding_space,
                usage_count, last_used_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (product_hash) DO UPDATE SET
                product_name = EXCLUDED.product_name,
                product_description = EXCLUDED.product_description,
                suggested_category = EXCLUDED.suggested_category,
                suggested_subcategory = EXCLUDED.suggested_subcategory,
                suggested_parttype = EXCLUDED.suggested_parttype,
                confidence = EXCLUDED.confidence,
                validation_reason = EXCLUDED.validation_reason,
                embedding = EXCLUDED.embedding,
                embedding_space = EXCLUDED.embedding_space,
                last_used_at = NOW()
            ",
        )
        .bind(&entry.product_hash)
        .bind(&entry.product_name)
        .bind(&entry.product_description)
        .bind(&entry.suggested_category)
        .bind(&entry.suggested_subcategory)
        .bind(&entry.suggested_parttype)
        .bind(entry.confidence)
        .bind(&entry.validation_reason)
        .bind(entry.embedding.clone().map(Vector::from))
        .bind(&entry.embedding_space)
        .bind(entry.usage_count)
        .bind(entry.last_used_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_similar(
        &self,
        embedding: &Embedding,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarEntry>> {
        let query = Vector::from(embedding.values().to_vec());
        let rows = sqlx::query_as::<_, SimilarRow>(&format!(
            r"
            SELECT {ENTRY_COLUMNS}, 1 - (embedding <=> $1) AS similarity
            FROM classification_cache
            WHERE embedding IS NOT NULL
              AND embedding_space = $2
              AND btrim(suggested_category) <> ''
              AND 1 - (embedding <=> $1) >= $3
            ORDER BY embedding <=> $1
            LIMIT $4
            "
        ))
        .bind(query)
        .bind(embedding.space().to_string())
        .bind(f64::from(threshold))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SimilarEntry {
                entry: row.entry.into(),
                similarity: row.similarity as f32,
            })
            .collect())
    }

    async fn record_usage(&self, product_hashes: &[String]) -> Result<()> {
        if product_hashes.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r"
            UPDATE classification_cache
            SET usage_count = usage_count + 1, last_used_at = NOW()
            WHERE product_hash = ANY($1)
            ",
        )
        .bind(product_hashes.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStoreStats> {
        let (total_entries, entries_with_embeddings, total_usage) =
            sqlx::query_as::<_, (i64, i64, i64)>(
                r"
                SELECT
                    COUNT(*),
                    COUNT(embedding),
                    COALESCE(SUM(usage_count), 0)::BIGINT
                FROM classification_cache
                ",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(CacheStoreStats {
            total_entries,
            entries_with_embeddings,
            total_usage,
        })
    }
}
