use super::Database;
use crate::Result;
use crate::TaxoMatchError;

impl Database {
    /// Check if database schema is initialized
    /// Returns true if all required tables exist
    pub async fn is_schema_initialized(&self) -> Result<bool> {
        let required_tables = vec![
            "categories",
            "subcategories",
            "part_types",
            "classification_cache",
        ];

        for table_name in required_tables {
            let result = sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = 'public'
                    AND table_name = $1
                )
                ",
            )
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;

            if !result {
                tracing::debug!("Missing required table: {}", table_name);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Verify database schema or return helpful error
    pub async fn verify_schema_or_error(&self) -> Result<()> {
        if !self.is_schema_initialized().await? {
            return Err(TaxoMatchError::Custom(
                "❌ Database schema not initialized!\n\n\
                 Please run the following command to initialize the database:\n\n\
                 \x1b[1;32mtaxomatch init\x1b[0m\n"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Dimension of the stored cache vectors, if the schema exists
    pub async fn schema_dimension(&self) -> Result<Option<usize>> {
        // pgvector stores the dimension in atttypmod
        let dimension = sqlx::query_scalar::<_, i32>(
            r"
            SELECT a.atttypmod
            FROM pg_attribute a
            JOIN pg_class c ON a.attrelid = c.oid
            WHERE c.relname = 'classification_cache'
              AND a.attname = 'embedding'
              AND NOT a.attisdropped
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(dimension.and_then(|d| usize::try_from(d).ok()))
    }

    /// Initialize database schema
    ///
    /// Vector columns are created with `dimension` components. Existing
    /// tables are left as they are.
    pub async fn init_schema(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(TaxoMatchError::ConfigError(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        let statements = [
            format!(
                r"
                CREATE TABLE IF NOT EXISTS categories (
                    id BIGSERIAL PRIMARY KEY,
                    name TEXT NOT NULL,
                    embedding vector({dimension}),
                    embedding_space TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            ),
            format!(
                r"
                CREATE TABLE IF NOT EXISTS subcategories (
                    id BIGSERIAL PRIMARY KEY,
                    category_id BIGINT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    embedding vector({dimension}),
                    embedding_space TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            ),
            format!(
                r"
                CREATE TABLE IF NOT EXISTS part_types (
                    id BIGSERIAL PRIMARY KEY,
                    subcategory_id BIGINT NOT NULL REFERENCES subcategories(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    embedding vector({dimension}),
                    embedding_space TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            ),
            format!(
                r"
                CREATE TABLE IF NOT EXISTS classification_cache (
                    id BIGSERIAL PRIMARY KEY,
                    product_hash TEXT NOT NULL UNIQUE,
                    product_name TEXT NOT NULL,
                    product_description TEXT NOT NULL DEFAULT '',
                    suggested_category TEXT NOT NULL,
                    suggested_subcategory TEXT NOT NULL,
                    suggested_parttype TEXT NOT NULL,
                    confidence INTEGER NOT NULL,
                    validation_reason TEXT,
                    embedding vector({dimension}),
                    embedding_space TEXT,
                    usage_count BIGINT NOT NULL DEFAULT 0,
                    last_used_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            ),
            "CREATE INDEX IF NOT EXISTS idx_subcategories_category_id ON subcategories(category_id)"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS idx_part_types_subcategory_id ON part_types(subcategory_id)"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS idx_classification_cache_space ON classification_cache(embedding_space)"
                .to_string(),
            r"
            CREATE INDEX IF NOT EXISTS idx_classification_cache_embedding
            ON classification_cache USING hnsw (embedding vector_cosine_ops)
            "
            .to_string(),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        if let Some(existing) = self.schema_dimension().await? {
            if existing != dimension {
                tracing::warn!(
                    "⚠️  classification_cache.embedding has {} dimensions, configuration expects {}",
                    existing,
                    dimension
                );
            }
        }

        tracing::info!("✅ Database schema initialized ({} dimensional vectors)", dimension);
        Ok(())
    }
}
