//! Local sentence encoder for the `neural` provider
//!
//! Wraps fastembed's all-MiniLM-L6-v2 (384 dimensions, mean pooling, ONNX
//! runtime). Loading the model is expensive, so it lives behind a
//! `NeuralModelHandle`: an application-scoped resource that loads the model
//! at most once, on first use, no matter how many tasks ask for it
//! concurrently. Callers create one handle at startup and inject it into
//! every `EmbeddingService` that should share the model.
//!
//! This module is only available when the `neural` feature is enabled.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use fastembed::EmbeddingModel;
use fastembed::InitOptions;
use fastembed::TextEmbedding;
use tokio::sync::OnceCell;
use tracing::info;

use crate::errors::Result;
use crate::errors::TaxoMatchError;

/// Model identifier used in embedding space tags
pub const NEURAL_MODEL_ID: &str = "all-minilm-l6-v2";

/// Output dimension of all-MiniLM-L6-v2
pub const NEURAL_DIMENSION: usize = 384;

/// Lazily loaded, shared sentence encoder
pub struct NeuralModelHandle {
    model: OnceCell<Arc<Mutex<TextEmbedding>>>,
    load_count: AtomicUsize,
}

impl Default for NeuralModelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl NeuralModelHandle {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            model: OnceCell::const_new(),
            load_count: AtomicUsize::new(0),
        }
    }

    /// Number of times the model has been loaded (0 or 1)
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Get the model, loading it on first use
    ///
    /// # Errors
    /// - `ModelLoad` when the model cannot be downloaded or initialized. The
    ///   error is returned on every call until a load succeeds; there is no
    ///   fallback to another provider.
    async fn model(&self) -> Result<Arc<Mutex<TextEmbedding>>> {
        self.model
            .get_or_try_init(|| async {
                info!("🔧 Loading sentence encoder ({NEURAL_MODEL_ID})...");
                self.load_count.fetch_add(1, Ordering::SeqCst);

                let model = tokio::task::spawn_blocking(|| {
                    TextEmbedding::try_new(
                        InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                            .with_show_download_progress(false),
                    )
                })
                .await
                .map_err(|e| TaxoMatchError::ModelLoad(format!("Loader task failed: {e}")))?
                .map_err(|e| TaxoMatchError::ModelLoad(e.to_string()))?;

                info!("✅ Sentence encoder loaded");
                Ok(Arc::new(Mutex::new(model)))
            })
            .await
            .cloned()
    }

    /// Embed a batch of non-empty texts
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.model().await?;

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| TaxoMatchError::EmbeddingError("Encoder lock poisoned".to_string()))?;
            guard
                .embed(texts, None)
                .map_err(|e| TaxoMatchError::EmbeddingError(format!("Encoder failed: {e}")))
        })
        .await
        .map_err(|e| TaxoMatchError::EmbeddingError(format!("Encoder task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_starts_unloaded() {
        let handle = NeuralModelHandle::new();
        assert!(!handle.is_loaded());
        assert_eq!(handle.load_count(), 0);
    }

    #[tokio::test]
    #[ignore = "Downloads the all-MiniLM-L6-v2 model"]
    async fn test_concurrent_first_use_loads_once() {
        let handle = Arc::new(NeuralModelHandle::new());
        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.embed_batch(vec![format!("brake pads {i}")]).await })
            })
            .collect();

        for task in tasks {
            let vectors = task.await.unwrap().unwrap();
            assert_eq!(vectors[0].len(), NEURAL_DIMENSION);
        }
        assert_eq!(handle.load_count(), 1);
    }
}
