use pneumonia_inference::ModelService;
use std::sync::Arc;
use tokio::{sync::OnceCell, task::JoinError};

type Loader<M> = Arc<dyn Fn() -> M + Send + Sync>;

/// Builds the classifier on first use and hands out the same instance for
/// the rest of the process.
pub struct LazyClassifier<M: ModelService> {
    loader: Loader<M>,
    cell: OnceCell<Arc<M>>,
}

impl<M: ModelService> LazyClassifier<M> {
    pub fn new(loader: impl Fn() -> M + Send + Sync + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            cell: OnceCell::new(),
        }
    }

    /// Model loading is blocking work and runs on the blocking pool. A
    /// loader that panics leaves the cell empty.
    pub async fn get(&self) -> Result<Arc<M>, JoinError> {
        self.cell
            .get_or_try_init(|| {
                let loader = self.loader.clone();
                async move {
                    tracing::info!("Loading classifier");
                    tokio::task::spawn_blocking(move || Arc::new(loader())).await
                }
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}
