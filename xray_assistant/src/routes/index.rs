use crate::{
    page::{self, ModelBanner, PageView},
    server::SharedState,
};
use axum::{extract::State, response::Html};
use pneumonia_inference::ModelService;
use tracing::instrument;

#[instrument(skip(state))]
pub async fn index<M: ModelService>(State(state): State<SharedState<M>>) -> Html<String> {
    let banner = match state.classifier.get().await {
        Ok(model) => ModelBanner::from_status(&model.status()),
        Err(e) => {
            tracing::error!("Classifier construction failed: {}", e);
            ModelBanner::Unavailable
        }
    };

    Html(page::render(&PageView::new(banner)))
}
