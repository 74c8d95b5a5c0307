use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use pneumonia_inference::{ModelService, ModelStatus};
use serde::Serialize;

#[derive(Serialize)]
pub struct Status {
    status: String,
    /// `None` until the first page view has loaded the model.
    model: Option<ModelStatus>,
}

pub async fn healthcheck<M: ModelService>(State(state): State<SharedState<M>>) -> impl IntoResponse {
    let model = if state.classifier.is_initialized() {
        state.classifier.get().await.ok().map(|model| model.status())
    } else {
        None
    };

    Json(Status {
        status: "Available".into(),
        model,
    })
}
