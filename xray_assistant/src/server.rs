use crate::{
    classifier_cell::LazyClassifier,
    config::{Config, UploadConfig},
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use pneumonia_inference::ModelService;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

pub struct SharedState<M: ModelService> {
    pub classifier: Arc<LazyClassifier<M>>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            classifier: self.classifier.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn build_router<M: ModelService>(state: SharedState<M>, upload: &UploadConfig) -> Router {
    api_routes()
        .layer(DefaultBodyLimit::max(upload.max_bytes))
        .with_state(state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        state: SharedState<M>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let router = build_router(state, &config.upload);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockModelService;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XRAYBOUNDARY";

    fn app(model: MockModelService) -> Router {
        let state = SharedState {
            classifier: Arc::new(LazyClassifier::new(move || model.clone())),
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        build_router(state, &UploadConfig::default())
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(300, 300, image::Rgb([0, 0, 0]));
        let mut image_data = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut image_data),
            image::ImageFormat::Png,
        )
        .unwrap();
        image_data
    }

    fn upload_request(file_name: Option<&str>, image_data: &[u8], heatmap: bool) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(file_name) = file_name {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"xray\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(image_data);
            body.extend_from_slice(b"\r\n");
        }
        if heatmap {
            body.extend_from_slice(
                format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"heatmap\"\r\n\r\non\r\n")
                    .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_index_shows_ready_model() {
        let request = Request::get("/").body(Body::empty()).unwrap();
        let (status, html) = send(app(MockModelService::normal()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("AI model ready!"));
        assert!(html.contains("not provide a definitive medical diagnosis"));
    }

    #[tokio::test]
    async fn test_index_blocks_unavailable_model() {
        let request = Request::get("/").body(Body::empty()).unwrap();
        let (status, html) = send(app(MockModelService::unavailable()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("The model could not be loaded"));
        assert!(html.contains("<fieldset disabled>"));
    }

    #[tokio::test]
    async fn test_analyze_pneumonia() {
        let request = upload_request(Some("chest.png"), &png_bytes(), false);
        let (status, html) = send(app(MockModelService::pneumonia()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(r#"<div class="alert error"><strong>Result:</strong> Pneumonia"#));
        assert!(html.contains("93.25%"));
        assert!(html.contains("data:image/png;base64,"));
        assert!(!html.contains("doctor mode"));
    }

    #[tokio::test]
    async fn test_analyze_normal_with_heatmap() {
        let model = MockModelService::normal();
        let saliency_calls = model.saliency_calls.clone();
        let request = upload_request(Some("chest.JPG"), &png_bytes(), true);
        let (status, html) = send(app(model), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(r#"<div class="alert success"><strong>Result:</strong> Normal"#));
        assert!(html.contains("data:image/jpeg;base64,"));
        assert!(html.contains("Regions the model focused on"));
        assert_eq!(saliency_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_heatmap_not_computed_unless_requested() {
        let model = MockModelService::normal();
        let saliency_calls = model.saliency_calls.clone();
        let request = upload_request(Some("chest.png"), &png_bytes(), false);
        send(app(model), request).await;

        assert_eq!(saliency_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_heatmap_unavailable() {
        let model = MockModelService::normal().without_saliency();
        let request = upload_request(Some("chest.png"), &png_bytes(), true);
        let (status, html) = send(app(model), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("The heatmap could not be generated."));
    }

    #[tokio::test]
    async fn test_analyze_failure_is_explicit() {
        let request = upload_request(Some("chest.png"), b"corrupt", true);
        let (status, html) = send(app(MockModelService::failing()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("The image could not be analysed."));
    }

    #[tokio::test]
    async fn test_analyze_rejects_unsupported_extension() {
        let request = upload_request(Some("chest.gif"), &png_bytes(), false);
        let (status, html) = send(app(MockModelService::normal()), request).await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(html.contains("Unsupported file type"));
        assert!(!html.contains("Result:"));
    }

    #[tokio::test]
    async fn test_analyze_with_unavailable_model() {
        let request = upload_request(Some("chest.png"), &png_bytes(), false);
        let (status, html) = send(app(MockModelService::unavailable()), request).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(html.contains("The model could not be loaded"));
        assert!(!html.contains("Result:"));
    }

    #[tokio::test]
    async fn test_analyze_without_file_is_noop() {
        let request = upload_request(None, &[], true);
        let (status, html) = send(app(MockModelService::normal()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains(r#"name="xray""#));
        assert!(!html.contains("Result:"));
    }

    #[tokio::test]
    async fn test_health_reports_model_status() {
        let router = app(MockModelService::normal());

        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(router.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "Available");
        assert!(json["model"].is_null());

        let request = Request::get("/").body(Body::empty()).unwrap();
        send(router.clone(), request).await;

        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (_, body) = send(router, request).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["model"]["ready"], true);
        assert_eq!(json["model"]["device"], "cpu");
    }

    #[tokio::test]
    async fn test_metrics_count_predictions() {
        let router = app(MockModelService::pneumonia());
        let request = upload_request(Some("chest.png"), &png_bytes(), true);
        send(router.clone(), request).await;

        let request = Request::get("/metrics").body(Body::empty()).unwrap();
        let (status, body) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"predictions_total{label="Pneumonia"} 1"#));
        assert!(body.contains(r#"heatmaps_total{outcome="rendered"} 1"#));
    }
}
