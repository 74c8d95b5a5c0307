use crate::{
    page::{self, AlertLevel, AnalysisView, HeatmapView, ModelBanner, Outcome, PageView},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::RgbImage;
use pneumonia_inference::{InferenceError, ModelService, Prediction};
use std::{io::Cursor, time::Instant};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::instrument;

const IMAGE_FIELD: &str = "xray";
const HEATMAP_FIELD: &str = "heatmap";

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Unsupported file type {0:?}. Please upload a JPG or PNG image.")]
    UnsupportedFormat(String),
    #[error("The model could not be loaded.")]
    ModelUnavailable,
    #[error("Analysis task failed: {0}")]
    Task(#[from] JoinError),
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let (status, banner) = match &self {
            AnalyzeError::Multipart(e) => (e.status(), ModelBanner::Ready),
            AnalyzeError::UnsupportedFormat(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, ModelBanner::Ready)
            }
            AnalyzeError::ModelUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, ModelBanner::Unavailable)
            }
            AnalyzeError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, ModelBanner::Ready),
        };
        tracing::warn!("Analysis rejected: {}", self);

        let view = PageView::new(banner).with_notice(AlertLevel::Error, self.to_string());
        (status, Html(page::render(&view))).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.rsplit_once('.')?;
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            _ => None,
        }
    }

    fn mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

struct Upload {
    file_name: String,
    image_data: Vec<u8>,
    heatmap: bool,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, AnalyzeError> {
    let mut file = None;
    let mut heatmap = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let image_data = field.bytes().await?;
                if !image_data.is_empty() {
                    file = Some((file_name, image_data.to_vec()));
                }
            }
            Some(HEATMAP_FIELD) => {
                heatmap = field.text().await? == "on";
            }
            _ => {}
        }
    }

    Ok(file.map(|(file_name, image_data)| Upload {
        file_name,
        image_data,
        heatmap,
    }))
}

struct Analysis {
    prediction: Result<Prediction, InferenceError>,
    elapsed_ms: u64,
    overlay: Option<Option<RgbImage>>,
}

fn run_analysis<M: ModelService>(model: &M, image_data: &[u8], heatmap: bool) -> Analysis {
    let started = Instant::now();
    let prediction = model.predict(image_data);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let overlay = heatmap.then(|| model.saliency_overlay(image_data));
    Analysis {
        prediction,
        elapsed_ms,
        overlay,
    }
}

fn encode_png(img: &RgbImage) -> Option<String> {
    let mut buffer = Vec::new();
    match img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png) {
        Ok(()) => Some(format!("data:image/png;base64,{}", STANDARD.encode(&buffer))),
        Err(e) => {
            tracing::warn!("Failed to encode heatmap: {}", e);
            None
        }
    }
}

#[instrument(skip(state, multipart))]
pub async fn analyze<M: ModelService>(
    State(state): State<SharedState<M>>,
    mut multipart: Multipart,
) -> Result<Response, AnalyzeError> {
    let model = state
        .classifier
        .get()
        .await
        .map_err(|_| AnalyzeError::ModelUnavailable)?;

    let Some(upload) = read_upload(&mut multipart).await? else {
        let banner = ModelBanner::from_status(&model.status());
        return Ok(Html(page::render(&PageView::new(banner))).into_response());
    };

    if !model.status().ready {
        return Err(AnalyzeError::ModelUnavailable);
    }
    let kind = ImageKind::from_file_name(&upload.file_name)
        .ok_or(AnalyzeError::UnsupportedFormat(upload.file_name))?;

    tracing::info!(
        bytes = upload.image_data.len(),
        heatmap = upload.heatmap,
        "Analysing upload"
    );

    let image_data_uri = format!(
        "data:{};base64,{}",
        kind.mime(),
        STANDARD.encode(&upload.image_data)
    );

    let analysis = {
        let model = model.clone();
        let image_data = upload.image_data;
        let heatmap = upload.heatmap;
        tokio::task::spawn_blocking(move || run_analysis(model.as_ref(), &image_data, heatmap))
            .await?
    };

    let outcome = match analysis.prediction {
        Ok(prediction) => {
            state
                .metrics
                .record_prediction(prediction.label, analysis.elapsed_ms);
            Outcome::from_prediction(prediction)
        }
        Err(e) => {
            tracing::warn!("Prediction failed: {}", e);
            state.metrics.record_prediction_failure();
            Outcome::Failed
        }
    };

    let heatmap = match analysis.overlay {
        None => HeatmapView::NotRequested,
        Some(overlay) => {
            let data_uri = overlay.as_ref().and_then(encode_png);
            state.metrics.record_heatmap(data_uri.is_some());
            match data_uri {
                Some(data_uri) => HeatmapView::Rendered { data_uri },
                None => HeatmapView::Unavailable,
            }
        }
    };

    let view = PageView::new(ModelBanner::Ready).with_analysis(AnalysisView {
        image_data_uri,
        outcome,
        heatmap,
    });
    Ok(Html(page::render(&view)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_kind_from_file_name() {
        assert_eq!(ImageKind::from_file_name("chest.PNG"), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_file_name("scan.final.jpeg"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_file_name("scan.jpg"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_file_name("scan.gif"), None);
        assert_eq!(ImageKind::from_file_name("png"), None);
    }

    #[test]
    fn test_encode_png_data_uri() {
        let data_uri = encode_png(&RgbImage::new(4, 4)).unwrap();
        assert!(data_uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }
}
