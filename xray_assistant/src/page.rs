//! Server-side rendering of the single upload page.

use pneumonia_inference::{Label, ModelStatus, Prediction};
use std::fmt::Write;

const STYLE: &str = r#"
body { font-family: sans-serif; max-width: 880px; margin: 2rem auto; padding: 0 1rem; color: #262730; }
.columns { display: flex; gap: 1.5rem; flex-wrap: wrap; }
.columns > div { flex: 1 1 360px; }
.alert { padding: 0.75rem 1rem; border-radius: 0.5rem; margin: 0.5rem 0; }
.alert.error { background: #fde8e8; color: #7d1a1a; }
.alert.warning { background: #fff6dc; color: #7a5a00; }
.alert.success { background: #e3f6e8; color: #175c2b; }
.alert.info { background: #e6f0fb; color: #1a4a7d; }
figure { margin: 0; }
figure img { width: 100%; height: auto; border-radius: 0.25rem; }
figcaption, .caption { color: #6b6f7b; font-size: 0.875rem; }
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Error,
    Warning,
    Success,
    Info,
}

impl AlertLevel {
    fn class(&self) -> &'static str {
        match self {
            AlertLevel::Error => "error",
            AlertLevel::Warning => "warning",
            AlertLevel::Success => "success",
            AlertLevel::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBanner {
    Ready,
    Unavailable,
}

impl ModelBanner {
    pub fn from_status(status: &ModelStatus) -> Self {
        if status.ready {
            ModelBanner::Ready
        } else {
            ModelBanner::Unavailable
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Classified(Prediction),
    Failed,
}

impl Outcome {
    /// The unavailable sentinel renders like any other failed analysis.
    pub fn from_prediction(prediction: Prediction) -> Self {
        match prediction.label {
            Label::Normal | Label::Pneumonia => Outcome::Classified(prediction),
            Label::Unavailable => Outcome::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeatmapView {
    NotRequested,
    Rendered { data_uri: String },
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct AnalysisView {
    pub image_data_uri: String,
    pub outcome: Outcome,
    pub heatmap: HeatmapView,
}

#[derive(Debug, Clone)]
pub struct PageView {
    pub model: ModelBanner,
    pub notice: Option<(AlertLevel, String)>,
    pub analysis: Option<AnalysisView>,
}

impl PageView {
    pub fn new(model: ModelBanner) -> Self {
        Self {
            model,
            notice: None,
            analysis: None,
        }
    }

    pub fn with_notice(mut self, level: AlertLevel, message: impl Into<String>) -> Self {
        self.notice = Some((level, message.into()));
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisView) -> Self {
        self.analysis = Some(analysis);
        self
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn alert(html: &mut String, level: AlertLevel, body: &str) {
    let _ = write!(html, r#"<div class="alert {}">{}</div>"#, level.class(), body);
}

pub fn render(view: &PageView) -> String {
    let mut html = String::with_capacity(4096);
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Pneumonia Detection Assistant</title>
<style>{STYLE}</style>
</head>
<body>
<h1>AI-Assisted Pneumonia Detection</h1>
<p>This application uses a deep convolutional network (ResNet-50) to look for signs of pneumonia in chest X-ray images.
<strong>Please upload an X-ray image.</strong></p>
"#
    );

    match view.model {
        ModelBanner::Ready => alert(&mut html, AlertLevel::Success, "AI model ready!"),
        ModelBanner::Unavailable => alert(
            &mut html,
            AlertLevel::Error,
            "The model could not be loaded. Image analysis is disabled.",
        ),
    }

    if let Some((level, message)) = &view.notice {
        alert(&mut html, *level, &escape_html(message));
    }

    render_form(&mut html, view.model == ModelBanner::Ready);

    if let Some(analysis) = &view.analysis {
        render_analysis(&mut html, analysis);
    }

    html.push_str(
        r#"<hr>
<p class="caption">Note: this system is only an assistive tool and cannot provide a definitive medical diagnosis. Results may vary depending on the training data.</p>
</body>
</html>
"#,
    );
    html
}

fn render_form(html: &mut String, enabled: bool) {
    let disabled = if enabled { "" } else { " disabled" };
    let _ = write!(
        html,
        r#"<form action="/analyze" method="post" enctype="multipart/form-data">
<fieldset{disabled}>
<label for="xray">Choose a chest X-ray image</label>
<input type="file" id="xray" name="xray" accept=".jpg,.jpeg,.png,image/jpeg,image/png">
<br>
<input type="checkbox" id="heatmap" name="heatmap" value="on">
<label for="heatmap">Show where the AI looked (heatmap)</label>
<br>
<button type="submit">Analyse</button>
</fieldset>
</form>
"#
    );
}

fn render_analysis(html: &mut String, analysis: &AnalysisView) {
    let _ = write!(
        html,
        r#"<div class="columns">
<div><figure><img src="{}" alt="Uploaded X-ray"><figcaption>Uploaded image</figcaption></figure></div>
<div>
"#,
        analysis.image_data_uri
    );

    match &analysis.outcome {
        Outcome::Classified(prediction) if prediction.label == Label::Pneumonia => {
            alert(
                html,
                AlertLevel::Error,
                &format!("<strong>Result:</strong> {}", prediction.label),
            );
            alert(
                html,
                AlertLevel::Warning,
                &format!("<strong>Confidence score:</strong> {:.2}%", prediction.confidence),
            );
            html.push_str("<p><em>Please consult a doctor as soon as possible.</em></p>\n");
        }
        Outcome::Classified(prediction) => {
            alert(
                html,
                AlertLevel::Success,
                &format!("<strong>Result:</strong> {}", prediction.label),
            );
            alert(
                html,
                AlertLevel::Info,
                &format!("<strong>Confidence score:</strong> {:.2}%", prediction.confidence),
            );
            html.push_str("<p><em>No findings were detected.</em></p>\n");
        }
        Outcome::Failed => alert(html, AlertLevel::Error, "The image could not be analysed."),
    }

    match &analysis.heatmap {
        HeatmapView::NotRequested => {}
        HeatmapView::Rendered { data_uri } => {
            let _ = write!(
                html,
                r#"<hr><h3>Detailed analysis (doctor mode)</h3>
<figure><img src="{data_uri}" alt="Saliency heatmap"><figcaption>Regions the model focused on (red areas)</figcaption></figure>
"#
            );
            alert(
                html,
                AlertLevel::Info,
                "Red areas are the regions the model weighed most when deciding between Pneumonia and Normal.",
            );
        }
        HeatmapView::Unavailable => {
            html.push_str("<hr><h3>Detailed analysis (doctor mode)</h3>\n");
            alert(
                html,
                AlertLevel::Warning,
                "The heatmap could not be generated. Required components may be missing.",
            );
        }
    }

    html.push_str("</div>\n</div>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(outcome: Outcome, heatmap: HeatmapView) -> AnalysisView {
        AnalysisView {
            image_data_uri: "data:image/png;base64,AAAA".to_string(),
            outcome,
            heatmap,
        }
    }

    #[test]
    fn test_empty_page() {
        let html = render(&PageView::new(ModelBanner::Ready));

        assert!(html.contains("AI model ready!"));
        assert!(html.contains(r#"name="xray""#));
        assert!(!html.contains("Result:"));
        assert!(html.contains("cannot provide a definitive medical diagnosis"));
    }

    #[test]
    fn test_unavailable_model_disables_form() {
        let html = render(&PageView::new(ModelBanner::Unavailable));

        assert!(html.contains(r#"<div class="alert error">The model could not be loaded"#));
        assert!(html.contains("<fieldset disabled>"));
    }

    #[test]
    fn test_pneumonia_styling() {
        let prediction = Prediction {
            label: Label::Pneumonia,
            confidence: 91.234,
        };
        let view = PageView::new(ModelBanner::Ready)
            .with_analysis(analysis(Outcome::Classified(prediction), HeatmapView::NotRequested));
        let html = render(&view);

        assert!(html.contains(r#"<div class="alert error"><strong>Result:</strong> Pneumonia</div>"#));
        assert!(html.contains(r#"<div class="alert warning"><strong>Confidence score:</strong> 91.23%"#));
        assert!(html.contains("consult a doctor"));
        assert!(!html.contains("doctor mode"));
    }

    #[test]
    fn test_normal_styling() {
        let prediction = Prediction {
            label: Label::Normal,
            confidence: 64.0,
        };
        let view = PageView::new(ModelBanner::Ready)
            .with_analysis(analysis(Outcome::Classified(prediction), HeatmapView::Unavailable));
        let html = render(&view);

        assert!(html.contains(r#"<div class="alert success"><strong>Result:</strong> Normal</div>"#));
        assert!(html.contains(r#"<div class="alert info"><strong>Confidence score:</strong> 64.00%"#));
        assert!(html.contains("The heatmap could not be generated."));
    }

    #[test]
    fn test_failed_outcome() {
        assert_eq!(Outcome::from_prediction(Prediction::unavailable()), Outcome::Failed);

        let view = PageView::new(ModelBanner::Ready).with_analysis(analysis(
            Outcome::Failed,
            HeatmapView::Rendered {
                data_uri: "data:image/png;base64,BBBB".to_string(),
            },
        ));
        let html = render(&view);

        assert!(html.contains(r#"<div class="alert error">The image could not be analysed.</div>"#));
        assert!(html.contains("data:image/png;base64,BBBB"));
    }

    #[test]
    fn test_notice_is_escaped() {
        let view = PageView::new(ModelBanner::Ready)
            .with_notice(AlertLevel::Error, "Unsupported file <script>");
        let html = render(&view);

        assert!(html.contains("Unsupported file &lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
