//! HTML for the upload form and transcript page.

use crate::error::AppResult;
use crate::transcriber::allow_list::ALLOWED_EXTENSIONS;
use tera::{Context, Tera};

const INDEX_TEMPLATE: &str = "index.html";

/// Renders the single page the service serves.
///
/// The template is compiled into the binary so the server does not depend on
/// its working directory. A name ending in `.html` turns on Tera's autoescaping,
/// which matters because transcripts and error messages contain user-influenced
/// text.
#[derive(Debug, Clone)]
pub struct PageRenderer {
    tera: Tera,
}

impl PageRenderer {
    pub fn new() -> AppResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))?;
        Ok(Self { tera })
    }

    /// The form, plus the transcript (or error line) when there is one.
    pub fn index(&self, transcription: Option<&str>) -> AppResult<String> {
        let mut context = Context::new();
        context.insert("transcription", &transcription);
        context.insert("allowed_extensions", &ALLOWED_EXTENSIONS);
        Ok(self.tera.render(INDEX_TEMPLATE, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_without_transcript() {
        let html = PageRenderer::new().unwrap().index(None).unwrap();
        assert!(html.contains(r#"name="file""#));
        assert!(html.contains(r#"enctype="multipart/form-data""#));
        assert!(!html.contains("Transcription</h2>"));
        assert!(html.contains(".mp4,.mov"));
    }

    #[test]
    fn test_transcript_is_inserted() {
        let html = PageRenderer::new()
            .unwrap()
            .index(Some("hello world"))
            .unwrap();
        assert!(html.contains("Transcription</h2>"));
        assert!(html.contains("hello world"));
    }

    #[test]
    fn test_transcript_is_escaped() {
        let html = PageRenderer::new()
            .unwrap()
            .index(Some("<script>alert(1)</script>"))
            .unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
