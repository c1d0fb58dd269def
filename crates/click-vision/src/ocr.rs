use image::{ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// One token exactly as the OCR engine reported it.
///
/// `confidence` keeps the engine's native 0-100 scale; tesseract uses -1 for
/// structural rows (pages, blocks, lines) that carry no word.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("tesseract is not installed or not on PATH")]
    Unavailable,
    #[error("failed to stage image for OCR: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode image for OCR: {0}")]
    Image(#[from] image::ImageError),
    #[error("tesseract exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

/// Text recognition backend.
pub trait OcrEngine {
    /// Word-level detections, in the engine's emission order.
    fn detect(&self, image: &RgbaImage, language: &str) -> Result<Vec<OcrWord>, OcrError>;

    /// Plain transcription of everything visible in the image.
    fn transcribe(&self, image: &RgbaImage, language: &str) -> Result<String, OcrError>;
}

/// Runs the `tesseract` executable on a staged PNG.
pub struct TesseractEngine {
    binary: PathBuf,
    temp_dir: PathBuf,
}

impl TesseractEngine {
    pub fn new() -> Result<Self, OcrError> {
        Self::with_binary("tesseract")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Result<Self, OcrError> {
        let binary = binary.into();
        if !check_tesseract(&binary) {
            warn!(
                "Tesseract not found at {}. Install it (e.g. apt install tesseract-ocr) and the language data you need",
                binary.display()
            );
            return Err(OcrError::Unavailable);
        }
        debug!("Tesseract OCR available at {}", binary.display());

        Ok(Self {
            binary,
            temp_dir: std::env::temp_dir(),
        })
    }

    fn run_tesseract(
        &self,
        image: &RgbaImage,
        language: &str,
        extra: &[&str],
    ) -> Result<String, OcrError> {
        let started = Instant::now();
        // Removed on drop.
        let staged = tempfile::Builder::new()
            .prefix("screenclick-ocr-")
            .suffix(".png")
            .tempfile_in(&self.temp_dir)?;
        image.save_with_format(staged.path(), ImageFormat::Png)?;

        let output = Command::new(&self.binary)
            .arg(staged.path())
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .args(extra)
            .output()?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(
            "Tesseract ({}) finished on {}x{} in {:?}",
            language,
            image.width(),
            image.height(),
            started.elapsed()
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractEngine {
    fn detect(&self, image: &RgbaImage, language: &str) -> Result<Vec<OcrWord>, OcrError> {
        let tsv = self.run_tesseract(image, language, &["tsv"])?;
        let words = parse_tsv(&tsv);
        debug!("OCR produced {} row(s)", words.len());
        Ok(words)
    }

    fn transcribe(&self, image: &RgbaImage, language: &str) -> Result<String, OcrError> {
        self.run_tesseract(image, language, &[])
    }
}

/// Parse tesseract's TSV output into rows, preserving their order.
///
/// Columns: level page_num block_num par_num line_num word_num left top width
/// height conf text. The header and malformed lines are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines().filter_map(parse_tsv_row).collect()
}

fn parse_tsv_row(line: &str) -> Option<OcrWord> {
    let cols: Vec<&str> = line.splitn(12, '\t').collect();
    if cols.len() < 11 {
        return None;
    }
    cols[0].trim().parse::<u32>().ok()?;

    let int = |i: usize| cols[i].trim().parse::<i32>().ok();
    Some(OcrWord {
        left: int(6)?,
        top: int(7)?,
        width: int(8)?,
        height: int(9)?,
        confidence: cols[10].trim().parse::<f64>().ok()?,
        text: cols.get(11).map(|t| t.trim().to_string()).unwrap_or_default(),
    })
}

/// Check if Tesseract is installed and accessible
fn check_tesseract(binary: &Path) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t1920\t1080\t-1\t
4\t1\t1\t1\t1\t0\t100\t40\t300\t24\t-1\t
5\t1\t1\t1\t1\t1\t100\t40\t48\t24\t92.417\t帮助
5\t1\t1\t1\t1\t2\t160\t40\t96\t24\t75\t帮助中心
";

    #[test]
    fn test_parse_tsv_keeps_order() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(words.len(), 4);
        assert_eq!(words[2].text, "帮助");
        assert_eq!(words[3].text, "帮助中心");
        let w = &words[3];
        assert_eq!((w.left, w.top, w.width, w.height), (160, 40, 96, 24));
    }

    #[test]
    fn test_parse_tsv_native_confidence() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(words[0].confidence, -1.0);
        assert!((words[2].confidence - 92.417).abs() < 1e-9);
        assert!(words[1].text.is_empty());
    }

    #[test]
    fn test_parse_tsv_skips_malformed() {
        let words = parse_tsv("garbage\n5\t1\t1\t1\t1\t1\tx\t0\t1\t1\t90\tword\n5\t1\t1");
        assert!(words.is_empty());
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let err = TesseractEngine::with_binary("/nonexistent/tesseract").err();
        assert!(matches!(err, Some(OcrError::Unavailable)));
    }
}
