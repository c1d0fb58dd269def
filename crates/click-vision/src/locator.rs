use click_capture::{CaptureError, ClickTarget, ScreenSource};
use click_config::OcrConfig;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ocr::{OcrEngine, OcrError, OcrWord};

/// A detected token in image coordinates, confidence normalized to 0.0-1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedTextBox {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f64,
}

impl From<OcrWord> for RecognizedTextBox {
    fn from(word: OcrWord) -> Self {
        Self {
            text: word.text,
            left: word.left,
            top: word.top,
            width: word.width,
            height: word.height,
            confidence: normalize_confidence(word.confidence),
        }
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

/// Map the engine's 0-100 scale onto 0.0-1.0.
pub fn normalize_confidence(native: f64) -> f64 {
    if native.is_finite() {
        (native / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Keep detections whose text contains `target` (case-sensitive substring)
/// and whose normalized confidence is at least `threshold`.
///
/// The engine's emission order is preserved; nothing is re-sorted.
pub fn select_matches(
    words: Vec<OcrWord>,
    target: &str,
    threshold: f64,
) -> Vec<RecognizedTextBox> {
    words
        .into_iter()
        .filter(|w| w.text.contains(target))
        .map(RecognizedTextBox::from)
        .filter(|b| b.confidence >= threshold)
        .collect()
}

/// Midpoint of a box, floor division.
pub fn get_center(b: &RecognizedTextBox) -> ClickTarget {
    ClickTarget::new(
        b.left + b.width.div_euclid(2),
        b.top + b.height.div_euclid(2),
    )
}

/// Finds target text on screen.
pub struct TextLocator {
    engine: Box<dyn OcrEngine>,
    screen: Box<dyn ScreenSource>,
    settings: OcrConfig,
}

impl TextLocator {
    pub fn new(
        engine: Box<dyn OcrEngine>,
        screen: Box<dyn ScreenSource>,
        settings: OcrConfig,
    ) -> Self {
        Self {
            engine,
            screen,
            settings,
        }
    }

    pub fn settings(&self) -> &OcrConfig {
        &self.settings
    }

    /// Capture the configured region, or the primary monitor.
    pub fn capture(&self) -> Result<RgbaImage, CaptureError> {
        self.screen.capture(self.settings.region.as_ref())
    }

    /// Every qualifying match in `image`, in OCR emission order.
    pub fn find_all(
        &self,
        image: &RgbaImage,
        target: &str,
        threshold: f64,
        language: &str,
    ) -> Result<Vec<RecognizedTextBox>, OcrError> {
        let words = self.engine.detect(image, language)?;
        let total = words.len();
        let matches = select_matches(words, target, threshold);
        debug!(
            "{:?}: {} of {} detection(s) qualify at confidence >= {}",
            target,
            matches.len(),
            total,
            threshold
        );
        Ok(matches)
    }

    /// The earliest qualifying match in scan order, not the most confident one.
    pub fn find_first(
        &self,
        image: &RgbaImage,
        target: &str,
        threshold: f64,
        language: &str,
    ) -> Result<Option<RecognizedTextBox>, OcrError> {
        Ok(self
            .find_all(image, target, threshold, language)?
            .into_iter()
            .next())
    }

    /// Capture the screen and return the first match for `target` using the
    /// configured confidence and language. Coordinates are image-relative.
    pub fn find_text(&self, target: &str) -> Result<Option<RecognizedTextBox>, LocateError> {
        let image = self.capture()?;
        Ok(self.find_first(
            &image,
            target,
            self.settings.confidence,
            &self.settings.language,
        )?)
    }

    /// Screen coordinate of the first match for `target`, if any.
    ///
    /// When a capture region is configured the box centre is translated by the
    /// region origin so the result is in desktop coordinates. A centre that
    /// cannot be expressed in desktop coordinates counts as not found.
    pub fn get_text_position(&self, target: &str) -> Result<Option<ClickTarget>, LocateError> {
        let Some(found) = self.find_text(target)? else {
            return Ok(None);
        };
        let center = get_center(&found);
        Ok(match &self.settings.region {
            Some(r) => center.translate(r.left, r.top),
            None => Some(center),
        })
    }

    /// Raw transcription of the captured area. Diagnostics only.
    pub fn recognize_all_text(&self) -> Result<String, LocateError> {
        let image = self.capture()?;
        Ok(self.engine.transcribe(&image, &self.settings.language)?)
    }
}
