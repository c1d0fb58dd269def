mod locator;
mod ocr;

pub use locator::{
    get_center, normalize_confidence, select_matches, LocateError, RecognizedTextBox, TextLocator,
};
pub use ocr::{parse_tsv, OcrEngine, OcrError, OcrWord, TesseractEngine};
