//! Scripted stand-ins for the OCR engine, the screen and the pointer.

use click_capture::{CaptureError, ScreenRegion, ScreenSource};
use click_config::{AppConfig, ClickConfig, ClickType};
use click_input::{ClickDispatcher, InputError, InputResult, Pointer};
use click_state::{EventSink, RunControl, StepEvent};
use click_vision::{OcrEngine, OcrError, OcrWord, TextLocator};
use image::RgbaImage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedReceiver;

use super::ClickTask;

/// A detection of `text` whose box centre is (124, 52).
pub fn hit(text: &str, confidence: f64) -> OcrWord {
    OcrWord {
        text: text.to_string(),
        left: 100,
        top: 40,
        width: 48,
        height: 24,
        confidence,
    }
}

pub fn miss() -> Vec<OcrWord> {
    Vec::new()
}

/// Click settings with every pause removed.
pub fn quick_click_config() -> ClickConfig {
    ClickConfig {
        interval: 0.0,
        retry_interval: 0.0,
        ..ClickConfig::default()
    }
}

pub fn quick_config() -> AppConfig {
    AppConfig {
        click: quick_click_config(),
        ..AppConfig::default()
    }
}

#[derive(Default)]
struct Shared {
    script: VecDeque<Vec<OcrWord>>,
    detections: usize,
    moves: Vec<(i32, i32)>,
    presses: Vec<ClickType>,
    press_attempts: u32,
    press_failures: u32,
    no_monitor: bool,
    stop_on: Option<(usize, RunControl)>,
}

/// Shared handle onto one set of fakes. Each OCR pass consumes the next
/// scripted frame; an exhausted script sees an empty screen.
#[derive(Clone, Default)]
pub struct Fakes(Arc<Mutex<Shared>>);

impl Fakes {
    pub fn new(script: Vec<Vec<OcrWord>>) -> Self {
        let fakes = Self::default();
        fakes.lock().script = script.into();
        fakes
    }

    pub fn failing_presses(self, count: u32) -> Self {
        self.lock().press_failures = count;
        self
    }

    pub fn without_monitor(self) -> Self {
        self.lock().no_monitor = true;
        self
    }

    /// Request a stop on `control` during the `nth` OCR pass.
    pub fn stop_on_detection(self, nth: usize, control: &RunControl) -> Self {
        self.lock().stop_on = Some((nth, control.clone()));
        self
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.0.lock().unwrap()
    }

    pub fn moves(&self) -> Vec<(i32, i32)> {
        self.lock().moves.clone()
    }

    pub fn presses(&self) -> Vec<ClickType> {
        self.lock().presses.clone()
    }

    pub fn press_attempts(&self) -> u32 {
        self.lock().press_attempts
    }

    pub fn detections(&self) -> usize {
        self.lock().detections
    }

    pub fn remaining_frames(&self) -> usize {
        self.lock().script.len()
    }

    pub fn task(&self, config: &AppConfig, events: EventSink) -> ClickTask {
        let locator = TextLocator::new(
            Box::new(self.clone()),
            Box::new(FakeScreen(self.clone())),
            config.ocr.clone(),
        );
        let dispatcher = ClickDispatcher::new(Box::new(self.clone()), config.click.clone());
        ClickTask::new(locator, dispatcher, events)
    }
}

impl OcrEngine for Fakes {
    fn detect(&self, _image: &RgbaImage, _language: &str) -> Result<Vec<OcrWord>, OcrError> {
        let mut shared = self.lock();
        shared.detections += 1;
        if let Some((nth, control)) = &shared.stop_on {
            if shared.detections == *nth {
                control.request_stop();
            }
        }
        Ok(shared.script.pop_front().unwrap_or_default())
    }

    fn transcribe(&self, _image: &RgbaImage, _language: &str) -> Result<String, OcrError> {
        let words = self.lock().script.pop_front().unwrap_or_default();
        Ok(words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

struct FakeScreen(Fakes);

impl ScreenSource for FakeScreen {
    fn capture(&self, region: Option<&ScreenRegion>) -> Result<RgbaImage, CaptureError> {
        if self.0.lock().no_monitor {
            return Err(CaptureError::NoMonitor);
        }
        let (w, h) = region.map_or((64, 64), |r| (r.width, r.height));
        Ok(RgbaImage::new(w, h))
    }
}

impl Pointer for Fakes {
    fn screen_size(&self) -> InputResult<(i32, i32)> {
        Ok((1920, 1080))
    }

    fn move_to(&mut self, x: i32, y: i32) -> InputResult<()> {
        self.lock().moves.push((x, y));
        Ok(())
    }

    fn press(&mut self, gesture: ClickType) -> InputResult<()> {
        let mut shared = self.lock();
        shared.press_attempts += 1;
        if shared.press_failures > 0 {
            shared.press_failures -= 1;
            return Err(InputError::Simulate("injected failure"));
        }
        shared.presses.push(gesture);
        Ok(())
    }
}

/// A task over `fakes` with pause-free settings, plus its event stream.
pub fn fake_task(fakes: &Fakes) -> (ClickTask, UnboundedReceiver<StepEvent>) {
    let (sink, rx) = EventSink::channel();
    (fakes.task(&quick_config(), sink), rx)
}

pub fn drain_tags(rx: &mut UnboundedReceiver<StepEvent>) -> Vec<&'static str> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.tag())
        .collect()
}
