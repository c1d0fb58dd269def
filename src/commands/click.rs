use anyhow::{Context, Result};
use click_capture::XcapScreen;
use click_config::AppConfig;
use click_input::{ClickDispatcher, EnigoPointer};
use click_state::{EventSink, StepEvent, Tally};
use click_vision::{LocateError, TesseractEngine, TextLocator};

/// One locate-then-click unit of work, shared by every run mode.
pub struct ClickTask {
    locator: TextLocator,
    dispatcher: ClickDispatcher,
    events: EventSink,
    tally: Tally,
}

impl ClickTask {
    pub fn new(locator: TextLocator, dispatcher: ClickDispatcher, events: EventSink) -> Self {
        Self {
            locator,
            dispatcher,
            events,
            tally: Tally::default(),
        }
    }

    /// Wire up tesseract, xcap and enigo. Must run on the thread that will
    /// use the task.
    pub fn from_config(config: &AppConfig, events: EventSink) -> Result<Self> {
        let engine = TesseractEngine::new().context("OCR engine unavailable")?;
        let pointer = EnigoPointer::new().context("pointer input unavailable")?;
        let locator = TextLocator::new(
            Box::new(engine),
            Box::new(XcapScreen::new()),
            config.ocr.clone(),
        );
        let dispatcher = ClickDispatcher::new(Box::new(pointer), config.click.clone());
        Ok(Self::new(locator, dispatcher, events))
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Look for `target` and click it.
    ///
    /// Returns `Ok(true)` when the click went through. A missing target or a
    /// click that failed every retry is logged and returns `Ok(false)`;
    /// capture and OCR failures are returned as errors.
    pub fn run(&mut self, target: &str) -> Result<bool, LocateError> {
        self.events.emit(StepEvent::Searching {
            target: target.to_string(),
        });

        let Some(position) = self.locator.get_text_position(target)? else {
            self.tally.not_found += 1;
            self.events.emit(StepEvent::NotFound {
                target: target.to_string(),
            });
            return Ok(false);
        };

        self.tally.found += 1;
        self.events.emit(StepEvent::Found {
            target: target.to_string(),
            x: position.x,
            y: position.y,
        });

        let max_retries = self.dispatcher.config().max_retries;
        let retry_interval = self.dispatcher.config().retry_interval();
        match self
            .dispatcher
            .click_with_retry(position.x, position.y, max_retries, retry_interval)
        {
            Ok(clicked) => {
                self.tally.clicked += 1;
                self.events.emit(StepEvent::Clicked {
                    x: clicked.x,
                    y: clicked.y,
                });
                Ok(true)
            }
            Err(e) => {
                self.tally.failed += 1;
                self.events.emit(StepEvent::ClickFailed {
                    target: target.to_string(),
                    error: e.to_string(),
                });
                Ok(false)
            }
        }
    }

    /// Transcribe everything in the capture area.
    pub fn list_text(&mut self) -> Result<String, LocateError> {
        let text = self.locator.recognize_all_text()?;
        self.events.emit(StepEvent::Transcript { text: text.clone() });
        Ok(text)
    }
}
