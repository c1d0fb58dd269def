use click_capture::ClickTarget;
use click_config::{ClickConfig, ClickType};
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
use std::thread::sleep;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use enigo::{InputError, NewConError};

pub type InputResult<T> = Result<T, InputError>;

/// Pause after moving so the target sees a hover before the press.
const MOVE_SETTLE: Duration = Duration::from_millis(200);
const DOUBLE_CLICK_GAP: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to connect to the input system: {0}")]
    Connect(#[from] NewConError),
    #[error("pointer action failed: {0}")]
    Input(#[from] InputError),
    #[error("({x}, {y}) is outside the {width}x{height} screen")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
}

/// Synthetic pointer backend.
pub trait Pointer {
    /// Size of the main display in pixels.
    fn screen_size(&self) -> InputResult<(i32, i32)>;
    fn move_to(&mut self, x: i32, y: i32) -> InputResult<()>;
    /// Perform `gesture` at the current pointer position.
    fn press(&mut self, gesture: ClickType) -> InputResult<()>;
}

pub struct EnigoPointer {
    enigo: Enigo,
}

impl EnigoPointer {
    pub fn new() -> Result<Self, DispatchError> {
        Ok(Self {
            enigo: Enigo::new(&Settings::default())?,
        })
    }
}

impl Pointer for EnigoPointer {
    fn screen_size(&self) -> InputResult<(i32, i32)> {
        self.enigo.main_display()
    }

    fn move_to(&mut self, x: i32, y: i32) -> InputResult<()> {
        self.enigo.move_mouse(x, y, Coordinate::Abs)?;
        sleep(MOVE_SETTLE);
        Ok(())
    }

    fn press(&mut self, gesture: ClickType) -> InputResult<()> {
        match gesture {
            ClickType::Single => self.enigo.button(Button::Left, Direction::Click),
            ClickType::Double => {
                self.enigo.button(Button::Left, Direction::Click)?;
                sleep(DOUBLE_CLICK_GAP);
                self.enigo.button(Button::Left, Direction::Click)
            }
            ClickType::Right => self.enigo.button(Button::Right, Direction::Click),
        }
    }
}

/// Turns located coordinates into pointer clicks.
pub struct ClickDispatcher {
    pointer: Box<dyn Pointer>,
    config: ClickConfig,
}

impl ClickDispatcher {
    pub fn new(pointer: Box<dyn Pointer>, config: ClickConfig) -> Self {
        Self { pointer, config }
    }

    pub fn config(&self) -> &ClickConfig {
        &self.config
    }

    pub fn screen_size(&self) -> Result<(i32, i32), DispatchError> {
        Ok(self.pointer.screen_size()?)
    }

    pub fn is_point_on_screen(&self, x: i32, y: i32) -> Result<bool, DispatchError> {
        let (width, height) = self.screen_size()?;
        Ok((0..width).contains(&x) && (0..height).contains(&y))
    }

    fn check_bounds(&self, target: ClickTarget) -> Result<(), DispatchError> {
        let (width, height) = self.screen_size()?;
        if (0..width).contains(&target.x) && (0..height).contains(&target.y) {
            Ok(())
        } else {
            Err(DispatchError::OutOfBounds {
                x: target.x,
                y: target.y,
                width,
                height,
            })
        }
    }

    /// Move to `(x, y)` plus the configured offset, perform the gesture, then
    /// wait the configured settle interval. Returns the coordinate clicked.
    pub fn click(
        &mut self,
        x: i32,
        y: i32,
        click_type: Option<ClickType>,
    ) -> Result<ClickTarget, DispatchError> {
        let (dx, dy) = (self.config.offset_x, self.config.offset_y);
        let Some(target) = ClickTarget::new(x, y).translate(dx, dy) else {
            let (width, height) = self.screen_size()?;
            return Err(DispatchError::OutOfBounds {
                x: x.saturating_add(dx),
                y: y.saturating_add(dy),
                width,
                height,
            });
        };
        self.check_bounds(target)?;

        let gesture = click_type.unwrap_or(self.config.click_type);
        self.pointer.move_to(target.x, target.y)?;
        self.pointer.press(gesture)?;
        debug!("{} click at ({}, {})", gesture, target.x, target.y);

        sleep(self.config.interval());
        Ok(target)
    }

    /// Up to `max_retries` attempts of [`click`](Self::click), waiting
    /// `retry_interval` after each failure except the last. An off-screen
    /// coordinate fails immediately since retrying cannot change it.
    pub fn click_with_retry(
        &mut self,
        x: i32,
        y: i32,
        max_retries: u32,
        retry_interval: Duration,
    ) -> Result<ClickTarget, DispatchError> {
        let attempts = max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.click(x, y, None) {
                Ok(target) => return Ok(target),
                Err(e @ DispatchError::OutOfBounds { .. }) => return Err(e),
                Err(e) if attempt >= attempts => {
                    warn!("Click failed after {} attempt(s): {}", attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Click attempt {}/{} failed: {}", attempt, attempts, e);
                    sleep(retry_interval);
                    attempt += 1;
                }
            }
        }
    }
}
