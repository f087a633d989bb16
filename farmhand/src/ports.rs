//! Trait seams between the agent core and its collaborators.
//!
//! Everything the executor and orchestrator touch (the game window, the
//! serial input device, the template store, the status channel, the
//! UI-thread scheduler) sits behind one of these traits, so the whole
//! cycle can run against in-memory doubles in tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::geometry::{Point, Rect, Size};

/// Template language; picks the localized template directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Ru,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ru => "ru",
        }
    }
}

/// A successful template match inside a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Normalized correlation score in `[0, 1]`.
    pub score: f32,
    /// Center of the matched region, in client coordinates.
    pub center: Point,
}

/// The observed game client window: geometry, capture and template search.
///
/// All coordinates are client-relative; [`GameWindow::origin`] gives the
/// client origin in screen coordinates for the input driver.
pub trait GameWindow: Send + Sync {
    fn client_size(&self) -> Result<Size, AgentError>;

    /// Client origin in screen coordinates.
    fn origin(&self) -> Result<Point, AgentError>;

    /// Capture the given client-relative rectangle.
    fn capture(&self, rect: Rect) -> Result<RgbaImage, AgentError>;

    /// Best match of `template` inside `rect`, or `None` below `threshold`.
    fn find(
        &self,
        rect: Rect,
        template: &Path,
        threshold: f32,
    ) -> Result<Option<Match>, AgentError>;

    fn is_focused(&self) -> bool;
}

/// The physical input channel (a serial microcontroller emulating HID).
///
/// Commands are the device's named commands: literal characters (`"b"`,
/// `"4"`), key names (`"pageup"`, `"backspace_click"`), mouse commands
/// (`"wheel_click"`, `"lclick"`) and layout switches (`"lang_en"`).
pub trait InputDriver: Send + Sync {
    fn send(&self, cmd: &str) -> Result<(), AgentError>;

    /// Move the pointer to a screen coordinate and left-click.
    fn click_at(&self, point: Point) -> Result<(), AgentError>;

    /// Left-click at the current pointer position.
    fn left_click(&self) -> Result<(), AgentError> {
        self.send("lclick")
    }
}

/// Maps `(server, language, path parts)` to template images on disk.
pub trait TemplateResolver: Send + Sync {
    fn resolve(&self, server: &str, lang: Lang, parts: &[&str]) -> Result<PathBuf, AgentError>;

    /// Basenames available under a template directory, for dynamic
    /// enumeration of villages/locations.
    fn list(&self, server: &str, lang: Lang, parts: &[&str]) -> Result<Vec<String>, AgentError>;
}

/// User-visible status line sink. `ok` is `Some(true)` for success,
/// `Some(false)` for failure, `None` for neutral progress.
pub trait StatusSink: Send + Sync {
    fn status(&self, text: &str, ok: Option<bool>);
}

/// Default sink: mirror status lines into `tracing`.
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn status(&self, text: &str, ok: Option<bool>) {
        match ok {
            Some(false) => tracing::warn!(target: "farmhand::status", "{text}"),
            _ => tracing::info!(target: "farmhand::status", "{text}"),
        }
    }
}

/// Deferred-execution capability for the orchestrator's cooperative tick.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>);
}

/// Cooperative cancellation flag, polled at every suspension point.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Interpolation variables available to flows (`{account_login}`,
/// `{account_pin}`, `{mode_key}`, …).
pub type Extras = HashMap<String, String>;

/// A selected farming destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub village: String,
    pub location: String,
    /// Post-teleport movement routine; `None` means teleport only.
    pub row: Option<String>,
}
