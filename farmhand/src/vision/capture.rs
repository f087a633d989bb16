//! `xcap`-backed implementation of the [`GameWindow`] port.
//!
//! The window is looked up by title substring on every call rather than
//! held: the client restarts during account recovery and a cached handle
//! would go stale.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{GrayImage, RgbaImage};

use crate::errors::AgentError;
use crate::geometry::{Point, Rect, Size};
use crate::ports::{GameWindow, Match};
use crate::vision::matcher;

pub struct XcapWindow {
    title: String,
    /// Loaded template cache; templates are small and immutable on disk.
    templates: Mutex<HashMap<PathBuf, Arc<GrayImage>>>,
}

impl XcapWindow {
    /// `title` is matched as a substring of the window title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            templates: Mutex::new(HashMap::new()),
        }
    }

    fn locate(&self) -> Result<xcap::Window, AgentError> {
        let windows = xcap::Window::all()
            .map_err(|e| AgentError::WindowGone(format!("failed to list windows: {e}")))?;
        windows
            .into_iter()
            .find(|w| {
                w.title()
                    .map(|t| t.contains(&self.title))
                    .unwrap_or(false)
            })
            .ok_or_else(|| AgentError::WindowGone(format!("no window titled '*{}*'", self.title)))
    }

    fn template(&self, path: &Path) -> Result<Arc<GrayImage>, AgentError> {
        let mut cache = self.templates.lock().unwrap();
        if let Some(img) = cache.get(path) {
            return Ok(img.clone());
        }
        let img = image::open(path)
            .map_err(|e| AgentError::TemplateMissing(format!("{}: {e}", path.display())))?
            .to_luma8();
        let img = Arc::new(img);
        cache.insert(path.to_path_buf(), img.clone());
        Ok(img)
    }
}

impl GameWindow for XcapWindow {
    fn client_size(&self) -> Result<Size, AgentError> {
        let window = self.locate()?;
        let width = window
            .width()
            .map_err(|e| AgentError::WindowGone(format!("failed to get width: {e}")))?;
        let height = window
            .height()
            .map_err(|e| AgentError::WindowGone(format!("failed to get height: {e}")))?;
        Ok(Size::new(width, height))
    }

    fn origin(&self) -> Result<Point, AgentError> {
        let window = self.locate()?;
        let x = window
            .x()
            .map_err(|e| AgentError::WindowGone(format!("failed to get x: {e}")))?;
        let y = window
            .y()
            .map_err(|e| AgentError::WindowGone(format!("failed to get y: {e}")))?;
        Ok(Point::new(x, y))
    }

    fn capture(&self, rect: Rect) -> Result<RgbaImage, AgentError> {
        let window = self.locate()?;
        let image = window
            .capture_image()
            .map_err(|e| AgentError::WindowGone(format!("failed to capture window: {e}")))?;

        let bounds = rect.clamp_to(Size::new(image.width(), image.height()));
        if bounds.is_empty() {
            return Err(AgentError::BadZone(format!(
                "{rect:?} lies outside the captured {}x{} frame",
                image.width(),
                image.height()
            )));
        }
        Ok(image::imageops::crop_imm(
            &image,
            bounds.left as u32,
            bounds.top as u32,
            bounds.width(),
            bounds.height(),
        )
        .to_image())
    }

    fn find(
        &self,
        rect: Rect,
        template: &Path,
        threshold: f32,
    ) -> Result<Option<Match>, AgentError> {
        let needle = self.template(template)?;
        let patch = self.capture(rect)?;
        let gray = matcher::to_gray(&patch);
        Ok(matcher::match_template(&gray, &needle, threshold).map(|m| Match {
            score: m.score,
            center: m.center.offset(rect.left, rect.top),
        }))
    }

    fn is_focused(&self) -> bool {
        self.locate()
            .map(|w| w.is_focused().unwrap_or(false))
            .unwrap_or(false)
    }
}
