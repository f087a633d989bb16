//! Buff-state probe with a short-lived cache.
//!
//! Checking buffs costs a capture plus a template match, and several
//! cycle steps want the answer in quick succession; the cache keeps the
//! probe from hammering the window.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::debug;

use crate::config::ChargedConfig;
use crate::ports::GameWindow;
use crate::zone::Zone;

/// Tri-state buff answer. `Unknown` means the question could not be
/// answered (window unfocusable, capture failed), not "probably not".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charged {
    Unknown,
    No,
    Yes,
}

impl Charged {
    pub fn is_yes(&self) -> bool {
        matches!(self, Charged::Yes)
    }
}

pub struct ChargedCheck {
    window: Arc<dyn GameWindow>,
    buff_zone: Zone,
    template: std::path::PathBuf,
    threshold: f32,
    config: ChargedConfig,
    cache: Mutex<Option<(Instant, bool)>>,
}

impl ChargedCheck {
    pub fn new(
        window: Arc<dyn GameWindow>,
        buff_zone: Zone,
        template: std::path::PathBuf,
        threshold: f32,
        config: ChargedConfig,
    ) -> Self {
        Self {
            window,
            buff_zone,
            template,
            threshold,
            config,
            cache: Mutex::new(None),
        }
    }

    /// Cached answer if fresh enough, otherwise a live probe.
    pub fn is_charged(&self) -> Charged {
        if let Some((at, charged)) = *self.cache.lock().unwrap() {
            if at.elapsed() < self.config.cache_ttl {
                return if charged { Charged::Yes } else { Charged::No };
            }
        }
        self.force_check()
    }

    /// Probe the buff bar regardless of the cache, refreshing it on a
    /// definite answer.
    pub fn force_check(&self) -> Charged {
        if !self.window.is_focused() {
            debug!("charged check skipped: window not focusable");
            return Charged::Unknown;
        }
        let rect = match self
            .window
            .client_size()
            .and_then(|client| self.buff_zone.resolve(client))
        {
            Ok(r) => r,
            Err(e) => {
                debug!("charged check skipped: {e}");
                return Charged::Unknown;
            }
        };
        match self.window.find(rect, &self.template, self.threshold) {
            Ok(hit) => {
                let charged = hit.is_some();
                *self.cache.lock().unwrap() = Some((Instant::now(), charged));
                if charged {
                    Charged::Yes
                } else {
                    Charged::No
                }
            }
            Err(e) => {
                debug!("charged check failed: {e}");
                Charged::Unknown
            }
        }
    }

    /// Drop the cache; the next `is_charged` probes live.
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap() = None;
    }
}
