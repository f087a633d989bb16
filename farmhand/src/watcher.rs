//! HP-bar state watcher.
//!
//! A dedicated worker thread samples the `state` zone, converts pixel
//! colors into an HP ratio via the server's [`HpPalette`], and notifies a
//! listener: `on_state` every sample, `on_dead`/`on_alive` only on edges.
//! Callbacks run on the worker thread; consumers must be thread-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::ports::GameWindow;
use crate::zone::Zone;

/// Alive/dead HP-bar color samples with a per-channel tolerance.
#[derive(Debug, Clone)]
pub struct HpPalette {
    pub alive: Vec<[u8; 3]>,
    pub dead: Vec<[u8; 3]>,
    pub tolerance: u8,
}

impl HpPalette {
    fn near(&self, pixel: [u8; 3], sample: [u8; 3]) -> bool {
        pixel
            .iter()
            .zip(sample.iter())
            .all(|(&p, &s)| p.abs_diff(s) <= self.tolerance)
    }

    /// Fraction of recognized pixels that are "alive"-colored. Defaults
    /// to 1.0 when no pixel matches either set: a bad capture must not
    /// read as a death.
    pub fn hp_ratio(&self, image: &RgbaImage) -> f32 {
        let mut alive = 0u32;
        let mut dead = 0u32;
        for pixel in image.pixels() {
            let rgb = [pixel[0], pixel[1], pixel[2]];
            if self.alive.iter().any(|&s| self.near(rgb, s)) {
                alive += 1;
            } else if self.dead.iter().any(|&s| self.near(rgb, s)) {
                dead += 1;
            }
        }
        if alive + dead == 0 {
            1.0
        } else {
            alive as f32 / (alive + dead) as f32
        }
    }
}

/// Immutable snapshot of the player's observed state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub hp_ratio: f32,
    pub alive: bool,
    pub updated_at: Instant,
}

/// Watcher consumer. All methods default to no-ops so listeners implement
/// only what they need. Callbacks may arrive during shutdown and must be
/// tolerated.
pub trait StateListener: Send + Sync {
    fn on_state(&self, _state: PlayerState) {}
    fn on_dead(&self) {}
    fn on_alive(&self) {}
}

struct Shared {
    running: AtomicBool,
    stop: AtomicBool,
}

/// Periodic HP sampler with dead/alive edge detection.
pub struct StateWatcher {
    window: Arc<dyn GameWindow>,
    listener: Arc<dyn StateListener>,
    palette: HpPalette,
    state_zone: Zone,
    config: WatcherConfig,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StateWatcher {
    pub fn new(
        window: Arc<dyn GameWindow>,
        listener: Arc<dyn StateListener>,
        palette: HpPalette,
        state_zone: Zone,
        config: WatcherConfig,
    ) -> Self {
        Self {
            window,
            listener,
            palette,
            state_zone,
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                stop: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the sampling worker. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.stop.store(false, Ordering::SeqCst);

        let window = self.window.clone();
        let listener = self.listener.clone();
        let palette = self.palette.clone();
        let zone = self.state_zone.clone();
        let config = self.config.clone();
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name("hp-watcher".into())
            .spawn(move || {
                info!("state watcher started");
                let mut last_alive: Option<bool> = None;

                while !shared.stop.load(Ordering::SeqCst) {
                    match Self::sample(&*window, &palette, &zone) {
                        Ok(hp_ratio) => {
                            let alive = hp_ratio > config.zero_hp_threshold;
                            let state = PlayerState {
                                hp_ratio,
                                alive,
                                updated_at: Instant::now(),
                            };
                            listener.on_state(state);

                            match last_alive {
                                // The first sample establishes the edge;
                                // an initially dead player fires on_dead.
                                None => {
                                    if !alive {
                                        debug!(hp_ratio, "initial sample is dead");
                                        listener.on_dead();
                                    }
                                }
                                Some(was_alive) if was_alive != alive => {
                                    if alive {
                                        debug!(hp_ratio, "alive edge");
                                        listener.on_alive();
                                    } else {
                                        debug!(hp_ratio, "dead edge");
                                        listener.on_dead();
                                    }
                                }
                                Some(_) => {}
                            }
                            last_alive = Some(alive);
                        }
                        Err(e) => {
                            // A failed capture is not an edge; keep the
                            // previous state and try again next tick.
                            warn!("hp sample failed: {e}");
                        }
                    }
                    thread::sleep(config.poll_interval);
                }
                shared.running.store(false, Ordering::SeqCst);
                info!("state watcher stopped");
            })
            .expect("failed to spawn watcher thread");

        *self.handle.lock().unwrap() = Some(handle);
    }

    fn sample(
        window: &dyn GameWindow,
        palette: &HpPalette,
        zone: &Zone,
    ) -> Result<f32, crate::errors::AgentError> {
        let client = window.client_size()?;
        let rect = zone.resolve(client)?;
        let image = window.capture(rect)?;
        Ok(palette.hp_ratio(&image))
    }

    /// Signal the worker to stop and join it; takes effect within one
    /// poll period. Idempotent.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

impl Drop for StateWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> HpPalette {
        HpPalette {
            alive: vec![[200, 40, 40]],
            dead: vec![[40, 40, 40]],
            tolerance: 10,
        }
    }

    fn bar(alive_px: u32, dead_px: u32) -> RgbaImage {
        let total = alive_px + dead_px;
        RgbaImage::from_fn(total.max(1), 1, |x, _| {
            if x < alive_px {
                image::Rgba([200, 40, 40, 255])
            } else {
                image::Rgba([40, 40, 40, 255])
            }
        })
    }

    #[test]
    fn ratio_counts_palette_pixels() {
        let p = palette();
        assert!((p.hp_ratio(&bar(75, 25)) - 0.75).abs() < 1e-6);
        assert!((p.hp_ratio(&bar(0, 100))).abs() < 1e-6);
        assert!((p.hp_ratio(&bar(100, 0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unrecognized_pixels_default_to_full_hp() {
        let p = palette();
        let noise = RgbaImage::from_pixel(10, 10, image::Rgba([120, 200, 90, 255]));
        assert!((p.hp_ratio(&noise) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tolerance_is_per_channel() {
        let p = palette();
        let close = RgbaImage::from_pixel(1, 1, image::Rgba([205, 45, 35, 255]));
        let far = RgbaImage::from_pixel(1, 1, image::Rgba([220, 40, 40, 255]));
        assert!((p.hp_ratio(&close) - 1.0).abs() < 1e-6);
        // `far` matches neither set, so the safe default applies.
        assert!((p.hp_ratio(&far) - 1.0).abs() < 1e-6);
    }
}
