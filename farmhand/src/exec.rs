//! Step executor: interprets each op against the ports.
//!
//! Zones are resolved against the client rect queried at the start of
//! each op, templates through the resolver with `{placeholder}`
//! interpolation, and every suspension point polls the abort flag plus
//! the alive callback so death or cancellation cuts an op short.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::FlowDefaults;
use crate::errors::AgentError;
use crate::flow::{sleep_checked, StepResult, StepRunner};
use crate::geometry::Rect;
use crate::input::layout;
use crate::ports::{
    AbortFlag, Destination, Extras, GameWindow, InputDriver, Lang, Match, StatusSink,
    TemplateResolver,
};
use crate::step::{Layout, Op, Step, TemplateRef};
use crate::zone::Zone;

/// Alive predicate consulted at suspension points; defaults to "alive"
/// when no watcher is wired (e.g. during the login restart flow).
pub type AliveFn = Arc<dyn Fn() -> bool + Send + Sync>;

pub fn always_alive() -> AliveFn {
    Arc::new(|| true)
}

/// Immutable per-run bundle: which server, which language, which tables,
/// and the interpolation variables.
#[derive(Clone)]
pub struct FlowContext {
    pub server: String,
    pub lang: Lang,
    pub zones: HashMap<String, Zone>,
    pub templates: HashMap<String, Vec<String>>,
    pub extras: Extras,
    pub destination: Option<Destination>,
}

impl FlowContext {
    /// Replace `{name}` placeholders from `extras`. Unresolvable
    /// placeholders are a data bug and fail the op.
    pub fn interpolate(&self, input: &str) -> Result<String, AgentError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                return Err(AgentError::LoaderMissing(format!(
                    "unbalanced placeholder in '{input}'"
                )));
            };
            let key = &after[..end];
            match self.extras.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(AgentError::LoaderMissing(format!(
                        "no value for placeholder '{{{key}}}'"
                    )))
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Borrowed port bundle for one flow run.
pub struct Executor<'a> {
    pub ctx: &'a FlowContext,
    pub window: &'a dyn GameWindow,
    pub input: &'a dyn InputDriver,
    pub resolver: &'a dyn TemplateResolver,
    pub status: &'a dyn StatusSink,
    pub abort: AbortFlag,
    pub alive: AliveFn,
    pub defaults: FlowDefaults,
}

/// Internal short-circuit type: helpers bail with the step outcome.
type OpResult<T> = Result<T, StepResult>;

impl<'a> Executor<'a> {
    fn fail(&self, what: &str) -> StepResult {
        self.status.status(&format!("[flow] {what}"), Some(false));
        StepResult::Fail
    }

    fn fail_with<T>(&self, what: &str) -> OpResult<T> {
        Err(self.fail(what))
    }

    fn check_suspension(&self) -> OpResult<()> {
        if self.abort.is_raised() {
            return Err(StepResult::Aborted);
        }
        Ok(())
    }

    fn sleep(&self, d: Duration) -> OpResult<()> {
        if sleep_checked(d, &self.abort) {
            Ok(())
        } else {
            Err(StepResult::Aborted)
        }
    }

    fn resolve_zone(&self, name: &str) -> OpResult<Rect> {
        let zone = match self.ctx.zones.get(name) {
            Some(z) => z,
            None => return self.fail_with(&format!("unknown zone '{name}'")),
        };
        let client = match self.window.client_size() {
            Ok(c) => c,
            Err(e) => return self.fail_with(&format!("window: {e}")),
        };
        match zone.resolve(client) {
            Ok(r) => Ok(r),
            Err(e) => self.fail_with(&e.to_string()),
        }
    }

    fn template_path(&self, tpl: &TemplateRef) -> OpResult<PathBuf> {
        let parts: Vec<String> = match tpl {
            TemplateRef::Key(key) => match self.ctx.templates.get(key) {
                Some(parts) => parts.clone(),
                None => return self.fail_with(&format!("unknown template key '{key}'")),
            },
            TemplateRef::Parts(parts) => parts.clone(),
        };
        let mut resolved = Vec::with_capacity(parts.len());
        for part in &parts {
            match self.ctx.interpolate(part) {
                Ok(p) => resolved.push(p),
                Err(e) => return self.fail_with(&e.to_string()),
            }
        }
        let refs: Vec<&str> = resolved.iter().map(String::as_str).collect();
        match self
            .resolver
            .resolve(&self.ctx.server, self.ctx.lang, &refs)
        {
            Ok(path) => Ok(path),
            Err(e) => self.fail_with(&e.to_string()),
        }
    }

    /// One template probe, retrying a vanished window once before giving up.
    fn find_once(
        &self,
        rect: Rect,
        path: &std::path::Path,
        thr: f32,
    ) -> Result<Option<Match>, AgentError> {
        match self.window.find(rect, path, thr) {
            Err(AgentError::WindowGone(_)) => self.window.find(rect, path, thr),
            other => other,
        }
    }

    /// Poll `rect` for the template until it appears or the deadline
    /// passes. `Ok(None)` means clean timeout.
    fn poll_find(
        &self,
        rect: Rect,
        path: &std::path::Path,
        thr: f32,
        timeout_ms: u64,
    ) -> OpResult<Option<Match>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            self.check_suspension()?;
            if !(self.alive)() {
                return self.fail_with("player died during op");
            }
            match self.find_once(rect, path, thr) {
                Ok(Some(m)) => return Ok(Some(m)),
                Ok(None) => {}
                Err(e) => return self.fail_with(&e.to_string()),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            self.sleep(self.defaults.poll_interval.min(remaining))?;
        }
    }

    fn click(&self, m: Match) -> OpResult<()> {
        let origin = match self.window.origin() {
            Ok(o) => o,
            Err(e) => return self.fail_with(&format!("window: {e}")),
        };
        let screen = m.center.offset(origin.x, origin.y);
        match self.input.click_at(screen) {
            Ok(()) => Ok(()),
            Err(e) => self.fail_with(&format!("driver: {e}")),
        }
    }

    fn send_cmd(&self, cmd: &str) -> OpResult<()> {
        match self.input.send(cmd) {
            Ok(()) => Ok(()),
            Err(e) => self.fail_with(&format!("driver: {e}")),
        }
    }

    // ---- op bodies -------------------------------------------------------

    fn op_send_input(&self, cmd: &str, count: u32, delay_ms: u64) -> OpResult<()> {
        for i in 0..count.max(1) {
            self.check_suspension()?;
            self.send_cmd(cmd)?;
            if i + 1 < count && delay_ms > 0 {
                self.sleep(Duration::from_millis(delay_ms))?;
            }
        }
        Ok(())
    }

    fn op_send_text(&self, text: &str, text_layout: Layout, delay_ms: u64) -> OpResult<()> {
        let text = match self.ctx.interpolate(text) {
            Ok(t) => t,
            Err(e) => return self.fail_with(&e.to_string()),
        };
        let ru = match text_layout {
            Layout::En => {
                self.send_cmd("lang_en")?;
                false
            }
            Layout::Ru => {
                self.send_cmd("lang_ru")?;
                true
            }
            Layout::Toggle => {
                self.send_cmd("lang_toggle")?;
                false
            }
            Layout::Raw => false,
        };
        let total = text.chars().count();
        for (i, c) in text.chars().enumerate() {
            self.check_suspension()?;
            let key = layout::key_for(c, ru);
            self.send_cmd(&key.to_string())?;
            if i + 1 < total && delay_ms > 0 {
                self.sleep(Duration::from_millis(delay_ms))?;
            }
        }
        Ok(())
    }

    fn op_wait(
        &self,
        zone: &str,
        tpl: &TemplateRef,
        timeout_ms: u64,
        thr: f32,
        optional: bool,
        click: bool,
    ) -> OpResult<()> {
        let rect = self.resolve_zone(zone)?;
        let path = self.template_path(tpl)?;
        match self.poll_find(rect, &path, thr, timeout_ms) {
            Ok(Some(m)) => {
                debug!(zone, score = m.score, "template hit");
                if click {
                    self.click(m)?;
                }
                Ok(())
            }
            Ok(None) if optional => Ok(()),
            Ok(None) => self.fail_with(&format!(
                "template did not appear in '{zone}' within {timeout_ms}ms"
            )),
            Err(r) if optional && r == StepResult::Fail => Ok(()),
            Err(r) => Err(r),
        }
    }

    fn op_click_any(
        &self,
        zones: &[String],
        tpl: &TemplateRef,
        timeout_ms: u64,
        thr: f32,
    ) -> OpResult<()> {
        let path = self.template_path(tpl)?;
        let mut rects = Vec::with_capacity(zones.len());
        for zone in zones {
            rects.push((zone.as_str(), self.resolve_zone(zone)?));
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            self.check_suspension()?;
            // Zones are scanned in declaration order, so on a simultaneous
            // match the smallest zone index wins.
            for (zone, rect) in &rects {
                match self.find_once(*rect, &path, thr) {
                    Ok(Some(m)) => {
                        debug!(zone, score = m.score, "click_any hit");
                        self.click(m)?;
                        return Ok(());
                    }
                    Ok(None) => {}
                    Err(e) => return self.fail_with(&e.to_string()),
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return self.fail_with(&format!(
                    "template did not appear in any of {} zones within {timeout_ms}ms",
                    rects.len()
                ));
            }
            self.sleep(self.defaults.poll_interval.min(deadline - now))?;
        }
    }

    fn op_while_visible_send(
        &self,
        zone: &str,
        tpl: &TemplateRef,
        cmd: &str,
        probe_interval_ms: u64,
        timeout_ms: u64,
    ) -> OpResult<()> {
        let rect = self.resolve_zone(zone)?;
        let path = self.template_path(tpl)?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            self.check_suspension()?;
            match self.find_once(rect, &path, self.defaults.threshold) {
                Ok(Some(_)) => self.send_cmd(cmd)?,
                Ok(None) => return Ok(()),
                Err(e) => return self.fail_with(&e.to_string()),
            }
            let now = Instant::now();
            if now >= deadline {
                return self.fail_with(&format!(
                    "template in '{zone}' still visible after {timeout_ms}ms"
                ));
            }
            self.sleep(Duration::from_millis(probe_interval_ms).min(deadline - now))?;
        }
    }

    fn op_dashboard_is_locked(
        &self,
        zone: &str,
        tpl: &TemplateRef,
        timeout_ms: u64,
        probe_interval_ms: u64,
    ) -> OpResult<()> {
        let rect = self.resolve_zone(zone)?;
        let path = self.template_path(tpl)?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            self.check_suspension()?;
            if !(self.alive)() {
                return self.fail_with("player died while waiting for the dashboard");
            }
            match self.find_once(rect, &path, self.defaults.threshold) {
                Ok(None) => return Ok(()),
                Ok(Some(_)) => {
                    // Periodic left-click probes nudge the stuck overlay.
                    if let Err(e) = self.input.left_click() {
                        return self.fail_with(&format!("driver: {e}"));
                    }
                }
                Err(e) => return self.fail_with(&e.to_string()),
            }
            let now = Instant::now();
            if now >= deadline {
                return self.fail_with(&format!("dashboard still locked after {timeout_ms}ms"));
            }
            self.sleep(Duration::from_millis(probe_interval_ms).min(deadline - now))?;
        }
    }

    fn op_click_destination(
        &self,
        zone: &str,
        timeout_ms: u64,
        thr: f32,
        with_location: bool,
    ) -> OpResult<()> {
        let Some(dest) = &self.ctx.destination else {
            return self.fail_with("no destination selected");
        };
        let parts: Vec<String> = if with_location {
            vec![
                "teleport".into(),
                dest.village.clone(),
                dest.location.clone(),
            ]
        } else {
            vec!["teleport".into(), dest.village.clone()]
        };
        self.op_wait(
            zone,
            &TemplateRef::Parts(parts),
            timeout_ms,
            thr,
            false,
            true,
        )
    }

    fn op_enter_pincode(
        &self,
        zone: &str,
        digit_delay_ms: u64,
        timeout_ms: u64,
    ) -> OpResult<()> {
        let pin = match self.ctx.extras.get("account_pin") {
            Some(p) => p.clone(),
            None => return self.fail_with("no account_pin in context"),
        };
        let rect = self.resolve_zone(zone)?;
        let digits = pin.chars().count();
        for (i, digit) in pin.chars().enumerate() {
            self.check_suspension()?;
            if !digit.is_ascii_digit() || digit == '0' {
                return self.fail_with(&format!("pincode digit {i} has no template (1-9 only)"));
            }
            let key = format!("num{digit}");
            let tpl = if self.ctx.templates.contains_key(&key) {
                TemplateRef::Key(key.clone())
            } else {
                TemplateRef::Parts(vec!["pincode".into(), key.clone()])
            };
            let path = self.template_path(&tpl)?;
            match self.poll_find(rect, &path, self.defaults.threshold, timeout_ms)? {
                Some(m) => self.click(m)?,
                // A missing digit aborts before any further clicks.
                None => return self.fail_with(&format!("pincode digit '{key}' not found")),
            }
            if i + 1 < digits {
                self.sleep(Duration::from_millis(digit_delay_ms))?;
            }
        }
        Ok(())
    }

    fn dispatch(&self, step: &Step) -> OpResult<()> {
        match &step.op {
            Op::Sleep { ms } => self.sleep(Duration::from_millis(*ms)),
            Op::SendInput {
                cmd,
                count,
                delay_ms,
            } => self.op_send_input(cmd, *count, *delay_ms),
            Op::SendText {
                text,
                layout,
                delay_ms,
            } => self.op_send_text(text, *layout, *delay_ms),
            Op::Wait {
                zone,
                tpl,
                timeout_ms,
                thr,
                optional,
            } => self.op_wait(zone, tpl, *timeout_ms, *thr, *optional, false),
            Op::Click {
                zone,
                tpl,
                timeout_ms,
                thr,
                optional,
            } => self.op_wait(zone, tpl, *timeout_ms, *thr, *optional, true),
            Op::ClickAny {
                zones,
                tpl,
                timeout_ms,
                thr,
            } => self.op_click_any(zones, tpl, *timeout_ms, *thr),
            Op::WhileVisibleSend {
                zone,
                tpl,
                cmd,
                probe_interval_ms,
                timeout_ms,
            } => self.op_while_visible_send(zone, tpl, cmd, *probe_interval_ms, *timeout_ms),
            Op::DashboardIsLocked {
                zone,
                tpl,
                timeout_ms,
                probe_interval_ms,
            } => self.op_dashboard_is_locked(zone, tpl, *timeout_ms, *probe_interval_ms),
            Op::ClickVillage {
                zone,
                timeout_ms,
                thr,
            } => self.op_click_destination(zone, *timeout_ms, *thr, false),
            Op::ClickLocation {
                zone,
                timeout_ms,
                thr,
            } => self.op_click_destination(zone, *timeout_ms, *thr, true),
            Op::EnterPincode {
                zone,
                digit_delay_ms,
                timeout_ms,
            } => self.op_enter_pincode(zone, *digit_delay_ms, *timeout_ms),
        }
    }
}

impl StepRunner for Executor<'_> {
    fn run_step(&mut self, step: &Step) -> StepResult {
        match self.dispatch(step) {
            Ok(()) => StepResult::Ok,
            Err(outcome) => {
                if outcome == StepResult::Fail {
                    warn!(op = step.op.name(), "step failed");
                }
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(extras: &[(&str, &str)]) -> FlowContext {
        FlowContext {
            server: "asterios".into(),
            lang: Lang::En,
            zones: HashMap::new(),
            templates: HashMap::new(),
            extras: extras
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            destination: None,
        }
    }

    #[test]
    fn interpolation_replaces_known_placeholders() {
        let ctx = ctx_with(&[("account_login", "ragnar"), ("mode_key", "buffer_mode_mage")]);
        assert_eq!(ctx.interpolate("{account_login}").unwrap(), "ragnar");
        assert_eq!(
            ctx.interpolate("icons/{mode_key}/on").unwrap(),
            "icons/buffer_mode_mage/on"
        );
        assert_eq!(ctx.interpolate("plain").unwrap(), "plain");
    }

    #[test]
    fn interpolation_rejects_unknown_placeholder() {
        let ctx = ctx_with(&[]);
        assert!(ctx.interpolate("{account_login}").is_err());
        assert!(ctx.interpolate("{unbalanced").is_err());
    }
}
