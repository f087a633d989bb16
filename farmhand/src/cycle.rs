//! The cycle orchestrator: buff → macros → recheck → teleport → row.
//!
//! The orchestrator itself is single-threaded cooperative: every entry
//! point runs to completion and re-arms itself through the [`Scheduler`].
//! Watcher edges and worker threads only touch [`CycleState`] under its
//! mutex and then re-arm the orchestrator; flows run on whichever thread
//! called in, ToVillage and account restarts on short-lived workers.

use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::charged::{Charged, ChargedCheck};
use crate::config::OrchestratorConfig;
use crate::exec::{always_alive, AliveFn};
use crate::flow::sleep_checked;
use crate::ports::{AbortFlag, Destination, Extras, Lang, Scheduler, StatusSink};
use crate::restart::RestartManager;
use crate::runner::FlowRunner;
use crate::watcher::StateListener;

/// What the user has toggled and selected; read live so UI changes take
/// effect on the next gated op.
pub trait CyclePorts: Send + Sync {
    fn server(&self) -> String;
    fn lang(&self) -> Lang;
    fn extras(&self) -> Extras;
    fn destination(&self) -> Option<Destination>;

    fn buff_enabled(&self) -> bool;
    fn macros_enabled(&self) -> bool;
    /// Run macros even when the buff step did not succeed.
    fn macros_run_always(&self) -> bool;
    fn tp_enabled(&self) -> bool;
    /// Press "to village" automatically after death.
    fn raise_dead_enabled(&self) -> bool;
    /// An external respawn dialog wants the first word on death.
    fn respawn_ui_enabled(&self) -> bool;
}

/// How a cycle reached its success mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDone {
    TpDisabled,
    TpOnly,
    PostTpRow,
}

/// Orchestrator-owned shared state; one lock, never held across I/O.
#[derive(Debug)]
pub struct CycleState {
    /// `None` = unknown (before the first watcher sample or after a
    /// restart), otherwise the last watcher edge.
    pub alive: Option<bool>,
    pub charged: Charged,
    pub buff_was_success: bool,
    pub tp_success: bool,
    pub flow_interrupted: bool,
    pub done: Option<CycleDone>,
    pub awaiting_alive_restart: bool,
    pub fail_streak: u32,
    pub revive_decided: bool,
    cycle_pending: bool,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            alive: None,
            charged: Charged::Unknown,
            buff_was_success: false,
            tp_success: false,
            flow_interrupted: false,
            done: None,
            awaiting_alive_restart: false,
            fail_streak: 0,
            revive_decided: false,
            cycle_pending: false,
        }
    }
}

pub struct CycleOrchestrator {
    self_ref: Weak<CycleOrchestrator>,
    state: Mutex<CycleState>,
    ports: Arc<dyn CyclePorts>,
    runner: Arc<FlowRunner>,
    charged: Arc<ChargedCheck>,
    restart: Arc<RestartManager>,
    sched: Arc<dyn Scheduler>,
    status: Arc<dyn StatusSink>,
    abort: AbortFlag,
    config: OrchestratorConfig,
}

impl CycleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ports: Arc<dyn CyclePorts>,
        runner: Arc<FlowRunner>,
        charged: Arc<ChargedCheck>,
        restart: Arc<RestartManager>,
        sched: Arc<dyn Scheduler>,
        status: Arc<dyn StatusSink>,
        abort: AbortFlag,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            state: Mutex::new(CycleState::default()),
            ports,
            runner,
            charged,
            restart,
            sched,
            status,
            abort,
            config,
        })
    }

    /// Snapshot for UIs and tests; clones under the lock, no I/O.
    pub fn snapshot(&self) -> CycleState {
        let st = self.state.lock().unwrap();
        CycleState {
            alive: st.alive,
            charged: st.charged,
            buff_was_success: st.buff_was_success,
            tp_success: st.tp_success,
            flow_interrupted: st.flow_interrupted,
            done: st.done,
            awaiting_alive_restart: st.awaiting_alive_restart,
            fail_streak: st.fail_streak,
            revive_decided: st.revive_decided,
            cycle_pending: st.cycle_pending,
        }
    }

    /// The external respawn dialog reports its decision.
    pub fn set_revive_decided(&self, decided: bool) {
        self.state.lock().unwrap().revive_decided = decided;
    }

    /// Raise the abort flag; running flows stop at their next suspension
    /// point.
    pub fn request_abort(&self) {
        self.abort.raise();
    }

    fn arc(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    /// Alive predicate handed to flows: dead short-circuits ops, unknown
    /// is optimistically alive.
    fn alive_fn(&self) -> AliveFn {
        let weak = self.self_ref.clone();
        Arc::new(move || {
            weak.upgrade()
                .map(|o| o.state.lock().unwrap().alive != Some(false))
                .unwrap_or(true)
        })
    }

    /// Arm a `run_cycle` call unless one is already pending.
    pub fn schedule_cycle(&self, delay: Duration) {
        let Some(this) = self.arc() else { return };
        {
            let mut st = self.state.lock().unwrap();
            if st.cycle_pending {
                return;
            }
            st.cycle_pending = true;
        }
        self.sched
            .schedule(delay, Box::new(move || this.run_cycle()));
    }

    // ---- watcher edges ---------------------------------------------------

    fn handle_dead(&self) {
        info!("dead edge");
        {
            let mut st = self.state.lock().unwrap();
            st.alive = Some(false);
            st.charged = Charged::Unknown;
            st.tp_success = false;
            st.done = None;
            st.revive_decided = false;
        }
        self.charged.invalidate();

        if self.ports.raise_dead_enabled() {
            self.spawn_to_village();
        }
    }

    fn handle_alive(&self) {
        info!("alive edge");
        {
            let mut st = self.state.lock().unwrap();
            st.alive = Some(true);
            st.awaiting_alive_restart = false;
        }
        // Non-forced: a fresh cached answer is good enough right after a
        // respawn.
        let charged = self.charged.is_charged();
        self.state.lock().unwrap().charged = charged;
        self.schedule_cycle(Duration::ZERO);
    }

    /// Run ToVillage on a worker so the watcher thread is never blocked
    /// by a flow.
    fn spawn_to_village(&self) {
        let Some(this) = self.arc() else { return };
        thread::Builder::new()
            .name("to-village".into())
            .spawn(move || {
                let result = this.runner.run(
                    &this.ports.server(),
                    this.ports.lang(),
                    "to_village",
                    this.ports.extras(),
                    None,
                    &this.abort,
                    always_alive(),
                );
                if result.is_completed() {
                    this.state.lock().unwrap().awaiting_alive_restart = true;
                } else {
                    this.reset_and_run("to_village_failed");
                }
            })
            .expect("failed to spawn to-village worker");
    }

    // ---- the cycle -------------------------------------------------------

    /// One orchestrator tick. Gates first, then the five ordered steps;
    /// every early exit either marked the cycle complete, escalated, or
    /// re-armed the scheduler.
    pub fn run_cycle(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.cycle_pending = false;

            if st.done.is_some() && !st.flow_interrupted {
                debug!("cycle already complete; waiting for the next trigger");
                return;
            }
            if st.alive != Some(true) {
                drop(st);
                self.schedule_cycle(self.config.dead_retry);
                return;
            }
            if self.ports.respawn_ui_enabled() && !st.revive_decided {
                drop(st);
                self.schedule_cycle(self.config.revive_retry);
                return;
            }
            st.flow_interrupted = false;
        }

        if !self.buff_if_needed() {
            return;
        }
        if !self.macros_after_buff() {
            return;
        }
        self.recheck_charged();
        if !self.tp_if_ready() {
            return;
        }
        self.post_tp_row();
    }

    /// Returns `false` when the cycle should stop here.
    fn buff_if_needed(&self) -> bool {
        let (alive, charged) = {
            let st = self.state.lock().unwrap();
            (st.alive, st.charged)
        };
        if alive != Some(true) {
            return false;
        }
        if !self.ports.buff_enabled() || charged == Charged::Yes {
            return true;
        }

        let result = self.runner.run(
            &self.ports.server(),
            self.ports.lang(),
            "buff",
            self.ports.extras(),
            None,
            &self.abort,
            self.alive_fn(),
        );
        self.state.lock().unwrap().buff_was_success = result.is_completed();
        true
    }

    fn macros_after_buff(&self) -> bool {
        if !self.ports.macros_enabled() {
            return true;
        }
        let buff_was_success = self.state.lock().unwrap().buff_was_success;
        if !(buff_was_success || self.ports.macros_run_always()) {
            return true;
        }

        let result = self.runner.run(
            &self.ports.server(),
            self.ports.lang(),
            "macros",
            self.ports.extras(),
            None,
            &self.abort,
            self.alive_fn(),
        );
        if result.is_completed() {
            // Leave the macros running for their configured window.
            sleep_checked(self.config.macro_duration, &self.abort);
        }
        true
    }

    fn recheck_charged(&self) {
        let charged = self.charged.force_check();
        self.state.lock().unwrap().charged = charged;
    }

    /// Returns `false` when the cycle ended here (complete or escalated).
    fn tp_if_ready(&self) -> bool {
        if !self.ports.tp_enabled() {
            self.mark_done(CycleDone::TpDisabled);
            return false;
        }
        let (alive, charged) = {
            let st = self.state.lock().unwrap();
            (st.alive, st.charged)
        };
        if alive != Some(true) {
            debug!("died before teleport; leaving the cycle to the dead path");
            return false;
        }
        if charged != Charged::Yes {
            self.reset_and_run("not_charged_for_tp");
            return false;
        }
        let Some(destination) = self.ports.destination() else {
            // Nothing selected to teleport to; treat like tp being off.
            self.mark_done(CycleDone::TpDisabled);
            return false;
        };

        let result = self.runner.run(
            &self.ports.server(),
            self.ports.lang(),
            "teleport",
            self.ports.extras(),
            Some(destination.clone()),
            &self.abort,
            self.alive_fn(),
        );
        if !result.is_completed() {
            self.reset_and_run("tp_failed");
            return false;
        }
        self.state.lock().unwrap().tp_success = true;

        if destination.row.is_none() {
            self.mark_done(CycleDone::TpOnly);
            return false;
        }
        true
    }

    fn post_tp_row(&self) {
        let tp_success = self.state.lock().unwrap().tp_success;
        if !tp_success {
            return;
        }
        let Some(destination) = self.ports.destination() else {
            self.mark_done(CycleDone::TpOnly);
            return;
        };
        let Some(row_id) = destination.row.clone() else {
            self.mark_done(CycleDone::TpOnly);
            return;
        };

        self.status.status(&format!("[rows] running {row_id}"), None);
        let result = self.runner.run_row(
            &self.ports.server(),
            self.ports.lang(),
            &destination,
            &row_id,
            self.ports.extras(),
            &self.abort,
            self.alive_fn(),
        );
        if result.is_completed() {
            self.mark_done(CycleDone::PostTpRow);
        } else {
            self.reset_and_run("row_failed");
        }
    }

    fn mark_done(&self, done: CycleDone) {
        {
            let mut st = self.state.lock().unwrap();
            st.done = Some(done);
            st.flow_interrupted = false;
            st.fail_streak = 0;
        }
        self.status
            .status(&format!("[flow] cycle complete ({done:?})"), Some(true));
    }

    // ---- recovery --------------------------------------------------------

    /// Soft reset, escalating to a full account restart when the fail
    /// streak reaches its budget.
    pub fn reset_and_run(&self, reason: &str) {
        self.status.status(&format!("[reset] {reason}"), Some(false));
        let streak = {
            let mut st = self.state.lock().unwrap();
            st.fail_streak += 1;
            st.fail_streak
        };

        if streak >= self.config.max_resets {
            self.escalate_restart(streak);
            return;
        }

        self.restart.run_dashboard_reset(
            &self.ports.server(),
            self.ports.lang(),
            self.ports.extras(),
            &self.abort,
        );

        let still_dead = self.state.lock().unwrap().alive == Some(false);
        if still_dead && self.ports.raise_dead_enabled() {
            self.spawn_to_village();
        }

        {
            let mut st = self.state.lock().unwrap();
            st.tp_success = false;
            st.buff_was_success = false;
            st.flow_interrupted = true;
        }
        self.schedule_cycle(Duration::ZERO);
    }

    fn escalate_restart(&self, streak: u32) {
        self.status.status(
            &format!("[restart] fail streak {streak}, restarting account"),
            Some(false),
        );
        let clear_alive = || {
            self.state.lock().unwrap().alive = None;
        };
        let on_progress = |attempt: u32, max: u32| {
            debug!(attempt, max, "restart progress");
        };
        let result = self.restart.restart_account(
            &self.ports.server(),
            self.ports.lang(),
            self.ports.extras(),
            &self.abort,
            &clear_alive,
            &on_progress,
        );
        match result {
            Ok(()) => {
                {
                    let mut st = self.state.lock().unwrap();
                    st.fail_streak = 0;
                    st.done = None;
                    st.flow_interrupted = false;
                    st.buff_was_success = false;
                    st.tp_success = false;
                    st.charged = Charged::Unknown;
                    st.awaiting_alive_restart = true;
                }
                self.schedule_cycle(Duration::ZERO);
            }
            Err(e) => {
                // Terminal: the cycle stays quiescent until the user acts.
                warn!("{e}");
                self.status.status(&format!("[restart] {e}"), Some(false));
            }
        }
    }
}

impl StateListener for CycleOrchestrator {
    fn on_dead(&self) {
        self.handle_dead();
    }

    fn on_alive(&self) {
        self.handle_alive();
    }
}
