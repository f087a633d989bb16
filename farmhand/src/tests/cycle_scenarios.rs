//! End-to-end orchestrator scenarios over in-memory doubles.
//!
//! The manual scheduler makes the cooperative ticks explicit: a test
//! fires watcher edges, then drains queued cycle runs one by one and
//! inspects the state between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::mocks::{
    destination, extras, CollectStatus, FakeInput, FakeResolver, FakeWindow, ALIVE_PX, DEAD_PX,
};
use crate::charged::{Charged, ChargedCheck};
use crate::config::{ChargedConfig, FlowDefaults, OrchestratorConfig, RestartConfig, WatcherConfig};
use crate::cycle::{CycleDone, CycleOrchestrator, CyclePorts};
use crate::ports::{AbortFlag, Destination, Extras, Lang};
use crate::restart::RestartManager;
use crate::runner::FlowRunner;
use crate::tests::mocks::ManualScheduler;
use crate::watcher::{HpPalette, StateListener, StateWatcher};
use crate::zone::Zone;

struct Noop;
impl StateListener for Noop {}

struct TogglePorts {
    buff: AtomicBool,
    macros_on: AtomicBool,
    macros_always: AtomicBool,
    tp: AtomicBool,
    raise_dead: AtomicBool,
    respawn_ui: AtomicBool,
    dest: Mutex<Option<Destination>>,
}

impl TogglePorts {
    fn new() -> Self {
        Self {
            buff: AtomicBool::new(false),
            macros_on: AtomicBool::new(false),
            macros_always: AtomicBool::new(false),
            tp: AtomicBool::new(false),
            raise_dead: AtomicBool::new(false),
            respawn_ui: AtomicBool::new(false),
            dest: Mutex::new(None),
        }
    }
}

impl CyclePorts for TogglePorts {
    fn server(&self) -> String {
        "asterios".into()
    }

    fn lang(&self) -> Lang {
        Lang::En
    }

    fn extras(&self) -> Extras {
        extras()
    }

    fn destination(&self) -> Option<Destination> {
        self.dest.lock().unwrap().clone()
    }

    fn buff_enabled(&self) -> bool {
        self.buff.load(Ordering::SeqCst)
    }

    fn macros_enabled(&self) -> bool {
        self.macros_on.load(Ordering::SeqCst)
    }

    fn macros_run_always(&self) -> bool {
        self.macros_always.load(Ordering::SeqCst)
    }

    fn tp_enabled(&self) -> bool {
        self.tp.load(Ordering::SeqCst)
    }

    fn raise_dead_enabled(&self) -> bool {
        self.raise_dead.load(Ordering::SeqCst)
    }

    fn respawn_ui_enabled(&self) -> bool {
        self.respawn_ui.load(Ordering::SeqCst)
    }
}

struct Rig {
    window: Arc<FakeWindow>,
    input: Arc<FakeInput>,
    status: Arc<CollectStatus>,
    ports: Arc<TogglePorts>,
    sched: Arc<ManualScheduler>,
    orch: Arc<CycleOrchestrator>,
}

fn rig(config: OrchestratorConfig) -> Rig {
    let window = Arc::new(FakeWindow::new());
    let input = Arc::new(FakeInput::new());
    let status = Arc::new(CollectStatus::new());
    let ports = Arc::new(TogglePorts::new());
    let sched = Arc::new(ManualScheduler::new());

    let runner = Arc::new(FlowRunner::new(
        window.clone(),
        input.clone(),
        Arc::new(FakeResolver),
        status.clone(),
        FlowDefaults {
            threshold: 0.8,
            poll_interval: Duration::from_millis(5),
        },
    ));
    let charged = Arc::new(ChargedCheck::new(
        window.clone(),
        Zone::Full,
        std::path::PathBuf::from("asterios/en/buffs/charged.png"),
        0.8,
        ChargedConfig {
            cache_ttl: Duration::from_millis(50),
        },
    ));
    let watcher = Arc::new(StateWatcher::new(
        window.clone(),
        Arc::new(Noop),
        HpPalette {
            alive: vec![ALIVE_PX],
            dead: vec![DEAD_PX],
            tolerance: 10,
        },
        Zone::Full,
        WatcherConfig {
            poll_interval: Duration::from_millis(10),
            zero_hp_threshold: 0.01,
        },
    ));
    let restart = Arc::new(RestartManager::new(
        runner.clone(),
        watcher,
        status.clone(),
        RestartConfig {
            max_restart_attempts: 1,
            retry_delay: Duration::from_millis(10),
        },
    ));

    let orch = CycleOrchestrator::new(
        ports.clone(),
        runner,
        charged,
        restart,
        sched.clone(),
        status.clone(),
        AbortFlag::new(),
        config,
    );
    Rig {
        window,
        input,
        status,
        ports,
        sched,
        orch,
    }
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_resets: 3,
        macro_duration: Duration::from_millis(10),
        dead_retry: Duration::from_millis(20),
        revive_retry: Duration::from_millis(5),
    }
}

#[test]
fn cycle_completes_when_teleport_is_disabled() {
    let rig = rig(fast_config());

    rig.orch.on_alive();
    assert_eq!(rig.sched.pending(), 1);
    assert!(rig.sched.run_next());

    let state = rig.orch.snapshot();
    assert_eq!(state.done, Some(CycleDone::TpDisabled));
    assert_eq!(state.fail_streak, 0);
    assert!(rig.status.contains("cycle complete"));

    // A complete cycle with no interruption stays complete on re-run.
    rig.orch.schedule_cycle(Duration::ZERO);
    assert!(rig.sched.run_next());
    assert_eq!(rig.sched.pending(), 0);
}

#[test]
fn full_cycle_buffs_macros_and_teleports() {
    let rig = rig(fast_config());
    rig.ports.buff.store(true, Ordering::SeqCst);
    rig.ports.macros_on.store(true, Ordering::SeqCst);
    rig.ports.tp.store(true, Ordering::SeqCst);
    *rig.ports.dest.lock().unwrap() = Some(destination(None));

    // The buff icon is dark when the player comes back up.
    rig.orch.on_alive();
    assert_eq!(rig.orch.snapshot().charged, Charged::No);

    for pattern in [
        "dashboard/init",
        "dashboard/buffer_mode_mage",
        "dashboard/buff_button",
        "buffs/charged",
        "dashboard/teleport_tab",
        "teleport/rune",
        "teleport/confirm",
        "misc/loading",
    ] {
        rig.window.show(pattern);
    }

    assert!(rig.sched.run_next());

    let state = rig.orch.snapshot();
    assert!(state.buff_was_success);
    assert!(state.tp_success);
    assert_eq!(state.charged, Charged::Yes);
    assert_eq!(state.done, Some(CycleDone::TpOnly));

    assert!(rig.status.contains("[flow] buff: ok"));
    assert!(rig.status.contains("[flow] macros: ok"));
    assert!(rig.status.contains("[flow] teleport: ok"));

    let sent = rig.input.sent_commands();
    assert!(sent.contains(&"7".to_string()));
    assert!(sent.contains(&"8".to_string()));
}

#[test]
fn death_spawns_to_village_and_alive_resumes() {
    let rig = rig(fast_config());
    rig.ports.raise_dead.store(true, Ordering::SeqCst);
    rig.window.show("respawn/to_village");
    rig.window.show("misc/loading");

    rig.orch.on_dead();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !rig.orch.snapshot().awaiting_alive_restart {
        assert!(Instant::now() < deadline, "to_village flow never finished");
        std::thread::sleep(Duration::from_millis(10));
    }

    let state = rig.orch.snapshot();
    assert_eq!(state.alive, Some(false));
    assert_eq!(state.charged, Charged::Unknown);
    assert!(!state.tp_success);
    assert_eq!(state.done, None);
    assert!(!rig.input.click_points().is_empty());

    rig.orch.on_alive();
    let state = rig.orch.snapshot();
    assert_eq!(state.alive, Some(true));
    assert!(!state.awaiting_alive_restart);
    assert_eq!(rig.sched.pending(), 1);
}

#[test]
fn missing_charge_triggers_soft_resets() {
    let rig = rig(fast_config());
    rig.ports.tp.store(true, Ordering::SeqCst);
    *rig.ports.dest.lock().unwrap() = Some(destination(None));

    rig.orch.on_alive();
    assert!(rig.sched.run_next());
    assert_eq!(rig.orch.snapshot().fail_streak, 1);
    assert!(rig.status.contains("[reset] not_charged_for_tp"));

    // The reset re-armed the cycle; a second pass resets again.
    assert!(rig.sched.run_next());
    assert_eq!(rig.orch.snapshot().fail_streak, 2);
    assert_eq!(rig.status.count_containing("[reset] not_charged_for_tp"), 2);
    assert!(rig.orch.snapshot().flow_interrupted);
}

#[test]
fn completed_cycle_clears_the_fail_streak() {
    let rig = rig(fast_config());
    rig.ports.tp.store(true, Ordering::SeqCst);
    *rig.ports.dest.lock().unwrap() = Some(destination(None));

    rig.orch.on_alive();
    assert!(rig.sched.run_next());
    assert!(rig.sched.run_next());
    assert_eq!(rig.orch.snapshot().fail_streak, 2);

    // The operator turns teleport off; the next pass completes cleanly.
    rig.ports.tp.store(false, Ordering::SeqCst);
    assert!(rig.sched.run_next());

    let state = rig.orch.snapshot();
    assert_eq!(state.done, Some(CycleDone::TpDisabled));
    assert_eq!(state.fail_streak, 0);
}

#[test]
fn fail_streak_escalates_to_account_restart() {
    let mut config = fast_config();
    config.max_resets = 1;
    let rig = rig(config);
    rig.ports.tp.store(true, Ordering::SeqCst);
    *rig.ports.dest.lock().unwrap() = Some(destination(None));
    // A dead serial port makes the login flow fail fast.
    rig.input.fail.store(true, Ordering::SeqCst);

    rig.orch.on_alive();
    assert!(rig.sched.run_next());

    assert!(rig.status.contains("restarting account"));
    assert!(rig.status.contains("giving up after 1 attempts"));
    let state = rig.orch.snapshot();
    assert_eq!(state.alive, None);
    // Quiescent: nothing re-armed until the operator intervenes.
    assert_eq!(rig.sched.pending(), 0);
}

#[test]
fn missing_destination_is_treated_as_teleport_off() {
    let rig = rig(fast_config());
    rig.ports.tp.store(true, Ordering::SeqCst);
    rig.window.show("buffs/charged");

    rig.orch.on_alive();
    assert!(rig.sched.run_next());
    assert_eq!(rig.orch.snapshot().done, Some(CycleDone::TpDisabled));
}

#[test]
fn teleport_with_row_runs_the_row_flow() {
    let rig = rig(fast_config());
    rig.ports.tp.store(true, Ordering::SeqCst);
    *rig.ports.dest.lock().unwrap() = Some(destination(Some("primeval_1")));
    for pattern in [
        "buffs/charged",
        "dashboard/init",
        "dashboard/teleport_tab",
        "teleport/rune",
        "teleport/confirm",
        "misc/loading",
        "rows/primeval/anchor",
    ] {
        rig.window.show(pattern);
    }

    rig.orch.on_alive();
    assert!(rig.sched.run_next());

    let state = rig.orch.snapshot();
    assert_eq!(state.done, Some(CycleDone::PostTpRow));
    assert!(rig.status.contains("[rows] running primeval_1"));
    assert!(rig.status.contains("[flow] primeval_1: ok"));
    let sent = rig.input.sent_commands();
    assert_eq!(sent.last().map(String::as_str), Some("space"));
}

#[test]
fn undecided_respawn_defers_the_cycle() {
    let rig = rig(fast_config());
    rig.ports.respawn_ui.store(true, Ordering::SeqCst);

    rig.orch.on_alive();
    assert!(rig.sched.run_next());
    // Deferred, not run: the revive decision has not been made yet.
    assert_eq!(rig.orch.snapshot().done, None);
    assert_eq!(rig.sched.pending(), 1);

    rig.orch.set_revive_decided(true);
    assert!(rig.sched.run_next());
    assert_eq!(rig.orch.snapshot().done, Some(CycleDone::TpDisabled));
}

#[test]
fn cycle_waits_while_player_state_is_unknown() {
    let rig = rig(fast_config());

    rig.orch.schedule_cycle(Duration::ZERO);
    assert!(rig.sched.run_next());
    // No alive edge yet: the tick re-arms itself and does nothing else.
    assert_eq!(rig.orch.snapshot().done, None);
    assert_eq!(rig.sched.pending(), 1);
}

#[test]
fn duplicate_schedule_requests_coalesce() {
    let rig = rig(fast_config());
    rig.orch.schedule_cycle(Duration::ZERO);
    rig.orch.schedule_cycle(Duration::ZERO);
    assert_eq!(rig.sched.pending(), 1);
}
