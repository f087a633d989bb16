//! Account restart recovery: attempt budget and watcher quiescing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::mocks::{extras, CollectStatus, FakeInput, FakeResolver, FakeWindow, ALIVE_PX, DEAD_PX};
use crate::config::{FlowDefaults, RestartConfig, WatcherConfig};
use crate::errors::AgentError;
use crate::ports::{AbortFlag, Lang};
use crate::restart::RestartManager;
use crate::runner::FlowRunner;
use crate::watcher::{HpPalette, StateListener, StateWatcher};
use crate::zone::Zone;

struct Noop;
impl StateListener for Noop {}

struct Rig {
    window: Arc<FakeWindow>,
    input: Arc<FakeInput>,
    status: Arc<CollectStatus>,
    watcher: Arc<StateWatcher>,
    manager: RestartManager,
}

fn rig(max_attempts: u32) -> Rig {
    let window = Arc::new(FakeWindow::new());
    let input = Arc::new(FakeInput::new());
    let status = Arc::new(CollectStatus::new());
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
    let manager = RestartManager::new(
        runner,
        watcher.clone(),
        status.clone(),
        RestartConfig {
            max_restart_attempts: max_attempts,
            retry_delay: Duration::from_millis(10),
        },
    );
    Rig {
        window,
        input,
        status,
        watcher,
        manager,
    }
}

/// Everything the login flow looks for is on screen.
fn show_login_screens(window: &FakeWindow) {
    for pattern in [
        "login/logout_confirm",
        "login/login_input",
        "pincode/title",
        "pincode/num",
        "login/server_entry",
        "login/start_button",
        "misc/loading",
    ] {
        window.show(pattern);
    }
}

#[test]
fn successful_restart_restores_the_watcher() {
    let rig = rig(3);
    show_login_screens(&rig.window);
    rig.watcher.start();

    let cleared = AtomicBool::new(false);
    let result = rig.manager.restart_account(
        "asterios",
        Lang::En,
        extras(),
        &AbortFlag::new(),
        &|| cleared.store(true, Ordering::SeqCst),
        &|_, _| {},
    );

    assert!(result.is_ok());
    assert!(cleared.load(Ordering::SeqCst));
    assert!(rig.watcher.is_running());
    assert!(rig.status.contains("logged back in"));
    // The typed credentials went through the driver.
    assert!(rig
        .input
        .sent_commands()
        .iter()
        .any(|cmd| cmd == "lang_en"));
    rig.watcher.stop();
}

#[test]
fn exhausted_attempts_leave_the_watcher_stopped() {
    let rig = rig(2);
    // A dead serial port fails every flow step immediately.
    rig.input.fail.store(true, Ordering::SeqCst);
    rig.watcher.start();

    let cleared = AtomicBool::new(false);
    let result = rig.manager.restart_account(
        "asterios",
        Lang::En,
        extras(),
        &AbortFlag::new(),
        &|| cleared.store(true, Ordering::SeqCst),
        &|_, _| {},
    );

    assert!(matches!(
        result,
        Err(AgentError::RestartExhausted { attempts: 2 })
    ));
    assert!(cleared.load(Ordering::SeqCst));
    assert!(!rig.watcher.is_running());
    assert_eq!(rig.status.count_containing("[restart] attempt"), 2);
    assert!(rig.status.contains("giving up after 2 attempts"));
}

#[test]
fn attempt_progress_is_reported() {
    let rig = rig(2);
    rig.input.fail.store(true, Ordering::SeqCst);

    let seen = std::sync::Mutex::new(Vec::new());
    let _ = rig.manager.restart_account(
        "asterios",
        Lang::En,
        extras(),
        &AbortFlag::new(),
        &|| {},
        &|attempt, max| seen.lock().unwrap().push((attempt, max)),
    );
    assert_eq!(*seen.lock().unwrap(), [(1, 2), (2, 2)]);
}

#[test]
fn abort_stops_the_attempt_loop_early() {
    let rig = rig(5);
    rig.input.fail.store(true, Ordering::SeqCst);

    let abort = AbortFlag::new();
    abort.raise();
    let result = rig.manager.restart_account(
        "asterios",
        Lang::En,
        extras(),
        &abort,
        &|| {},
        &|_, _| {},
    );
    assert!(result.is_err());
    assert_eq!(rig.status.count_containing("[restart] attempt"), 1);
}
