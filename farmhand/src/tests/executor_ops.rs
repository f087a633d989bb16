//! Executor op semantics against scripted window/input doubles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::mocks::{extras, FakeInput, FakeResolver, FakeWindow};
use crate::config::FlowDefaults;
use crate::exec::{always_alive, Executor, FlowContext};
use crate::flow::{StepResult, StepRunner};
use crate::geometry::Point;
use crate::ports::{AbortFlag, Lang, StatusSink};
use crate::step::{Layout, Step};
use crate::zone::Zone;

struct Quiet;
impl StatusSink for Quiet {
    fn status(&self, _: &str, _: Option<bool>) {}
}

fn fast_defaults() -> FlowDefaults {
    FlowDefaults {
        threshold: 0.8,
        poll_interval: Duration::from_millis(5),
    }
}

fn ctx(zones: &[(&str, Zone)], templates: &[(&str, &[&str])]) -> FlowContext {
    FlowContext {
        server: "asterios".into(),
        lang: Lang::En,
        zones: zones
            .iter()
            .map(|(name, zone)| (name.to_string(), zone.clone()))
            .collect(),
        templates: templates
            .iter()
            .map(|(key, parts)| {
                (
                    key.to_string(),
                    parts.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect(),
        extras: extras(),
        destination: Some(super::mocks::destination(None)),
    }
}

fn run(
    window: &FakeWindow,
    input: &FakeInput,
    ctx: &FlowContext,
    step: &Step,
) -> StepResult {
    let mut exec = Executor {
        ctx,
        window,
        input,
        resolver: &FakeResolver,
        status: &Quiet,
        abort: AbortFlag::new(),
        alive: always_alive(),
        defaults: fast_defaults(),
    };
    exec.run_step(step)
}

#[test]
fn click_translates_to_screen_coordinates() {
    let window = FakeWindow::new();
    window.show("dashboard/init");
    let input = FakeInput::new();
    let ctx = ctx(
        &[(
            "zone",
            Zone::Fixed {
                left: 0,
                top: 0,
                width: 100,
                height: 100,
            },
        )],
        &[("dashboard_init", &["dashboard", "init"])],
    );

    let result = run(
        &window,
        &input,
        &ctx,
        &Step::click_in("zone", "dashboard_init", 200),
    );
    assert_eq!(result, StepResult::Ok);
    // Zone center (50, 50) offset by the window origin (10, 20).
    assert_eq!(input.click_points(), [Point::new(60, 70)]);
}

#[test]
fn click_any_prefers_the_first_listed_zone() {
    let window = FakeWindow::new();
    window.show("teleport/confirm");
    let input = FakeInput::new();
    let ctx = ctx(
        &[
            (
                "first",
                Zone::Fixed {
                    left: 0,
                    top: 0,
                    width: 100,
                    height: 100,
                },
            ),
            (
                "second",
                Zone::Fixed {
                    left: 600,
                    top: 0,
                    width: 100,
                    height: 100,
                },
            ),
        ],
        &[("tp_confirm", &["teleport", "confirm"])],
    );

    let step = Step::click_any(vec!["first".into(), "second".into()], "tp_confirm", 200);
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Ok);
    assert_eq!(input.click_points(), [Point::new(60, 70)]);
}

#[test]
fn wait_times_out_as_fail_and_optional_swallows_it() {
    let window = FakeWindow::new();
    let input = FakeInput::new();
    let ctx = ctx(&[("zone", Zone::Full)], &[("icon", &["misc", "icon"])]);

    let hard = Step::wait("zone", "icon", 30);
    assert_eq!(run(&window, &input, &ctx, &hard), StepResult::Fail);

    let soft = Step::wait_optional("zone", "icon", 30);
    assert_eq!(run(&window, &input, &ctx, &soft), StepResult::Ok);
}

#[test]
fn while_visible_send_presses_until_gone() {
    let window = FakeWindow::new();
    window.show_times("dashboard/init", 3);
    let input = FakeInput::new();
    let ctx = ctx(
        &[("zone", Zone::Full)],
        &[("dashboard_init", &["dashboard", "init"])],
    );

    let step = Step::while_visible_send("zone", "dashboard_init", "b", 5, 2_000);
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Ok);
    assert_eq!(input.sent_commands(), ["b", "b", "b"]);
}

#[test]
fn dashboard_is_locked_probes_with_clicks_until_released() {
    let window = FakeWindow::new();
    window.show_times("dashboard/init", 2);
    let input = FakeInput::new();
    let ctx = ctx(
        &[("zone", Zone::Full)],
        &[("dashboard_init", &["dashboard", "init"])],
    );

    let step = Step::dashboard_is_locked("zone", "dashboard_init", 2_000, 5);
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Ok);
    assert_eq!(input.sent_commands(), ["lclick", "lclick"]);
}

#[test]
fn send_text_ru_maps_cyrillic_to_us_keys() {
    let window = FakeWindow::new();
    let input = FakeInput::new();
    let ctx = ctx(&[], &[]);

    let mut step = Step::send_text("пр", Layout::Ru);
    if let crate::step::Op::SendText { delay_ms, .. } = &mut step.op {
        *delay_ms = 0;
    }
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Ok);
    assert_eq!(input.sent_commands(), ["lang_ru", "g", "h"]);
}

#[test]
fn pincode_digits_are_clicked_in_pin_order() {
    let window = FakeWindow::new();
    window.show("pincode/num");
    let input = FakeInput::new();
    let mut ctx = ctx(
        &[(
            "pin_pad",
            Zone::Fixed {
                left: 0,
                top: 0,
                width: 200,
                height: 200,
            },
        )],
        &[
            ("num1", &["pincode", "num1"]),
            ("num3", &["pincode", "num3"]),
            ("num7", &["pincode", "num7"]),
        ],
    );
    ctx.extras.insert("account_pin".into(), "137".into());

    let step = Step::enter_pincode("pin_pad", 1, 50);
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Ok);
    assert_eq!(input.click_points().len(), 3);
}

#[test]
fn missing_pincode_digit_fails_before_further_clicks() {
    let window = FakeWindow::new();
    window.show("pincode/num1");
    window.show("pincode/num3");
    let input = FakeInput::new();
    let mut ctx = ctx(
        &[("pin_pad", Zone::Full)],
        &[
            ("num1", &["pincode", "num1"]),
            ("num2", &["pincode", "num2"]),
            ("num3", &["pincode", "num3"]),
        ],
    );
    ctx.extras.insert("account_pin".into(), "123".into());

    let step = Step::enter_pincode("pin_pad", 1, 30);
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Fail);
    // Only the leading digit was clicked; the miss stops the sequence.
    assert_eq!(input.click_points().len(), 1);
}

#[test]
fn pincode_rejects_digits_without_templates() {
    let window = FakeWindow::new();
    let input = FakeInput::new();
    let mut ctx = ctx(&[("pin_pad", Zone::Full)], &[]);
    ctx.extras.insert("account_pin".into(), "102".into());

    let step = Step::enter_pincode("pin_pad", 1, 30);
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Fail);
}

#[test]
fn click_village_uses_the_selected_destination() {
    let window = FakeWindow::new();
    window.show("teleport/rune");
    let input = FakeInput::new();
    let ctx = ctx(&[("tp_list", Zone::Full)], &[]);

    let step = Step::click_village("tp_list", 200);
    assert_eq!(run(&window, &input, &ctx, &step), StepResult::Ok);
    assert_eq!(input.click_points().len(), 1);
}

#[test]
fn dead_player_cuts_a_wait_short() {
    let window = FakeWindow::new();
    let input = FakeInput::new();
    let ctx = ctx(&[("zone", Zone::Full)], &[("icon", &["misc", "icon"])]);

    let mut exec = Executor {
        ctx: &ctx,
        window: &window,
        input: &input,
        resolver: &FakeResolver,
        status: &Quiet,
        abort: AbortFlag::new(),
        alive: Arc::new(|| false),
        defaults: fast_defaults(),
    };
    let step = Step::wait("zone", "icon", 10_000);
    assert_eq!(exec.run_step(&step), StepResult::Fail);
}

#[test]
fn raised_abort_flag_reports_aborted() {
    let window = FakeWindow::new();
    let input = FakeInput::new();
    let ctx = ctx(&[("zone", Zone::Full)], &[("icon", &["misc", "icon"])]);

    let abort = AbortFlag::new();
    abort.raise();
    let mut exec = Executor {
        ctx: &ctx,
        window: &window,
        input: &input,
        resolver: &FakeResolver,
        status: &Quiet,
        abort,
        alive: always_alive(),
        defaults: fast_defaults(),
    };
    let step = Step::wait("zone", "icon", 10_000);
    assert_eq!(exec.run_step(&step), StepResult::Aborted);
}
