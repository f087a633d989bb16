//! Flows for the `asterios` server profile.

use super::{templates, zones};
use crate::registry::FlowBundle;
use crate::step::{RetryAction, Step};
use crate::zone::Zone;

fn dashboard_zone() -> Zone {
    Zone::Anchored {
        left: None,
        top: None,
        right: Some(0),
        bottom: Some(120),
        width: 420,
        height: 380,
    }
}

fn buff_bar_zone() -> Zone {
    Zone::Anchored {
        left: Some(0),
        top: Some(0),
        right: None,
        bottom: None,
        width: 640,
        height: 90,
    }
}

/// Open the dashboard, pick the buffer profile for the current mode and
/// apply the buff set.
pub fn buff() -> FlowBundle {
    FlowBundle {
        steps: vec![
            Step::send("b").with_wait_ms(700),
            Step::wait("dashboard_body", "dashboard_init", 6_000)
                .with_retry(2, 500, RetryAction::Restart),
            Step::click_in("dashboard_body", "mode_profile", 4_000)
                .with_retry(1, 500, RetryAction::Prev)
                .with_wait_ms(400),
            Step::click_in("dashboard_body", "buff_button", 4_000).with_wait_ms(1_200),
            // The icon needs a moment to light up; probe, don't insist.
            Step::wait_optional("buff_bar", "charged_icon", 3_000),
            Step::send("b").with_wait_ms(300),
        ],
        zones: zones(&[
            ("dashboard_body", dashboard_zone()),
            ("buff_bar", buff_bar_zone()),
        ]),
        templates: templates(&[
            ("dashboard_init", &["dashboard", "init"]),
            ("mode_profile", &["dashboard", "{mode_key}"]),
            ("buff_button", &["dashboard", "buff_button"]),
            ("charged_icon", &["buffs", "charged"]),
        ]),
    }
}

/// Kick off the in-game preparation macros from the hotbar.
pub fn macros() -> FlowBundle {
    FlowBundle {
        steps: vec![
            Step::send("7").with_wait_ms(400),
            Step::send("8").with_wait_ms(400),
            Step::send_repeated("pagedown", 2, 150),
        ],
        zones: zones(&[]),
        templates: templates(&[]),
    }
}

/// Teleport to the selected destination through the dashboard.
pub fn teleport() -> FlowBundle {
    FlowBundle {
        steps: vec![
            Step::send("b").with_wait_ms(700),
            Step::wait("dashboard_body", "dashboard_init", 6_000)
                .with_retry(2, 500, RetryAction::Restart),
            Step::click_in("dashboard_body", "teleport_tab", 4_000).with_wait_ms(600),
            Step::click_village("tp_list", 8_000)
                .with_retry(2, 500, RetryAction::Prev)
                .with_wait_ms(600),
            Step::click_location("tp_list", 8_000)
                .with_retry(1, 500, RetryAction::Prev)
                .with_wait_ms(400),
            // The confirm button shows up in one of two list layouts.
            Step::click_any(
                vec!["tp_list".into(), "dashboard_body".into()],
                "tp_confirm",
                5_000,
            )
            .with_wait_ms(500),
            Step::wait_optional("full", "loading_screen", 8_000),
        ],
        zones: zones(&[
            ("dashboard_body", dashboard_zone()),
            (
                "tp_list",
                Zone::Centered {
                    width: 560,
                    height: 520,
                },
            ),
            ("full", Zone::Full),
        ]),
        templates: templates(&[
            ("dashboard_init", &["dashboard", "init"]),
            ("teleport_tab", &["dashboard", "teleport_tab"]),
            ("tp_confirm", &["teleport", "confirm"]),
            ("loading_screen", &["misc", "loading"]),
        ]),
    }
}
