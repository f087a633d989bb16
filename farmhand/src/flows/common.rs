//! Server-independent recovery flows.

use super::{templates, zones};
use crate::registry::FlowBundle;
use crate::step::{Layout, RetryAction, Step};
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

/// Unstick the dashboard overlay: keep pressing its toggle key while it
/// is still visible.
pub fn dashboard_reset() -> FlowBundle {
    FlowBundle {
        steps: vec![Step::while_visible_send(
            "dashboard_body",
            "dashboard_init",
            "b",
            1_000,
            10_000,
        )],
        zones: zones(&[("dashboard_body", dashboard_zone())]),
        templates: templates(&[("dashboard_init", &["dashboard", "init"])]),
    }
}

/// Press "to village" on the respawn dialog after death.
pub fn to_village() -> FlowBundle {
    FlowBundle {
        steps: vec![
            Step::click_in("respawn_dialog", "to_village_button", 15_000)
                .with_retry(2, 1_000, RetryAction::Repeat)
                .with_wait_ms(500),
            // The loading screen may or may not show depending on zone.
            Step::wait_optional("full", "loading_screen", 5_000),
        ],
        zones: zones(&[
            (
                "respawn_dialog",
                Zone::Centered {
                    width: 460,
                    height: 260,
                },
            ),
            ("full", Zone::Full),
        ]),
        templates: templates(&[
            ("to_village_button", &["respawn", "to_village"]),
            ("loading_screen", &["misc", "loading"]),
        ]),
    }
}

/// Full login restart: back to the login form, type credentials, enter
/// the PIN, pick the server and character.
pub fn restart() -> FlowBundle {
    FlowBundle {
        steps: vec![
            Step::send("escape").with_wait_ms(500),
            // Confirm the "quit to login" dialog when it shows.
            Step::click_optional("confirm_dialog", "logout_confirm", 3_000).with_wait_ms(1_000),
            Step::wait("login_form", "login_input", 30_000)
                .with_retry(2, 2_000, RetryAction::Restart),
            Step::click_in("login_form", "login_input", 5_000).with_wait_ms(200),
            Step::send_repeated("backspace_click", 24, 20),
            Step::send_text("{account_login}", Layout::En),
            Step::send("tab").with_wait_ms(200),
            Step::send_text("{account_password}", Layout::Raw),
            Step::send("enter").with_wait_ms(1_500),
            Step::wait_optional("pin_pad", "pin_title", 8_000),
            Step::enter_pincode("pin_pad", 300, 10_000).with_wait_ms(500),
            Step::click_in("server_list", "server_entry", 20_000)
                .with_retry(1, 1_000, RetryAction::Prev)
                .with_wait_ms(500),
            Step::click_in("char_select", "start_button", 20_000).with_wait_ms(500),
            Step::wait_optional("full", "loading_screen", 15_000),
        ],
        zones: zones(&[
            (
                "confirm_dialog",
                Zone::Centered {
                    width: 420,
                    height: 200,
                },
            ),
            (
                "login_form",
                Zone::Centered {
                    width: 520,
                    height: 360,
                },
            ),
            (
                "pin_pad",
                Zone::Centered {
                    width: 380,
                    height: 420,
                },
            ),
            (
                "server_list",
                Zone::Centered {
                    width: 640,
                    height: 480,
                },
            ),
            (
                "char_select",
                Zone::Anchored {
                    left: None,
                    top: None,
                    right: Some(0),
                    bottom: Some(0),
                    width: 360,
                    height: 160,
                },
            ),
            ("full", Zone::Full),
        ]),
        templates: templates(&[
            ("logout_confirm", &["login", "logout_confirm"]),
            ("login_input", &["login", "login_input"]),
            ("pin_title", &["pincode", "title"]),
            ("num1", &["pincode", "num1"]),
            ("num2", &["pincode", "num2"]),
            ("num3", &["pincode", "num3"]),
            ("num4", &["pincode", "num4"]),
            ("num5", &["pincode", "num5"]),
            ("num6", &["pincode", "num6"]),
            ("num7", &["pincode", "num7"]),
            ("num8", &["pincode", "num8"]),
            ("num9", &["pincode", "num9"]),
            ("server_entry", &["login", "server_entry"]),
            ("start_button", &["login", "start_button"]),
            ("loading_screen", &["misc", "loading"]),
        ]),
    }
}
