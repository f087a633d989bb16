//! Post-teleport movement routines ("rows") per destination.

use super::{templates, zones};
use crate::registry::{FlowBundle, RowInfo};
use crate::step::Step;
use crate::zone::Zone;

const PRIMEVAL_ROWS: &[RowInfo] = &[
    RowInfo {
        id: "primeval_1",
        title_rus: "Побережье, первая линия",
        title_eng: "Coast, first line",
    },
    RowInfo {
        id: "primeval_2",
        title_rus: "Плато, вторая линия",
        title_eng: "Plateau, second line",
    },
];

pub fn list(village: &str, location: &str) -> Vec<RowInfo> {
    match (village, location) {
        ("rune", "primeval_isle") => PRIMEVAL_ROWS.to_vec(),
        _ => Vec::new(),
    }
}

pub fn flow(village: &str, location: &str, row_id: &str) -> Option<FlowBundle> {
    match (village, location, row_id) {
        ("rune", "primeval_isle", "primeval_1") => Some(primeval_1()),
        ("rune", "primeval_isle", "primeval_2") => Some(primeval_2()),
        _ => None,
    }
}

fn minimap_zone() -> Zone {
    Zone::Anchored {
        left: None,
        top: Some(0),
        right: Some(0),
        bottom: None,
        width: 280,
        height: 280,
    }
}

/// Short run from the spawn point to the coast line, then auto-farm.
fn primeval_1() -> FlowBundle {
    FlowBundle {
        steps: vec![
            Step::wait("minimap", "primeval_anchor", 10_000).with_wait_ms(300),
            Step::send("w").with_wait_ms(4_000),
            Step::send("w").with_wait_ms(4_000),
            Step::send("space"),
        ],
        zones: zones(&[("minimap", minimap_zone())]),
        templates: templates(&[("primeval_anchor", &["rows", "primeval", "anchor"])]),
    }
}

/// Longer run up to the plateau, then auto-farm.
fn primeval_2() -> FlowBundle {
    FlowBundle {
        steps: vec![
            Step::wait("minimap", "primeval_anchor", 10_000).with_wait_ms(300),
            Step::send("w").with_wait_ms(6_000),
            Step::send("d").with_wait_ms(2_500),
            Step::send("w").with_wait_ms(6_000),
            Step::send("space"),
        ],
        zones: zones(&[("minimap", minimap_zone())]),
        templates: templates(&[("primeval_anchor", &["rows", "primeval", "anchor"])]),
    }
}
