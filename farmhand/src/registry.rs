//! Static flow/zone/template registry.
//!
//! Flow data is build-time-known: a map from `(server, flow_id)` to a
//! bundle constructor. Lookup is hierarchical, server-specific first and
//! then the `common` fallback, and an unknown key surfaces as
//! [`AgentError::LoaderMissing`] with no retry.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::errors::AgentError;
use crate::flows;
use crate::step::Step;
use crate::zone::Zone;

/// Everything a flow run needs from the registry.
#[derive(Debug, Clone)]
pub struct FlowBundle {
    pub steps: Vec<Step>,
    pub zones: HashMap<String, Zone>,
    pub templates: HashMap<String, Vec<String>>,
}

/// Server whose data answers when a specific server has none.
pub const COMMON: &str = "common";

type BundleFn = fn() -> FlowBundle;

static FLOWS: Lazy<HashMap<(&'static str, &'static str), BundleFn>> = Lazy::new(|| {
    let mut m: HashMap<(&'static str, &'static str), BundleFn> = HashMap::new();
    m.insert((COMMON, "dashboard_reset"), flows::common::dashboard_reset);
    m.insert((COMMON, "to_village"), flows::common::to_village);
    m.insert((COMMON, "restart"), flows::common::restart);
    m.insert(("asterios", "buff"), flows::asterios::buff);
    m.insert(("asterios", "macros"), flows::asterios::macros);
    m.insert(("asterios", "teleport"), flows::asterios::teleport);
    m
});

/// Look up a flow bundle for `(server, flow_id)`, falling back to the
/// common table.
pub fn flow(server: &str, flow_id: &str) -> Result<FlowBundle, AgentError> {
    FLOWS
        .get(&(server, flow_id))
        .or_else(|| FLOWS.get(&(COMMON, flow_id)))
        .map(|ctor| ctor())
        .ok_or_else(|| AgentError::LoaderMissing(format!("{server}/{flow_id}")))
}

/// Registered `(server, flow_id)` pairs, sorted, for diagnostics.
pub fn list_flows() -> Vec<(&'static str, &'static str)> {
    let mut keys: Vec<_> = FLOWS.keys().copied().collect();
    keys.sort();
    keys
}

/// A selectable post-teleport movement routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowInfo {
    pub id: &'static str,
    pub title_rus: &'static str,
    pub title_eng: &'static str,
}

/// Rows available at a destination, in presentation order.
pub fn list_rows(village: &str, location: &str) -> Vec<RowInfo> {
    flows::rows::list(village, location)
}

/// The step flow of one row.
pub fn row_flow(
    server: &str,
    village: &str,
    location: &str,
    row_id: &str,
) -> Result<FlowBundle, AgentError> {
    flows::rows::flow(village, location, row_id).ok_or_else(|| {
        AgentError::LoaderMissing(format!("{server}/rows/{village}/{location}/{row_id}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_specific_flow_resolves() {
        let bundle = flow("asterios", "buff").unwrap();
        assert!(!bundle.steps.is_empty());
        assert!(!bundle.zones.is_empty());
    }

    #[test]
    fn unknown_server_falls_back_to_common() {
        let bundle = flow("some_new_server", "dashboard_reset").unwrap();
        assert!(!bundle.steps.is_empty());
    }

    #[test]
    fn unknown_flow_is_loader_missing() {
        let err = flow("asterios", "no_such_flow").unwrap_err();
        assert!(matches!(err, AgentError::LoaderMissing(_)));
    }

    #[test]
    fn rows_are_listed_with_both_titles() {
        let rows = list_rows("rune", "primeval_isle");
        assert!(rows.len() >= 2);
        for row in &rows {
            assert!(!row.title_rus.is_empty());
            assert!(!row.title_eng.is_empty());
        }
    }

    #[test]
    fn row_flow_resolves_and_missing_row_fails() {
        assert!(row_flow("asterios", "rune", "primeval_isle", "primeval_1").is_ok());
        assert!(matches!(
            row_flow("asterios", "rune", "primeval_isle", "nope"),
            Err(AgentError::LoaderMissing(_))
        ));
    }

    #[test]
    fn every_registered_zone_reference_exists() {
        // Steps may only name zones present in their bundle's table.
        for key in FLOWS.keys() {
            let bundle = flow(key.0, key.1).unwrap();
            for step in &bundle.steps {
                for zone in zone_refs(step) {
                    assert!(
                        bundle.zones.contains_key(zone),
                        "flow {key:?} references unknown zone '{zone}'"
                    );
                }
            }
        }
    }

    fn zone_refs(step: &Step) -> Vec<&str> {
        use crate::step::Op;
        match &step.op {
            Op::Wait { zone, .. }
            | Op::Click { zone, .. }
            | Op::WhileVisibleSend { zone, .. }
            | Op::DashboardIsLocked { zone, .. }
            | Op::ClickVillage { zone, .. }
            | Op::ClickLocation { zone, .. }
            | Op::EnterPincode { zone, .. } => vec![zone.as_str()],
            Op::ClickAny { zones, .. } => zones.iter().map(String::as_str).collect(),
            _ => vec![],
        }
    }
}
