//! Step records: the unit of a flow.
//!
//! Two representations exist on purpose. [`RawStep`] is the stable textual
//! schema (YAML/JSON) authored flows use; it carries every known key as an
//! optional field and rejects unknown keys outright. [`Step`] is the closed
//! sum type the engine actually interprets: per-op required fields are
//! checked once, at load time, so the executor never sees a half-formed
//! record.

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Default minimum template-match score.
pub const DEFAULT_THRESHOLD: f32 = 0.87;

/// What the engine does when a step fails and retries remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    /// Re-execute the same step.
    #[default]
    Repeat,
    /// Zero this step's attempts and step back one index.
    Prev,
    /// Zero every attempt counter and start the flow over.
    Restart,
}

/// Per-step retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RetryPolicy {
    pub count: u32,
    pub delay_ms: u64,
    pub action: RetryAction,
}

/// A template image reference: a key into the flow's template table, or
/// explicit path parts handed straight to the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateRef {
    Key(String),
    Parts(Vec<String>),
}

/// Keyboard layout handling for typed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Assert the US layout, type verbatim.
    En,
    /// Assert the RU layout, map Cyrillic glyphs to the US keys that
    /// produce them.
    Ru,
    /// Type verbatim without touching the layout.
    Raw,
    /// Flip the layout once, then type verbatim.
    Toggle,
}

/// The op-specific payload of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Sleep {
        ms: u64,
    },
    SendInput {
        cmd: String,
        count: u32,
        delay_ms: u64,
    },
    SendText {
        text: String,
        layout: Layout,
        delay_ms: u64,
    },
    Wait {
        zone: String,
        tpl: TemplateRef,
        timeout_ms: u64,
        thr: f32,
        optional: bool,
    },
    Click {
        zone: String,
        tpl: TemplateRef,
        timeout_ms: u64,
        thr: f32,
        optional: bool,
    },
    ClickAny {
        zones: Vec<String>,
        tpl: TemplateRef,
        timeout_ms: u64,
        thr: f32,
    },
    WhileVisibleSend {
        zone: String,
        tpl: TemplateRef,
        cmd: String,
        probe_interval_ms: u64,
        timeout_ms: u64,
    },
    DashboardIsLocked {
        zone: String,
        tpl: TemplateRef,
        timeout_ms: u64,
        probe_interval_ms: u64,
    },
    /// Click the template of the currently selected village.
    ClickVillage {
        zone: String,
        timeout_ms: u64,
        thr: f32,
    },
    /// Click the template of the currently selected location.
    ClickLocation {
        zone: String,
        timeout_ms: u64,
        thr: f32,
    },
    EnterPincode {
        zone: String,
        digit_delay_ms: u64,
        timeout_ms: u64,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Sleep { .. } => "sleep",
            Op::SendInput { .. } => "send_arduino",
            Op::SendText { .. } => "send_message",
            Op::Wait { optional: false, .. } => "wait",
            Op::Wait { optional: true, .. } => "wait_optional",
            Op::Click { optional: false, .. } => "click_in",
            Op::Click { optional: true, .. } => "click_optional",
            Op::ClickAny { .. } => "click_any",
            Op::WhileVisibleSend { .. } => "while_visible_send",
            Op::DashboardIsLocked { .. } => "dashboard_is_locked",
            Op::ClickVillage { .. } => "click_village",
            Op::ClickLocation { .. } => "click_location",
            Op::EnterPincode { .. } => "enter_pincode",
        }
    }
}

/// One flow step: an op plus the engine-level policy fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub op: Op,
    pub retry: RetryPolicy,
    /// Post-success delay.
    pub wait_ms: u64,
}

impl Step {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            retry: RetryPolicy::default(),
            wait_ms: 0,
        }
    }

    pub fn sleep(ms: u64) -> Self {
        Self::new(Op::Sleep { ms })
    }

    pub fn send(cmd: impl Into<String>) -> Self {
        Self::new(Op::SendInput {
            cmd: cmd.into(),
            count: 1,
            delay_ms: 0,
        })
    }

    pub fn send_repeated(cmd: impl Into<String>, count: u32, delay_ms: u64) -> Self {
        Self::new(Op::SendInput {
            cmd: cmd.into(),
            count,
            delay_ms,
        })
    }

    pub fn send_text(text: impl Into<String>, layout: Layout) -> Self {
        Self::new(Op::SendText {
            text: text.into(),
            layout,
            delay_ms: 50,
        })
    }

    pub fn wait(zone: impl Into<String>, tpl: impl Into<TemplateRef>, timeout_ms: u64) -> Self {
        Self::new(Op::Wait {
            zone: zone.into(),
            tpl: tpl.into(),
            timeout_ms,
            thr: DEFAULT_THRESHOLD,
            optional: false,
        })
    }

    pub fn wait_optional(
        zone: impl Into<String>,
        tpl: impl Into<TemplateRef>,
        timeout_ms: u64,
    ) -> Self {
        Self::new(Op::Wait {
            zone: zone.into(),
            tpl: tpl.into(),
            timeout_ms,
            thr: DEFAULT_THRESHOLD,
            optional: true,
        })
    }

    pub fn click_in(zone: impl Into<String>, tpl: impl Into<TemplateRef>, timeout_ms: u64) -> Self {
        Self::new(Op::Click {
            zone: zone.into(),
            tpl: tpl.into(),
            timeout_ms,
            thr: DEFAULT_THRESHOLD,
            optional: false,
        })
    }

    pub fn click_optional(
        zone: impl Into<String>,
        tpl: impl Into<TemplateRef>,
        timeout_ms: u64,
    ) -> Self {
        Self::new(Op::Click {
            zone: zone.into(),
            tpl: tpl.into(),
            timeout_ms,
            thr: DEFAULT_THRESHOLD,
            optional: true,
        })
    }

    pub fn click_any(
        zones: Vec<String>,
        tpl: impl Into<TemplateRef>,
        timeout_ms: u64,
    ) -> Self {
        Self::new(Op::ClickAny {
            zones,
            tpl: tpl.into(),
            timeout_ms,
            thr: DEFAULT_THRESHOLD,
        })
    }

    pub fn while_visible_send(
        zone: impl Into<String>,
        tpl: impl Into<TemplateRef>,
        cmd: impl Into<String>,
        probe_interval_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self::new(Op::WhileVisibleSend {
            zone: zone.into(),
            tpl: tpl.into(),
            cmd: cmd.into(),
            probe_interval_ms,
            timeout_ms,
        })
    }

    pub fn dashboard_is_locked(
        zone: impl Into<String>,
        tpl: impl Into<TemplateRef>,
        timeout_ms: u64,
        probe_interval_ms: u64,
    ) -> Self {
        Self::new(Op::DashboardIsLocked {
            zone: zone.into(),
            tpl: tpl.into(),
            timeout_ms,
            probe_interval_ms,
        })
    }

    pub fn click_village(zone: impl Into<String>, timeout_ms: u64) -> Self {
        Self::new(Op::ClickVillage {
            zone: zone.into(),
            timeout_ms,
            thr: DEFAULT_THRESHOLD,
        })
    }

    pub fn click_location(zone: impl Into<String>, timeout_ms: u64) -> Self {
        Self::new(Op::ClickLocation {
            zone: zone.into(),
            timeout_ms,
            thr: DEFAULT_THRESHOLD,
        })
    }

    pub fn enter_pincode(zone: impl Into<String>, digit_delay_ms: u64, timeout_ms: u64) -> Self {
        Self::new(Op::EnterPincode {
            zone: zone.into(),
            digit_delay_ms,
            timeout_ms,
        })
    }

    pub fn with_thr(mut self, thr: f32) -> Self {
        match &mut self.op {
            Op::Wait { thr: t, .. }
            | Op::Click { thr: t, .. }
            | Op::ClickAny { thr: t, .. }
            | Op::ClickVillage { thr: t, .. }
            | Op::ClickLocation { thr: t, .. } => *t = thr,
            _ => {}
        }
        self
    }

    pub fn with_retry(mut self, count: u32, delay_ms: u64, action: RetryAction) -> Self {
        self.retry = RetryPolicy {
            count,
            delay_ms,
            action,
        };
        self
    }

    pub fn with_wait_ms(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    /// Optional ops always report success and are exempt from retries.
    pub fn is_optional(&self) -> bool {
        matches!(
            self.op,
            Op::Wait { optional: true, .. } | Op::Click { optional: true, .. }
        )
    }
}

impl From<&str> for TemplateRef {
    fn from(key: &str) -> Self {
        TemplateRef::Key(key.to_string())
    }
}

impl From<String> for TemplateRef {
    fn from(key: String) -> Self {
        TemplateRef::Key(key)
    }
}

impl From<Vec<String>> for TemplateRef {
    fn from(parts: Vec<String>) -> Self {
        TemplateRef::Parts(parts)
    }
}

/// The stable textual step schema. Every known key is optional here;
/// unknown keys fail deserialization, which is how typo'd flow data
/// (`teleportl` instead of `tpl`) is caught at load time rather than
/// silently ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStep {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpl: Option<TemplateRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thr: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_action: Option<RetryAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digit_delay_ms: Option<u64>,
}

impl RawStep {
    fn require<T>(field: Option<T>, op: &str, name: &str) -> Result<T, AgentError> {
        field.ok_or_else(|| {
            AgentError::LoaderMissing(format!("step '{op}' is missing required field '{name}'"))
        })
    }
}

impl TryFrom<RawStep> for Step {
    type Error = AgentError;

    fn try_from(raw: RawStep) -> Result<Self, AgentError> {
        let op_name = raw.op.clone();
        let thr = raw.thr.unwrap_or(DEFAULT_THRESHOLD);
        let op = match op_name.as_str() {
            "sleep" => Op::Sleep {
                ms: RawStep::require(raw.ms, &op_name, "ms")?,
            },
            "send_arduino" => Op::SendInput {
                cmd: RawStep::require(raw.cmd, &op_name, "cmd")?,
                count: raw.count.unwrap_or(1),
                delay_ms: raw.delay_ms.unwrap_or(0),
            },
            "send_message" => Op::SendText {
                text: RawStep::require(raw.text, &op_name, "text")?,
                layout: raw.layout.unwrap_or(Layout::Raw),
                delay_ms: raw.delay_ms.unwrap_or(50),
            },
            "wait" | "wait_optional" => Op::Wait {
                zone: RawStep::require(raw.zone, &op_name, "zone")?,
                tpl: RawStep::require(raw.tpl, &op_name, "tpl")?,
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
                thr,
                optional: op_name == "wait_optional",
            },
            "click_in" | "click_optional" => Op::Click {
                zone: RawStep::require(raw.zone, &op_name, "zone")?,
                tpl: RawStep::require(raw.tpl, &op_name, "tpl")?,
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
                thr,
                optional: op_name == "click_optional",
            },
            "click_any" => Op::ClickAny {
                zones: RawStep::require(raw.zones, &op_name, "zones")?,
                tpl: RawStep::require(raw.tpl, &op_name, "tpl")?,
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
                thr,
            },
            "while_visible_send" => Op::WhileVisibleSend {
                zone: RawStep::require(raw.zone, &op_name, "zone")?,
                tpl: RawStep::require(raw.tpl, &op_name, "tpl")?,
                cmd: RawStep::require(raw.cmd, &op_name, "cmd")?,
                probe_interval_ms: raw.probe_interval_ms.unwrap_or(1_000),
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
            },
            "dashboard_is_locked" => Op::DashboardIsLocked {
                zone: RawStep::require(raw.zone, &op_name, "zone")?,
                tpl: RawStep::require(raw.tpl, &op_name, "tpl")?,
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
                probe_interval_ms: raw.probe_interval_ms.unwrap_or(1_000),
            },
            "click_village" => Op::ClickVillage {
                zone: RawStep::require(raw.zone, &op_name, "zone")?,
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
                thr,
            },
            "click_location" => Op::ClickLocation {
                zone: RawStep::require(raw.zone, &op_name, "zone")?,
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
                thr,
            },
            "enter_pincode" => Op::EnterPincode {
                zone: RawStep::require(raw.zone, &op_name, "zone")?,
                digit_delay_ms: raw.digit_delay_ms.unwrap_or(300),
                timeout_ms: RawStep::require(raw.timeout_ms, &op_name, "timeout_ms")?,
            },
            other => {
                return Err(AgentError::LoaderMissing(format!("unknown op '{other}'")));
            }
        };

        let step = Step {
            op,
            retry: RetryPolicy {
                count: raw.retry_count.unwrap_or(0),
                delay_ms: raw.retry_delay_ms.unwrap_or(0),
                action: raw.retry_action.unwrap_or_default(),
            },
            wait_ms: raw.wait_ms.unwrap_or(0),
        };

        if step.is_optional() && step.retry.count > 0 {
            tracing::warn!(
                op = step.op.name(),
                "retry_count on an optional step is dead data; it will never be consulted"
            );
        }
        Ok(step)
    }
}

/// Parse a YAML-authored flow into validated steps.
pub fn flow_from_yaml(yaml: &str) -> Result<Vec<Step>, AgentError> {
    let raw: Vec<RawStep> = serde_yaml::from_str(yaml)
        .map_err(|e| AgentError::LoaderMissing(format!("flow data does not parse: {e}")))?;
    raw.into_iter().map(Step::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_applies() {
        let yaml = r#"
- op: wait
  zone: dashboard_body
  tpl: dashboard_init
  timeout_ms: 5000
"#;
        let steps = flow_from_yaml(yaml).unwrap();
        match &steps[0].op {
            Op::Wait { thr, .. } => assert!((thr - DEFAULT_THRESHOLD).abs() < f32::EPSILON),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        // `teleportl` was a real typo in authored flow data; it must fail
        // loudly instead of being ignored.
        let yaml = r#"
- op: click_in
  zone: main
  teleportl: gatekeeper
  timeout_ms: 3000
"#;
        assert!(flow_from_yaml(yaml).is_err());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let yaml = "- op: warp_speed\n";
        assert!(matches!(
            flow_from_yaml(yaml),
            Err(AgentError::LoaderMissing(_))
        ));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let yaml = r#"
- op: click_in
  zone: main
  timeout_ms: 3000
"#;
        let err = flow_from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("tpl"));
    }

    #[test]
    fn retry_fields_round_trip() {
        let yaml = r#"
- op: wait
  zone: settings
  tpl: apply_button
  timeout_ms: 2000
  retry_count: 3
  retry_delay_ms: 250
  retry_action: prev
  wait_ms: 100
"#;
        let steps = flow_from_yaml(yaml).unwrap();
        assert_eq!(steps[0].retry.count, 3);
        assert_eq!(steps[0].retry.delay_ms, 250);
        assert_eq!(steps[0].retry.action, RetryAction::Prev);
        assert_eq!(steps[0].wait_ms, 100);
    }

    #[test]
    fn template_ref_accepts_key_or_parts() {
        let yaml = r#"
- op: wait
  zone: main
  tpl: [teleport, rune, primeval_isle]
  timeout_ms: 1000
- op: wait
  zone: main
  tpl: charged_icon
  timeout_ms: 1000
"#;
        let steps = flow_from_yaml(yaml).unwrap();
        match &steps[0].op {
            Op::Wait {
                tpl: TemplateRef::Parts(parts),
                ..
            } => assert_eq!(parts.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
        match &steps[1].op {
            Op::Wait {
                tpl: TemplateRef::Key(k),
                ..
            } => assert_eq!(k, "charged_icon"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn optional_variants_are_flagged() {
        assert!(Step::wait_optional("z", "t", 100).is_optional());
        assert!(Step::click_optional("z", "t", 100).is_optional());
        assert!(!Step::wait("z", "t", 100).is_optional());
    }
}
