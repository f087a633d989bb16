//! Flow runner: registry lookup + context assembly + engine invocation.
//!
//! One runner serves the whole agent, and it enforces the single-flow
//! rule: at most one flow runs at a time, a second start is rejected with
//! a status line rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::config::FlowDefaults;
use crate::exec::{AliveFn, Executor, FlowContext};
use crate::flow::{self, FlowResult};
use crate::ports::{AbortFlag, Destination, Extras, GameWindow, InputDriver, Lang, StatusSink, TemplateResolver};
use crate::registry::{self, FlowBundle};

/// Everything a flow needs from the outside world, plus the busy guard.
pub struct FlowRunner {
    pub window: Arc<dyn GameWindow>,
    pub input: Arc<dyn InputDriver>,
    pub resolver: Arc<dyn TemplateResolver>,
    pub status: Arc<dyn StatusSink>,
    pub defaults: FlowDefaults,
    busy: AtomicBool,
}

impl FlowRunner {
    pub fn new(
        window: Arc<dyn GameWindow>,
        input: Arc<dyn InputDriver>,
        resolver: Arc<dyn TemplateResolver>,
        status: Arc<dyn StatusSink>,
        defaults: FlowDefaults,
    ) -> Self {
        Self {
            window,
            input,
            resolver,
            status,
            defaults,
            busy: AtomicBool::new(false),
        }
    }

    /// Run a registered flow by id.
    pub fn run(
        &self,
        server: &str,
        lang: Lang,
        flow_id: &str,
        extras: Extras,
        destination: Option<Destination>,
        abort: &AbortFlag,
        alive: AliveFn,
    ) -> FlowResult {
        match registry::flow(server, flow_id) {
            Ok(bundle) => self.run_bundle(
                server,
                lang,
                flow_id,
                bundle,
                extras,
                destination,
                abort,
                alive,
            ),
            Err(e) => {
                self.status
                    .status(&format!("[flow] {flow_id}: {e}"), Some(false));
                FlowResult::Failed
            }
        }
    }

    /// Run the row flow of the given destination.
    pub fn run_row(
        &self,
        server: &str,
        lang: Lang,
        destination: &Destination,
        row_id: &str,
        extras: Extras,
        abort: &AbortFlag,
        alive: AliveFn,
    ) -> FlowResult {
        match registry::row_flow(server, &destination.village, &destination.location, row_id) {
            Ok(bundle) => self.run_bundle(
                server,
                lang,
                row_id,
                bundle,
                extras,
                Some(destination.clone()),
                abort,
                alive,
            ),
            Err(e) => {
                self.status
                    .status(&format!("[rows] {row_id}: {e}"), Some(false));
                FlowResult::Failed
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_bundle(
        &self,
        server: &str,
        lang: Lang,
        flow_id: &str,
        bundle: FlowBundle,
        extras: Extras,
        destination: Option<Destination>,
        abort: &AbortFlag,
        alive: AliveFn,
    ) -> FlowResult {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.status
                .status(&format!("[flow] {flow_id}: busy, rejected"), Some(false));
            return FlowResult::Failed;
        }

        info!(server, flow_id, steps = bundle.steps.len(), "flow start");
        let ctx = FlowContext {
            server: server.to_string(),
            lang,
            zones: bundle.zones,
            templates: bundle.templates,
            extras,
            destination,
        };
        let mut executor = Executor {
            ctx: &ctx,
            window: &*self.window,
            input: &*self.input,
            resolver: &*self.resolver,
            status: &*self.status,
            abort: abort.clone(),
            alive,
            defaults: self.defaults,
        };

        let result = flow::run_flow(flow_id, &bundle.steps, &mut executor, abort);
        self.busy.store(false, Ordering::SeqCst);

        match result {
            FlowResult::Completed => {
                self.status.status(&format!("[flow] {flow_id}: ok"), Some(true))
            }
            FlowResult::Failed => self
                .status
                .status(&format!("[flow] {flow_id}: failed"), Some(false)),
            FlowResult::Aborted => self
                .status
                .status(&format!("[flow] {flow_id}: aborted"), None),
        }
        result
    }

    /// Whether a flow is currently executing.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}
