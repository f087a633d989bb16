//! Soft-reset and full account-restart recovery.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::RestartConfig;
use crate::errors::AgentError;
use crate::exec::always_alive;
use crate::flow::{sleep_checked, FlowResult};
use crate::ports::{AbortFlag, Extras, Lang, StatusSink};
use crate::runner::FlowRunner;
use crate::watcher::StateWatcher;

pub struct RestartManager {
    runner: Arc<FlowRunner>,
    watcher: Arc<StateWatcher>,
    status: Arc<dyn StatusSink>,
    config: RestartConfig,
}

impl RestartManager {
    pub fn new(
        runner: Arc<FlowRunner>,
        watcher: Arc<StateWatcher>,
        status: Arc<dyn StatusSink>,
        config: RestartConfig,
    ) -> Self {
        Self {
            runner,
            watcher,
            status,
            config,
        }
    }

    /// Unstick the dashboard overlay by running the `dashboard_reset`
    /// flow for the current server.
    pub fn run_dashboard_reset(
        &self,
        server: &str,
        lang: Lang,
        extras: Extras,
        abort: &AbortFlag,
    ) -> FlowResult {
        self.status.status("[reset] dashboard reset", None);
        self.runner.run(
            server,
            lang,
            "dashboard_reset",
            extras,
            None,
            abort,
            always_alive(),
        )
    }

    /// Full login restart with a bounded attempt budget.
    ///
    /// The watcher is quiesced for the duration; its run-state is restored
    /// only when the restart succeeds, otherwise it stays off and the
    /// failure is surfaced. `clear_alive` is invoked after the loop so the
    /// caller can drop its alive flag back to unknown; whatever the
    /// watcher believed before the restart is stale either way.
    pub fn restart_account(
        &self,
        server: &str,
        lang: Lang,
        extras: Extras,
        abort: &AbortFlag,
        clear_alive: &dyn Fn(),
        on_progress: &dyn Fn(u32, u32),
    ) -> Result<(), AgentError> {
        let was_running = self.watcher.is_running();
        self.watcher.stop();

        let max = self.config.max_restart_attempts.max(1);
        let mut succeeded = false;

        for attempt in 1..=max {
            on_progress(attempt, max);
            self.status
                .status(&format!("[restart] attempt {attempt}/{max}"), None);

            let result = self.runner.run(
                server,
                lang,
                "restart",
                extras.clone(),
                None,
                abort,
                always_alive(),
            );
            match result {
                FlowResult::Completed => {
                    succeeded = true;
                    break;
                }
                FlowResult::Aborted => break,
                FlowResult::Failed => {
                    warn!(attempt, "account restart attempt failed");
                    if attempt < max {
                        // Clean up whatever half-open UI the attempt left.
                        self.run_dashboard_reset(server, lang, extras.clone(), abort);
                        if !sleep_checked(self.config.retry_delay, abort) {
                            break;
                        }
                    }
                }
            }
        }

        clear_alive();

        if succeeded {
            if was_running {
                self.watcher.start();
            }
            info!("account restart succeeded");
            self.status.status("[restart] logged back in", Some(true));
            Ok(())
        } else {
            self.status
                .status(&format!("[restart] giving up after {max} attempts"), Some(false));
            Err(AgentError::RestartExhausted { attempts: max })
        }
    }

    pub fn retry_delay(&self) -> Duration {
        self.config.retry_delay
    }
}
