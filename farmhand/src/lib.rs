//! Screen-driven game client automation agent.
//!
//! The agent watches a game window through screen capture, recognizes UI
//! elements by template matching, and drives the client through a serial
//! HID input device. On top of those ports it runs declarative step
//! flows (login, buffing, teleports, farm rows) and an orchestrator that
//! keeps the buff/teleport/farm cycle going across deaths and client
//! restarts.
//!
//! The crate is synchronous: flows block the thread that runs them, the
//! HP watcher and the run loop own their worker threads, and the only
//! cross-thread signal a flow observes is its [`ports::AbortFlag`].

pub mod charged;
pub mod config;
pub mod cycle;
pub mod errors;
pub mod exec;
pub mod flow;
pub mod flows;
pub mod geometry;
pub mod input;
pub mod ports;
pub mod registry;
pub mod restart;
pub mod runner;
pub mod sched;
pub mod step;
pub mod templates;
pub mod vision;
pub mod watcher;
pub mod zone;

pub use charged::{Charged, ChargedCheck};
pub use config::AgentConfig;
pub use cycle::{CycleDone, CycleOrchestrator, CyclePorts, CycleState};
pub use errors::AgentError;
pub use exec::{always_alive, AliveFn, Executor, FlowContext};
pub use flow::{run_flow, FlowResult, StepResult, StepRunner};
pub use geometry::{Point, Rect, Size};
pub use ports::{
    AbortFlag, Destination, Extras, GameWindow, InputDriver, Lang, Match, Scheduler, StatusSink,
    TemplateResolver, TracingStatus,
};
pub use restart::RestartManager;
pub use runner::FlowRunner;
pub use sched::RunLoop;
pub use step::{Op, RetryAction, RetryPolicy, Step};
pub use watcher::{HpPalette, PlayerState, StateListener, StateWatcher};
pub use zone::Zone;

#[cfg(test)]
mod tests;
