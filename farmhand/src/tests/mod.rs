//! Crate-level integration tests: the watcher, the charged probe, the
//! runner, the restart manager and the orchestrator wired against
//! in-memory doubles.


mod cycle_scenarios;
mod executor_ops;
mod restart_recovery;
