/// Probing engine - classifies targets, runs the checks and reacts to
/// state transitions.
///
/// This module is responsible for:
/// - Classifying targets into HTTP/TCP/ICMP checks
/// - Executing probes on the aligned schedule
/// - Debouncing state flips and firing notifications
pub mod checker;
pub mod classify;
pub mod executor;
pub mod notify;
pub mod scheduler;
pub mod statechange;
pub mod types;

pub use executor::ProbeExecutor;
pub use notify::{HttpNotifier, Notifier};
pub use scheduler::Scheduler;
pub use statechange::StateChangeDetector;
pub use types::{ProbeOutcome, RTT_UNMEASURED};
