//! Multi-agent reconnaissance orchestration core.
//!
//! A session turns a target into a root goal, decomposes it into a phased
//! execution plan, feeds ready tasks into a command queue drained by agent
//! workers, and asks an oracle for follow-up commands until it signals the
//! end. An optional observe-think-act loop supervises the same components
//! and gates risky actions behind an approval policy.
//!
//! - **[`core`]**: Pure, deterministic logic (target classification, command
//!   protocol, approval policy, scheduling order). No I/O.
//! - **[`io`]**: Side-effecting collaborators (config files, processes, the
//!   oracle seam, report exports). Isolated behind traits for tests.
//!
//! Stateful components ([`goals`], [`planner`], [`queue`], [`agents`],
//! [`findings`]) each guard their own state and publish [`events`].
//! [`orchestrator`] wires them into a session and [`ota`] drives the control
//! loop.

pub mod agents;
pub mod core;
pub mod events;
pub mod exit_codes;
pub mod findings;
pub mod goals;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod ota;
pub mod planner;
pub mod queue;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
