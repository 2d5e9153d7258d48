//! Staged unit lifecycle
//!
//! Every registered unit goes through the same forward-only sequence:
//!
//! ```text
//! 1. Registered
//!    ↓
//! 2. Injected       ← container, configuration and scoped logger wired in
//!    ↓
//! 3. Loaded         ← provided values published (all units, in name order)
//!    ↓
//! 4. Started        ← cross-unit resolution is safe from here on
//!    ↓
//! 5. Finalized      ← tasks and routes handed over, reload callback kept
//!    ↓
//! [Running...]
//!    ↓
//! 6. Stopped        ← reverse order, plugins before modules
//! ```
//!
//! An error or panic in any phase aborts the pass and names the unit and
//! phase it came from.

mod application;
mod fault;
mod orchestrator;
mod phase;
mod shutdown;

pub use application::{Application, ApplicationBuilder};
pub use fault::{guard, panic_message};
pub use orchestrator::{Orchestrator, UnitKind, UnitRef};
pub use phase::{Phase, UnitState};
pub use shutdown::shutdown_signal;
