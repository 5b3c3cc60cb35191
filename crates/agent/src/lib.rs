//! The orchestration loop at the heart of Stepwise.
//!
//! The loop follows a **Step → Select → Elicit → Dispatch** cycle:
//!
//! 1. **Ask** the model for the next step, with every capability hinted
//!    in the system prompt but no tool schemas attached
//! 2. **Inspect** the answer for a `<FINAL_ANSWER>` span (done) or a
//!    `<WORKER>`/`<TOOL>` selection span
//! 3. **Elicit** parameters with a second call that carries only the
//!    selected capability's schemas
//! 4. **Dispatch** the decoded calls to a provider or a nested worker and
//!    record the results
//!
//! The loop ends on a final answer or when the step budget is spent.

pub mod capability;
pub mod decoder;
pub mod orchestrator;
pub mod prompts;
pub mod setup;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use capability::{Capability, CapabilityRegistry, PoolCapability, PoolScope};
pub use decoder::{FINAL_ANSWER, Marker, SelectionMarker, TOOL, WORKER, decode_tool_calls, extract_span};
pub use orchestrator::{Orchestrator, RunResult, RunStatus};
pub use setup::{orchestrator_from_config, registry_from_config};
pub use worker::{WorkerFacade, WorkerResult};
