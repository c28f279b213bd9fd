//! Application layer: the payment orchestrator and the retry policy it applies to
//! banking gateway calls.

pub mod orchestrator;
pub mod retry;
