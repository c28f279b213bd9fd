//! Entities, value objects and the collaborator ports the orchestrator depends on.

pub mod audit;
pub mod card;
pub mod money;
pub mod payment;
pub mod ports;
pub mod refund;
pub mod transaction;
