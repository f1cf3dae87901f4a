//! Statement classification and policy enforcement.
//!
//! Both halves are pure: nothing here opens a connection.

pub mod classifier;
pub mod policy;

pub use classifier::{Classification, Intent, RiskTier, StatementClassifier, classify};
pub use policy::{PolicyConfig, PolicyDecision, PolicyOutcome, decide};
