pub mod controller;
pub mod policy;

pub use controller::{CaptureOutcome, PersistFailure, ScanController};
pub use policy::{DecisionPolicy, ScanDecision};
