pub mod builders;
pub mod harness;

// Re-export commonly used test utilities
pub use builders::CandidateBuilder;
pub use harness::{TestDb, TestRig};
