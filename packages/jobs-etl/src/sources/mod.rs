//! Search source implementations.

pub mod mock;
pub mod usajobs;

pub use mock::MockSource;
pub use usajobs::UsaJobsSource;
