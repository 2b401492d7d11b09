//! Data types flowing through the pipeline.

pub mod posting;
pub mod query;
pub mod record;
pub mod run;
