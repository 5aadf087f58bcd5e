//! The natural-language command path
//!
//! ```text
//!  command ──► describe_schema ──► translate ──► unsafe / multi-statement check
//!                                                        │
//!                       shaped response ◄── execute ◄── classify
//! ```
//!
//! Every stage reports through [`PipelineError`]; nothing is retried.

pub mod error;
pub mod pipeline;

pub use error::PipelineError;
pub use pipeline::{check_executable, shape_response, CommandPipeline, CommandResponse, Outcome};
