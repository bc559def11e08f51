//! Built-in node behaviors.
//!
//! The engine ships only the two structural nodes every flow tends to have:
//! a `start` entry point and an `output` collector. Domain behaviors are
//! registered by the embedding application.

mod output;
mod start;

pub use output::OutputNode;
pub use start::StartNode;
