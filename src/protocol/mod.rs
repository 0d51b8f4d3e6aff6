//! Worker output protocol.
//!
//! Workers emit newline-delimited JSON records on stdout. This module
//! defines the typed event union and the incremental parser that turns a
//! raw byte stream into ordered events.

pub mod event;
pub mod parser;

pub use event::{StreamEvent, TokenCost};
pub use parser::StreamParser;
