//! Court document fact extraction.
//!
//! Decisions are classified by outcome; execution writs yield the amounts and
//! issue date to collect. A configured model is tried first and regex
//! extraction fills whatever it leaves out.

pub mod chat;
pub mod config;
pub mod decision;
pub mod error;
pub mod execution_doc;
pub mod fallback;
pub mod fetch;
pub mod invoker;
pub mod merge;
pub mod parse;
pub mod processor;
pub mod prompts;
pub mod retry;
pub mod scheduler;
pub mod schema;
pub mod service;
pub mod store;
pub mod text;
pub mod validation;
