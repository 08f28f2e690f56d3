//! Rulegraph core library.
//!
//! Turns `ADD_CUSTOM_COMMAND` style declarations into a validated,
//! deterministically ordered rule graph. Token lists are parsed by
//! [`parser`], resolved against a declaring directory by [`normalize`], and
//! collected by an [`ir::Session`] into output rules and target phase
//! commands. The resulting [`ir::BuildPlan`] can be reported as JSON
//! ([`plan_report`]) or DOT ([`dot_gen`]).

pub mod ast;
pub mod cli;
pub mod dot_gen;
pub mod hasher;
pub mod ir;
pub mod manifest;
pub mod normalize;
pub mod parser;
pub mod plan_report;
pub mod registry;
pub mod rule;
pub mod runner;
