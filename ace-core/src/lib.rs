//! ACE core library — risk scoring, pack synthesis, budget enforcement,
//! guarded application, repair, and the append-only journal.
//!
//! The main entry points are [`apply::run_apply`] (the full
//! analyze → filter → plan → pack → gate → budget → apply pipeline) and
//! [`apply::run_check`] (the detect-only path).

pub mod apply;
pub mod budget;
pub mod config;
pub mod error;
pub mod guard;
pub mod journal;
pub mod pack;
pub mod patch;
pub mod policy;
pub mod progress;
pub mod repair;
pub mod rules;
pub mod scan;
pub mod score;
pub mod skiplist;
pub mod suppress;
pub mod types;
