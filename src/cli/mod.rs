//! `tabcast` command line.

pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod runtime;
pub mod selection;
pub mod send;
pub mod sites;

pub use app::run;
