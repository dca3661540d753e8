//! Command line tool inspecting the Bitbreadcrumb unspent transaction output set.

pub mod cli;
mod commands;
mod error;

pub use self::error::{Error, Result};
