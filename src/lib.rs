//! Next-day price change forecasts from daily phrase frequencies in a comment stream.
//!
//! Raw comments are folded into per-day n-gram counts, daily quotes into a
//! price table, and a walk-forward linear regression maps one day's phrase
//! counts onto the next day's percent changes without ever looking ahead.

pub mod align;
pub mod config;
pub mod corpus;
pub mod data;
pub mod error;
pub mod features;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod prediction;
pub mod prelude;
pub mod prices;
pub mod report;
pub mod source;
pub mod store;
pub mod trainer;
