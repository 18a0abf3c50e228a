//! Command-line interface for promptforge.
//!
//! Stage commands (`sample`, `synthesize`, `judge`, `self-play`, `verify`)
//! operate on JSONL files; `pipeline` runs them end to end.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
