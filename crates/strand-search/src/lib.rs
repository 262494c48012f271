//! Search drivers for the strand model checker.
//!
//! A search repeatedly asks the interpreter to run one transition, keeps
//! snapshots of the states in front of open choice points and restores
//! them to try the remaining choices. Strategies differ only in which
//! open choice they take next:
//! - `RandomSearch` samples whole paths, restarting from the initial state
//! - `DfsSearch` backtracks exhaustively, optionally matching states
//! - `HeuristicSearch` expands the best open choice first

pub mod config;
pub mod dfs;
pub mod driver;
pub mod footprint;
pub mod heuristic;
pub mod listener;
pub mod property;
pub mod random;
pub mod types;

pub use config::SearchConfig;
pub use dfs::DfsSearch;
pub use driver::{SearchCore, SearchStrategy};
pub use footprint::{FootprintMonitor, FootprintSamples};
pub use heuristic::{BreadthFirst, Heuristic, HeuristicSearch, PreferThreadSwitch};
pub use listener::{SearchContext, SearchListener};
pub use property::{NoUncaughtExceptions, NotDeadlocked, Property};
pub use random::RandomSearch;
pub use types::{SearchError, SearchReport, SearchStats, Violation};
