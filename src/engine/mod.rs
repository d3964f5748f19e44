//! Core engine: the scan → evaluate → alert loop and its lifecycle.

pub mod scanner;
pub mod shutdown;
pub mod stats;

pub use scanner::{RunSummary, Scanner, ScannerOptions, ScannerState};
pub use shutdown::{Shutdown, ShutdownTrigger};
