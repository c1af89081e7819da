#[cfg(feature = "cli")]
pub mod cli_summary;
pub mod report;
