//! Pipeline sweeper library.
//!
//! Removes finished CI pipelines that were last updated before a retention
//! cutoff, one listing page at a time, through the CI server's REST API.
//!
//! ```no_run
//! # async fn run() -> Result<(), pipeline_sweeper::sweeper::SweepError> {
//! let summary = pipeline_sweeper::sweeper::sweep(
//!     "https://gitlab.com/api/v4/projects/42/pipelines",
//!     "glpat-xxxx",
//!     100,
//!     Some("1 week"),
//! )
//! .await?;
//! println!("deleted {} pipelines", summary.deleted.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
#[cfg(feature = "cli")]
pub mod observability;
pub mod sweeper;

#[cfg(test)]
mod tests;
