//! # Provenance Governor
//!
//! CI steps for a software supply-chain governor service.
//!
//! ## Publish
//!
//! - Asks the attestation publisher to derive attestations for a subject
//!   (package URL plus sha256 digest) from one or more build scans
//! - Renders every stored attestation into the step summary, with links to
//!   the attestation store and the decoded in-toto predicate
//!
//! ## Evaluate
//!
//! - Asks the policy evaluator to run a named policy scan against the
//!   subject's attestations
//! - Groups the flat evaluation records per policy, derives the overall
//!   verdict and renders it with a detail section per failing policy
//! - Policies whose labels match an ignore set are shown but never fail
//!   the step
//!
//! Both steps go through the same pipeline:
//!
//! ```text
//! inputs -> Client -> (status, payload) -> classify -> Reporter -> Summary
//!                                                         |
//!                                                     StepStatus
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use provenance_governor::{policy, ApiClient, Credentials, ReportContext, StepStatus, Summary};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new("https://governor.example.com", Credentials::Token(token));
//!
//!     let mut summary = Summary::new();
//!     let mut step = StepStatus::github();
//!     let mut ctx = ReportContext::new(&mut summary, &mut step, true);
//!     let verdict = policy::run(&client, client.base_url(), &inputs, &mut ctx).await?;
//!
//!     summary.write(Path::new(&std::env::var("GITHUB_STEP_SUMMARY")?))?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod policy;
pub mod publish;
pub mod report;
pub mod statement;
pub mod step;
pub mod subject;
pub mod summary;

pub use client::{ApiClient, Client, ClientResult, Credentials};
pub use error::{Error, Result};
pub use report::{ReportContext, Reporter, Verdict};
pub use step::StepStatus;
pub use subject::{Digest, PackageUrl};
pub use summary::Summary;
