//! Repository review round-trip.
//!
//! Packs a git repository into a self-contained zip bundle, hands it to a
//! reviewing agent (remote API or a human in manual mode), waits for the
//! response, and applies the unified diff the reviewer returns. The crate
//! keeps the same split throughout:
//!
//! - **[`core`]**: Pure text and payload logic (sanitizing, extraction, the
//!   `.git/**` gate). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git, zip, HTTP, filesystem waits).
//!
//! [`review`] coordinates the two to implement one CLI run.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod review;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
