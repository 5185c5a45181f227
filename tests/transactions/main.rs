//! Transaction Integration Tests
//!
//! Tests snapshot isolation, first-committer-wins and commit atomicity as
//! observed through cursors, including under real thread concurrency.

#[path = "../common/mod.rs"]
mod common;

mod concurrent_commits;
