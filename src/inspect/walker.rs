//! inspect::walker
//!
//! One-level, paged enumeration of a bucket prefix.
//!
//! # Design
//!
//! [`walk`] lists the immediate children of a prefix page by page and hands
//! each entry to an [`EntryVisitor`] in the order the backend returned it.
//! Processing is strictly sequential: an entry is fully visited before the
//! next one is looked at, and the next page is only requested once every
//! entry of the current page has been visited.
//!
//! The first error ends the walk. No further entries are visited, no further
//! pages are requested, and nothing is retried.
//!
//! A single [`Deadline`] bounds the whole walk. It is checked before the
//! first listing call and before each visit, and every listing await is cut
//! off when it passes. Output already produced by the visitor stays.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::error::InspectError;
use crate::core::block::normalize_prefix;
use crate::objstore::Bucket;

/// Upper bound used when a requested timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Absolute point in time by which a walk must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at, timeout }
    }

    /// Check if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Fail with `DeadlineExceeded` if the deadline has passed.
    pub fn check(&self) -> Result<(), InspectError> {
        if self.is_expired() {
            return Err(self.exceeded());
        }
        Ok(())
    }

    /// Await `fut`, giving up when the deadline passes.
    ///
    /// An already expired deadline fails without polling `fut`.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, InspectError>
    where
        F: Future,
    {
        self.check()?;
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| self.exceeded())
    }

    fn exceeded(&self) -> InspectError {
        InspectError::DeadlineExceeded {
            timeout: self.timeout,
        }
    }
}

/// Receives entries from [`walk`], one at a time.
#[async_trait]
pub trait EntryVisitor: Send {
    /// Process one entry name exactly as the bucket reported it.
    ///
    /// Returning an error stops the walk.
    async fn visit(&mut self, entry: &str) -> Result<(), InspectError>;
}

/// Counters from a completed walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Entries visited
    pub entries: usize,
    /// Listing pages fetched
    pub pages: usize,
}

/// Visit every immediate child of `prefix` in backend order.
///
/// An empty prefix walks the bucket root; any other prefix is normalized to
/// end in exactly one `/`.
///
/// # Errors
///
/// - `EnumerationFailed` if a listing call fails
/// - `Entry` wrapping the visitor's error for the entry it failed on
/// - `DeadlineExceeded` if the deadline passes
pub async fn walk(
    bucket: &dyn Bucket,
    prefix: &str,
    deadline: &Deadline,
    visitor: &mut dyn EntryVisitor,
) -> Result<WalkSummary, InspectError> {
    let dir = normalize_prefix(prefix);
    let mut summary = WalkSummary::default();
    let mut page_token: Option<String> = None;

    deadline.check()?;

    loop {
        let page = deadline
            .run(bucket.list_page(&dir, page_token.as_deref()))
            .await?
            .map_err(|e| InspectError::EnumerationFailed {
                prefix: dir.clone(),
                reason: e.to_string(),
            })?;
        summary.pages += 1;

        tracing::debug!(
            bucket = bucket.name(),
            prefix = %dir,
            page = summary.pages,
            entries = page.entries.len(),
            "listed page"
        );

        for entry in &page.entries {
            deadline.check()?;
            visitor
                .visit(entry)
                .await
                .map_err(|e| InspectError::entry(entry.as_str(), e))?;
            summary.entries += 1;
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    tracing::debug!(
        bucket = bucket.name(),
        entries = summary.entries,
        pages = summary.pages,
        "walk complete"
    );
    Ok(summary)
}
