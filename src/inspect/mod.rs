//! inspect
//!
//! Listing and inspection of blocks stored in a bucket.
//!
//! # Pipeline
//!
//! [`list_blocks`] drives one invocation:
//!
//! 1. The [`walker`] enumerates the immediate children of the prefix
//! 2. Each entry is validated as a block directory ([`BlockEntry`])
//! 3. If the output format prints metadata, [`fetch`] reads and validates
//!    `meta.json`
//! 4. The [`render`] module writes one record to the output
//!
//! Entries are processed one at a time in enumeration order. The first error
//! of any stage ends the pipeline; output written for earlier entries stays.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use blockscope::inspect::{list_blocks, Deadline, OutputFormat};
//! use blockscope::objstore::memory::MemoryBucket;
//!
//! # tokio_test::block_on(async {
//! let bucket = MemoryBucket::new("test")
//!     .with_object("01ABC/meta.json", "{}")
//!     .with_object("01DEF/meta.json", "{}");
//!
//! let mut out = Vec::new();
//! let deadline = Deadline::after(Duration::from_secs(60));
//! let summary = list_blocks(&bucket, "", OutputFormat::NameOnly, &deadline, &mut out)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(summary.blocks, 2);
//! assert_eq!(out, b"01ABC\n01DEF\n");
//! # });
//! ```

mod error;
pub mod fetch;
pub mod render;
pub mod template;
pub mod walker;

use std::io::Write;

use async_trait::async_trait;

use crate::core::block::BlockEntry;
use crate::objstore::Bucket;

pub use error::{ErrorKind, InspectError};
pub use fetch::fetch_meta;
pub use render::{OutputFormat, Renderer};
pub use walker::{walk, Deadline, EntryVisitor, WalkSummary};

/// Result of a completed listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListSummary {
    /// Blocks written to the output
    pub blocks: usize,
}

/// Visitor that runs every entry through parse, fetch and render.
struct BlockPrinter<'a, W: Write> {
    bucket: &'a dyn Bucket,
    deadline: &'a Deadline,
    prefix: &'a str,
    renderer: Renderer<W>,
    blocks: usize,
}

#[async_trait]
impl<W: Write + Send> EntryVisitor for BlockPrinter<'_, W> {
    async fn visit(&mut self, entry: &str) -> Result<(), InspectError> {
        let block = BlockEntry::parse(entry).map_err(|e| InspectError::EnumerationFailed {
            prefix: self.prefix.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(entry = %block, "processing block");

        if self.renderer.needs_meta() {
            let meta = fetch_meta(self.bucket, &block, self.deadline).await?;
            self.renderer.render(&block, Some(&meta))?;
        } else {
            self.renderer.render(&block, None)?;
        }

        self.blocks += 1;
        Ok(())
    }
}

/// List the blocks under `prefix`, writing one record per block to `out`.
///
/// `format` has already been parsed, so a bad template is reported before
/// any bucket access.
///
/// # Errors
///
/// The first error of the walk. Errors raised while processing an entry are
/// wrapped in `InspectError::Entry`; use [`InspectError::kind`] to classify.
pub async fn list_blocks<W: Write + Send>(
    bucket: &dyn Bucket,
    prefix: &str,
    format: OutputFormat,
    deadline: &Deadline,
    out: W,
) -> Result<ListSummary, InspectError> {
    let mut printer = BlockPrinter {
        bucket,
        deadline,
        prefix,
        renderer: Renderer::new(format, out),
        blocks: 0,
    };

    let result = walk(bucket, prefix, deadline, &mut printer).await;
    // Whatever was rendered before a failure is still delivered.
    let flushed = printer.renderer.flush();
    let summary = result?;
    flushed?;

    tracing::info!(
        bucket = bucket.name(),
        blocks = printer.blocks,
        pages = summary.pages,
        "listed blocks"
    );

    Ok(ListSummary {
        blocks: printer.blocks,
    })
}
