//! inspect::fetch
//!
//! Fetch and validate the metadata document of one block.

use crate::core::block::BlockEntry;
use crate::core::meta::{parse_meta, BlockMeta};
use crate::objstore::{Bucket, ObjectReader};

use super::error::InspectError;
use super::walker::Deadline;

/// Read `<entry>/meta.json` from the bucket and decode it.
///
/// The object reader is released before decoding starts and on every error
/// path. Raw bytes never leave this function: callers only ever see a
/// validated [`BlockMeta`].
///
/// # Errors
///
/// - `FetchFailed` if the object cannot be opened or read
/// - `DecodeFailed` if the document is malformed, fails validation, or
///   names a different block than the entry it was found under
/// - `DeadlineExceeded` if the deadline passes while reading
pub async fn fetch_meta(
    bucket: &dyn Bucket,
    entry: &BlockEntry,
    deadline: &Deadline,
) -> Result<BlockMeta, InspectError> {
    let path = entry.meta_path();

    let bytes = {
        let mut reader = deadline
            .run(bucket.get(&path))
            .await?
            .map_err(|source| InspectError::FetchFailed {
                path: path.clone(),
                source,
            })?;
        read_to_end(reader.as_mut(), &path, deadline).await?
    };

    tracing::debug!(path = %path, bytes = bytes.len(), "fetched metadata");

    let meta = parse_meta(&bytes).map_err(|e| InspectError::DecodeFailed {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    if meta.ulid != entry.id() {
        return Err(InspectError::DecodeFailed {
            path,
            reason: format!(
                "ulid {} does not match block directory {}",
                meta.ulid,
                entry.id()
            ),
        });
    }

    Ok(meta)
}

async fn read_to_end(
    reader: &mut dyn ObjectReader,
    path: &str,
    deadline: &Deadline,
) -> Result<Vec<u8>, InspectError> {
    let mut buf = Vec::new();
    loop {
        let chunk = deadline
            .run(reader.next_chunk())
            .await?
            .map_err(|source| InspectError::FetchFailed {
                path: path.to_string(),
                source,
            })?;
        match chunk {
            Some(bytes) => buf.extend_from_slice(&bytes),
            None => return Ok(buf),
        }
    }
}
