//! Chunked download: bounded read loop from a native download stream.

use tracing::{debug, warn};

use skylift_boundary::handle::kind;
use skylift_boundary::{Error, NativeHandle, RawDownloadOptions, check, translate};
use skylift_client::Project;

use crate::session::TransferSession;
use crate::source::ByteSink;
use crate::{MAX_ZERO_READS, TransferOptions};

/// Downloads the full object at `bucket`/`key` into `sink`.
///
/// Stats the object first to learn the expected size, then reads chunks
/// of at most `options.chunk_size` bytes until every byte has landed.
/// Short reads are retried from the new offset; a run of
/// [`MAX_ZERO_READS`] empty reads fails the transfer as stalled, and a
/// stream that produces more bytes than the stat reported fails with a
/// size mismatch before anything extra reaches the sink. The stream
/// handle is released on every exit path.
pub fn download(
    project: &Project,
    bucket: &str,
    key: &str,
    sink: &mut dyn ByteSink,
    options: &TransferOptions,
) -> Result<(), Error> {
    // Size discovery happens before any stream exists, so a missing
    // object never opens a handle.
    let stat = project.stat_object(bucket, key)?;
    let total = stat.content_length;

    let result = project.handle().boundary().download_object(
        project.handle().raw()?,
        bucket,
        key,
        &RawDownloadOptions::default(),
    );
    let stream: NativeHandle<kind::DownloadStream> =
        NativeHandle::open(project.handle().boundary_arc().clone(), result)?;

    let mut session = TransferSession::new(options.effective_chunk_size(), total);
    debug!(
        bucket,
        key,
        total_bytes = total,
        chunk_size = session.chunk_size(),
        "download stream opened"
    );

    if let Err(err) = read_chunks(&stream, sink, &mut session) {
        session.mark_failed(&err);
        // No close call on a failed stream, just the free.
        let _ = stream.release();
        return Err(err);
    }

    session.begin_commit();
    let close_error = translate(stream.boundary().close_download(stream.raw()?));
    let released = stream.release();
    if let Some(err) = close_error {
        session.mark_failed(&err);
        return Err(err);
    }
    released?;
    session.close();
    debug!(
        bucket,
        key,
        transferred_bytes = session.transferred_bytes(),
        "download complete"
    );
    Ok(())
}

/// Drives the read loop until the session reaches its total.
fn read_chunks(
    stream: &NativeHandle<kind::DownloadStream>,
    sink: &mut dyn ByteSink,
    session: &mut TransferSession,
) -> Result<(), Error> {
    let mut zero_reads: u32 = 0;
    while !session.is_complete() {
        let want = session.next_want();
        let result = stream.boundary().download_read(stream.raw()?, want);
        check(result.error)?;

        let n = result.bytes_read;
        if n == 0 {
            zero_reads += 1;
            if zero_reads >= MAX_ZERO_READS {
                warn!(
                    transferred_bytes = session.transferred_bytes(),
                    total_bytes = session.total_bytes(),
                    "download made no progress, giving up"
                );
                return Err(Error::StalledTransfer {
                    transferred: session.transferred_bytes(),
                    total: session.total_bytes(),
                });
            }
            continue;
        }
        zero_reads = 0;

        // Checked before the write so the sink never sees excess bytes.
        let landed = session.transferred_bytes() + n as u64;
        if landed > session.total_bytes() {
            return Err(Error::SizeMismatch {
                expected: session.total_bytes(),
                actual: landed,
            });
        }

        let data = result
            .data
            .get(..n)
            .ok_or_else(|| Error::Internal("read reported more bytes than delivered".into()))?;
        sink.write_at(session.transferred_bytes(), data)?;
        session.advance(n as u64);
    }
    Ok(())
}
