//! Chunked upload: bounded write loop into a native upload stream.

use tracing::{debug, warn};

use skylift_boundary::handle::kind;
use skylift_boundary::{Error, NativeHandle, check, translate};
use skylift_client::Project;

use crate::session::TransferSession;
use crate::source::ByteSource;
use crate::TransferOptions;

/// Uploads the full contents of `source` to `bucket`/`key`.
///
/// Opens one upload stream, writes chunks of at most
/// `options.chunk_size` bytes, commits, and releases the stream handle
/// on every exit path. A write call that reports zero bytes on a
/// non-empty request ends the loop gracefully and the stream is
/// committed with whatever it accepted; all other failures release the
/// stream without committing.
pub fn upload(
    project: &Project,
    bucket: &str,
    key: &str,
    source: &mut dyn ByteSource,
    options: &TransferOptions,
) -> Result<(), Error> {
    let result = project.handle().boundary().upload_object(
        project.handle().raw()?,
        bucket,
        key,
        &options.to_raw_upload(),
    );
    // Open failure leaves nothing to release.
    let stream: NativeHandle<kind::UploadStream> =
        NativeHandle::open(project.handle().boundary_arc().clone(), result)?;

    let total = match source.total_len() {
        Ok(total) => total,
        Err(err) => {
            let _ = stream.release();
            return Err(err);
        }
    };
    let mut session = TransferSession::new(options.effective_chunk_size(), total);
    debug!(
        bucket,
        key,
        total_bytes = total,
        chunk_size = session.chunk_size(),
        "upload stream opened"
    );

    if let Err(err) = write_chunks(&stream, source, &mut session) {
        session.mark_failed(&err);
        // Cancel instead of committing; the release reclaims the handle
        // whether or not the abort went through.
        if let Ok(raw) = stream.raw() {
            let _ = stream.boundary().upload_abort(raw);
        }
        let _ = stream.release();
        return Err(err);
    }

    // Commit whatever the stream accepted, full or partial.
    session.begin_commit();
    let commit_error = translate(stream.boundary().upload_commit(stream.raw()?));
    let released = stream.release();
    if let Some(err) = commit_error {
        session.mark_failed(&err);
        return Err(err);
    }
    released?;
    session.close();
    debug!(
        bucket,
        key,
        transferred_bytes = session.transferred_bytes(),
        "upload committed"
    );
    Ok(())
}

/// Drives the write loop until the source is exhausted or the stream
/// stops accepting bytes.
fn write_chunks(
    stream: &NativeHandle<kind::UploadStream>,
    source: &mut dyn ByteSource,
    session: &mut TransferSession,
) -> Result<(), Error> {
    while !session.is_complete() {
        let want = session.next_want();
        if want == 0 {
            break;
        }

        // Fresh, right-sized staging buffer per iteration; reads are
        // offset-addressed so a retry would see identical bytes.
        let mut chunk = vec![0u8; want];
        source.read_at(session.transferred_bytes(), &mut chunk)?;

        let result = stream
            .boundary()
            .upload_write(stream.raw()?, &chunk, want);
        check(result.error)?;

        if result.bytes_written == 0 {
            // Stalled stream: stop writing, let the caller commit the
            // accepted prefix.
            warn!(
                transferred_bytes = session.transferred_bytes(),
                total_bytes = session.total_bytes(),
                "upload write made no progress, ending loop"
            );
            break;
        }

        // The boundary may accept less than requested.
        session.advance(result.bytes_written as u64);
    }
    Ok(())
}
