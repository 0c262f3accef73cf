fn main() {
    println!("Run `cargo test -p roundtrip` to execute end-to-end transfer tests.");
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use skylift_boundary::NativeBoundary;
    use skylift_boundary::error::code;
    use skylift_boundary::memory::{HandleClass, MemoryBoundary, Op};
    use skylift_boundary::Error;
    use skylift_client::{Access, ListObjectsOptions, Permission, Project, SharePrefix};
    use skylift_transfer::{DEFAULT_CHUNK_SIZE, TransferOptions, download, upload};

    fn boundary() -> Arc<MemoryBoundary> {
        Arc::new(MemoryBoundary::new())
    }

    fn open_project(b: &Arc<MemoryBoundary>) -> (Access, Project) {
        let access = Access::request_with_passphrase(
            b.clone() as Arc<dyn NativeBoundary>,
            "sat.test:7777",
            "api-key",
            "secret",
        )
        .unwrap();
        let project = Project::open(&access).unwrap();
        (access, project)
    }

    /// Deterministic non-repeating payload so misplaced chunks are
    /// detected, not masked.
    fn payload(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| (i % 251) as u8 ^ (i / 251) as u8)
            .collect()
    }

    #[test]
    fn upload_then_download_preserves_bytes_across_sizes() {
        // Around the chunk boundary on both sides, plus empty and large.
        for len in [0usize, 1, 255, 256, 257, 10_000] {
            let b = boundary();
            let (access, project) = open_project(&b);
            project.ensure_bucket("media").unwrap();

            let data = payload(len);
            let mut source = Cursor::new(data.clone());
            upload(
                &project,
                "media",
                "payload.bin",
                &mut source,
                &TransferOptions::default(),
            )
            .unwrap();

            let stat = project.stat_object("media", "payload.bin").unwrap();
            assert_eq!(stat.content_length, len as u64, "len {len}");

            let mut sink = Cursor::new(Vec::new());
            download(
                &project,
                "media",
                "payload.bin",
                &mut sink,
                &TransferOptions::default(),
            )
            .unwrap();
            assert_eq!(sink.get_ref(), &data, "len {len}");

            project.close().unwrap();
            access.close().unwrap();
            assert_eq!(b.live_handles(), 0, "len {len}");
        }
    }

    #[test]
    fn chunk_counts_match_size_over_default_chunk() {
        let b = boundary();
        let (_access, project) = open_project(&b);
        project.ensure_bucket("media").unwrap();

        let len = 10_000usize;
        let chunks = len.div_ceil(DEFAULT_CHUNK_SIZE as usize) as u64;

        let mut source = Cursor::new(payload(len));
        upload(
            &project,
            "media",
            "payload.bin",
            &mut source,
            &TransferOptions::default(),
        )
        .unwrap();
        assert_eq!(b.calls(Op::UploadWrite), chunks);

        let mut sink = Cursor::new(Vec::new());
        download(
            &project,
            "media",
            "payload.bin",
            &mut sink,
            &TransferOptions::default(),
        )
        .unwrap();
        assert_eq!(b.calls(Op::DownloadRead), chunks);
    }

    #[test]
    fn file_backed_roundtrip() {
        let b = boundary();
        let (_access, project) = open_project(&b);
        project.ensure_bucket("media").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.bin");
        let out_path = dir.path().join("out.bin");
        let data = payload(4096 + 17);
        std::fs::write(&in_path, &data).unwrap();

        let mut source = std::fs::File::open(&in_path).unwrap();
        upload(
            &project,
            "media",
            "file.bin",
            &mut source,
            &TransferOptions::default(),
        )
        .unwrap();

        let mut sink = std::fs::File::create(&out_path).unwrap();
        download(
            &project,
            "media",
            "file.bin",
            &mut sink,
            &TransferOptions::default(),
        )
        .unwrap();
        drop(sink);

        assert_eq!(std::fs::read(&out_path).unwrap(), data);
    }

    /// The full first-contact walkthrough: request a grant, open the
    /// project, create a bucket, upload, list, download, derive and
    /// re-parse a shared grant, then tear everything down, recovering
    /// from the non-empty bucket on the way out.
    #[test]
    fn full_walkthrough() {
        let b = boundary();
        let access = Access::request_with_passphrase(
            b.clone() as Arc<dyn NativeBoundary>,
            "sat.test:7777",
            "api-key",
            "secret",
        )
        .unwrap();
        let project = Project::open(&access).unwrap();

        let bucket = project.ensure_bucket("my-first-bucket").unwrap();
        assert_eq!(bucket.name, "my-first-bucket");

        let data = payload(1337);
        let mut source = Cursor::new(data.clone());
        upload(
            &project,
            "my-first-bucket",
            "docs/hello.bin",
            &mut source,
            &TransferOptions::default(),
        )
        .unwrap();

        let listed = project
            .list_objects("my-first-bucket", &ListObjectsOptions::recursive())
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "docs/hello.bin");
        assert_eq!(listed[0].content_length, 1337);

        let mut sink = Cursor::new(Vec::new());
        download(
            &project,
            "my-first-bucket",
            "docs/hello.bin",
            &mut sink,
            &TransferOptions::default(),
        )
        .unwrap();
        assert_eq!(sink.get_ref(), &data);

        // Derive a read-only grant, hand it over as a string, and use it
        // from the other side.
        let shared = access
            .share(
                Permission {
                    allow_download: true,
                    allow_list: true,
                    ..Permission::default()
                },
                &[SharePrefix::bucket("my-first-bucket")],
            )
            .unwrap();
        let serialized = shared.serialize().unwrap();
        let reparsed = Access::parse(b.clone() as Arc<dyn NativeBoundary>, &serialized).unwrap();
        let shared_project = Project::open(&reparsed).unwrap();

        let mut shared_sink = Cursor::new(Vec::new());
        download(
            &shared_project,
            "my-first-bucket",
            "docs/hello.bin",
            &mut shared_sink,
            &TransferOptions::default(),
        )
        .unwrap();
        assert_eq!(shared_sink.get_ref(), &data);

        // The read-only grant cannot write.
        let mut denied_source = Cursor::new(payload(8));
        let err = upload(
            &shared_project,
            "my-first-bucket",
            "docs/other.bin",
            &mut denied_source,
            &TransferOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("permission denied"));

        shared_project.close().unwrap();
        reparsed.close().unwrap();
        shared.close().unwrap();

        // Deleting a non-empty bucket fails; empty it first.
        let err = project.delete_bucket("my-first-bucket").unwrap_err();
        assert!(matches!(err, Error::BucketNotEmpty(_)));
        for obj in project
            .list_objects("my-first-bucket", &ListObjectsOptions::recursive())
            .unwrap()
        {
            project.delete_object("my-first-bucket", &obj.key).unwrap();
        }
        project.delete_bucket("my-first-bucket").unwrap();

        project.close().unwrap();
        access.close().unwrap();
        assert_eq!(b.live_handles(), 0);
    }

    /// Every handle class opened anywhere in a busy session is freed
    /// exactly as many times as it was opened, on success and failure
    /// paths alike.
    #[test]
    fn handle_accounting_balances_after_mixed_outcomes() {
        let b = boundary();
        let (access, project) = open_project(&b);
        project.ensure_bucket("media").unwrap();

        // Successful transfer.
        let mut source = Cursor::new(payload(600));
        upload(
            &project,
            "media",
            "ok.bin",
            &mut source,
            &TransferOptions::default(),
        )
        .unwrap();

        // Failed upload mid-loop.
        b.fail_next(Op::UploadWrite, code::INTERNAL, "segment store unreachable");
        let mut source = Cursor::new(payload(600));
        upload(
            &project,
            "media",
            "bad.bin",
            &mut source,
            &TransferOptions::default(),
        )
        .unwrap_err();

        // Failed download mid-loop.
        b.fail_next(Op::DownloadRead, code::CANCELED, "shutting down");
        let mut sink = Cursor::new(Vec::new());
        download(
            &project,
            "media",
            "ok.bin",
            &mut sink,
            &TransferOptions::default(),
        )
        .unwrap_err();

        // Successful download after the failures.
        let mut sink = Cursor::new(Vec::new());
        download(
            &project,
            "media",
            "ok.bin",
            &mut sink,
            &TransferOptions::default(),
        )
        .unwrap();

        // Stat, list, delete churn.
        project.stat_object("media", "ok.bin").unwrap();
        project.stat_object("media", "missing.bin").unwrap_err();
        project
            .list_objects("media", &ListObjectsOptions::recursive())
            .unwrap();
        project.delete_object("media", "ok.bin").unwrap();

        project.close().unwrap();
        access.close().unwrap();

        for class in [
            HandleClass::Access,
            HandleClass::Project,
            HandleClass::Upload,
            HandleClass::Download,
            HandleClass::ObjectIterator,
            HandleClass::ObjectResult,
            HandleClass::BucketResult,
        ] {
            assert_eq!(
                b.open_count(class),
                b.free_count(class),
                "unbalanced {class:?}"
            );
        }
        assert_eq!(b.live_handles(), 0);
    }

    #[test]
    fn custom_chunk_size_roundtrip() {
        let b = boundary();
        let (_access, project) = open_project(&b);
        project.ensure_bucket("media").unwrap();

        let data = payload(1000);
        let mut source = Cursor::new(data.clone());
        upload(
            &project,
            "media",
            "big-chunks.bin",
            &mut source,
            &TransferOptions::default().with_chunk_size(4096),
        )
        .unwrap();
        // One write is enough when the chunk covers the payload.
        assert_eq!(b.calls(Op::UploadWrite), 1);

        let mut sink = Cursor::new(Vec::new());
        download(
            &project,
            "media",
            "big-chunks.bin",
            &mut sink,
            &TransferOptions::default().with_chunk_size(64),
        )
        .unwrap();
        assert_eq!(sink.get_ref(), &data);
        assert_eq!(b.calls(Op::DownloadRead), 1000u64.div_ceil(64));
    }
}
