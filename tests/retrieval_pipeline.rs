use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use chamberlab::retrieval::{
    self, archive_file_name, digest_bytes, extract_archive, CancelToken, ChecksumAlgorithm,
    FileSource, Retriever,
};
use chamberlab::{LabError, RemoteArchiveDescriptor, RetrievalOptions};
use walkdir::WalkDir;

mod common;

use common::MemorySource;

const URL: &str = "https://example.org/datasets/lt_demo_v1.zip";

fn root_entries(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .expect("read root")
        .map(|entry| {
            entry
                .expect("entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

#[test]
fn verified_archive_becomes_dataset() {
    let root = tempfile::tempdir().expect("tempdir");
    let payload = common::tabular_archive();
    let checksum = digest_bytes(&payload, ChecksumAlgorithm::Sha256);
    let source = MemorySource::new(payload);

    let descriptor =
        RemoteArchiveDescriptor::new(URL).with_checksum(checksum, ChecksumAlgorithm::Sha256);
    let dataset = Retriever::with_source(&source)
        .retrieve(&descriptor, root.path(), "lt_demo_v1", RetrievalOptions::default())
        .expect("retrieve");

    assert_eq!(dataset.root(), root.path().join("lt_demo_v1"));
    assert_eq!(dataset.observations().expect("observations").len(), 3);
    assert_eq!(root_entries(root.path()), vec!["lt_demo_v1".to_string()]);
}

#[test]
fn checksum_mismatch_leaves_nothing_behind() {
    let root = tempfile::tempdir().expect("tempdir");
    let payload = common::tabular_archive();
    let mut wrong = digest_bytes(&payload, ChecksumAlgorithm::Sha256);
    let last = if wrong.ends_with('0') { "1" } else { "0" };
    wrong.replace_range(wrong.len() - 1.., last);
    let source = MemorySource::new(payload);

    let descriptor =
        RemoteArchiveDescriptor::new(URL).with_checksum(wrong.clone(), ChecksumAlgorithm::Sha256);
    let err = Retriever::with_source(&source)
        .retrieve(&descriptor, root.path(), "lt_demo_v1", RetrievalOptions::default())
        .expect_err("checksum mismatch");

    match err {
        LabError::Integrity { expected, computed } => {
            assert_eq!(expected, wrong);
            assert_ne!(computed, wrong);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!root.path().join("lt_demo_v1").exists());
    assert!(!root.path().join(archive_file_name(URL)).exists());
    assert!(root_entries(root.path()).is_empty());
}

#[test]
fn md5_checksum_is_accepted_in_uppercase() {
    let root = tempfile::tempdir().expect("tempdir");
    let payload = common::tabular_archive();
    let checksum = digest_bytes(&payload, ChecksumAlgorithm::Md5).to_uppercase();
    let source = MemorySource::new(payload);

    let descriptor =
        RemoteArchiveDescriptor::new(URL).with_checksum(checksum, ChecksumAlgorithm::Md5);
    Retriever::with_source(&source)
        .retrieve(&descriptor, root.path(), "ds", RetrievalOptions::default())
        .expect("retrieve");
}

#[test]
fn cached_dataset_is_reused_without_download() {
    let root = tempfile::tempdir().expect("tempdir");
    common::write_tabular_dataset(&root.path().join("ds"));
    let source = MemorySource::new(common::tabular_archive());

    let dataset = Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default(),
        )
        .expect("retrieve");

    assert_eq!(source.opens(), 0);
    assert_eq!(dataset.observations().expect("observations").len(), 3);
}

#[test]
fn force_refresh_downloads_again() {
    let root = tempfile::tempdir().expect("tempdir");
    let dataset_dir = root.path().join("ds");
    common::write_tabular_dataset(&dataset_dir);
    fs::write(dataset_dir.join("stale.txt"), "old").expect("write stale file");
    let source = MemorySource::new(common::tabular_archive());

    Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default().force_refresh(),
        )
        .expect("retrieve");

    assert_eq!(source.opens(), 1);
    assert!(!dataset_dir.join("stale.txt").exists());
}

#[test]
fn broken_cache_is_replaced() {
    let root = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(root.path().join("ds")).expect("create empty dataset dir");
    let source = MemorySource::new(common::tabular_archive());

    let dataset = Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default(),
        )
        .expect("retrieve");

    assert_eq!(source.opens(), 1);
    assert_eq!(dataset.observations().expect("observations").len(), 3);
}

#[test]
fn file_at_dataset_path_is_rejected_before_download() {
    let root = tempfile::tempdir().expect("tempdir");
    fs::write(root.path().join("ds"), b"not a directory").expect("write");
    let source = MemorySource::new(common::tabular_archive());

    for options in [
        RetrievalOptions::default(),
        RetrievalOptions::default().force_refresh(),
    ] {
        let err = Retriever::with_source(&source)
            .retrieve(&RemoteArchiveDescriptor::new(URL), root.path(), "ds", options)
            .expect_err("occupied");
        assert!(matches!(err, LabError::DatasetPathOccupied { .. }), "got {err:?}");
    }

    assert_eq!(source.opens(), 0);
    assert_eq!(root_entries(root.path()), vec!["ds"]);
    assert_eq!(
        fs::read(root.path().join("ds")).expect("read"),
        b"not a directory"
    );
}

#[test]
fn wrapped_archive_is_unwrapped() {
    let root = tempfile::tempdir().expect("tempdir");
    let source = MemorySource::new(common::image_archive("lt_camera_v1"));

    let dataset = Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "camera",
            RetrievalOptions::default(),
        )
        .expect("retrieve");

    assert!(root.path().join("camera/manifest.yaml").is_file());
    assert_eq!(dataset.image_count().expect("count"), 3);
}

#[test]
fn archive_without_manifest_is_rejected_and_cleaned_up() {
    let root = tempfile::tempdir().expect("tempdir");
    let source = MemorySource::new(common::zip_bytes(&[(
        "data.csv",
        common::OBSERVATIONS_CSV.as_bytes(),
    )]));

    let err = Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default(),
        )
        .expect_err("no manifest");

    assert!(matches!(
        err,
        LabError::MissingResource {
            what: "manifest",
            ..
        }
    ));
    assert!(root_entries(root.path()).is_empty());
}

#[test]
fn corrupt_archive_is_reported() {
    let root = tempfile::tempdir().expect("tempdir");
    let source = MemorySource::new(b"definitely not a zip file".to_vec());

    let err = Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default(),
        )
        .expect_err("corrupt archive");

    assert!(matches!(err, LabError::CorruptArchive { .. }));
    assert!(root_entries(root.path()).is_empty());
}

#[test]
fn keep_archive_retains_the_zip() {
    let root = tempfile::tempdir().expect("tempdir");
    let source = MemorySource::new(common::tabular_archive());

    Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default().keep_archive(true),
        )
        .expect("retrieve");

    assert!(root.path().join(archive_file_name(URL)).is_file());
}

#[test]
fn cancelled_retrieval_downloads_nothing() {
    let root = tempfile::tempdir().expect("tempdir");
    let source = MemorySource::new(common::tabular_archive());
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default().with_cancel(cancel),
        )
        .expect_err("cancelled");

    assert!(matches!(err, LabError::Cancelled { .. }));
    assert_eq!(source.opens(), 0);
    assert!(root_entries(root.path()).is_empty());
}

/// Serves headers and a few body bytes, then goes silent.
fn stalling_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: 100000\r\n\r\nPK\x03",
            );
            let _ = stream.flush();
            thread::sleep(Duration::from_secs(20));
        }
    });
    format!("http://{addr}/stalled.zip")
}

#[test]
fn deadline_interrupts_stalled_transfer() {
    let root = tempfile::tempdir().expect("tempdir");
    let url = stalling_server();

    let started = Instant::now();
    let err = retrieval::retrieve(
        &RemoteArchiveDescriptor::new(url),
        root.path(),
        "ds",
        RetrievalOptions::default().with_cancel(CancelToken::with_timeout(Duration::from_secs(1))),
    )
    .expect_err("stalled download");

    assert!(matches!(err, LabError::Cancelled { .. }), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(root_entries(root.path()).is_empty());
}

#[test]
fn progress_reaches_archive_size() {
    let root = tempfile::tempdir().expect("tempdir");
    let payload = common::tabular_archive();
    let size = payload.len() as u64;
    let source = MemorySource::new(payload);

    let seen = std::rc::Rc::new(std::cell::Cell::new((0u64, None)));
    let sink_seen = seen.clone();
    Retriever::with_source(&source)
        .retrieve(
            &RemoteArchiveDescriptor::new(URL),
            root.path(),
            "ds",
            RetrievalOptions::default()
                .with_progress(move |done: u64, total: Option<u64>| sink_seen.set((done, total))),
        )
        .expect("retrieve");

    assert_eq!(seen.get(), (size, Some(size)));
}

#[test]
fn file_urls_are_supported() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let archive = scratch.path().join("upload.zip");
    fs::write(&archive, common::tabular_archive()).expect("write archive");
    let url = url::Url::from_file_path(&archive)
        .expect("file url")
        .to_string();

    let root = tempfile::tempdir().expect("tempdir");
    let dataset = Retriever::with_source(FileSource)
        .retrieve(
            &RemoteArchiveDescriptor::new(url),
            root.path(),
            "local",
            RetrievalOptions::default(),
        )
        .expect("retrieve");

    assert_eq!(dataset.observations().expect("observations").len(), 3);
    assert!(archive.is_file());
}

#[test]
fn extraction_is_deterministic() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let archive = scratch.path().join("camera.zip");
    fs::write(&archive, common::image_archive("camera")).expect("write archive");

    let first = scratch.path().join("first");
    let second = scratch.path().join("second");
    fs::create_dir(&first).expect("mkdir");
    fs::create_dir(&second).expect("mkdir");
    let a = extract_archive(&archive, &first).expect("first extraction");
    let b = extract_archive(&archive, &second).expect("second extraction");
    assert_eq!(a, b);

    let files: Vec<_> = WalkDir::new(&first)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.expect("walk entry"))
        .filter(|entry| entry.file_type().is_file())
        .collect();
    assert_eq!(files.len(), 5);

    for entry in files {
        let relative = entry.path().strip_prefix(&first).expect("relative path");
        assert_eq!(
            fs::read(entry.path()).expect("read first"),
            fs::read(second.join(relative)).expect("read second"),
            "{} differs",
            relative.display()
        );
    }
}
