mod common;

use common::{encode, noise_image, FakeStore};
use drive_squeeze::batch::{process_folder, FileOutcome, RunOptions};
use drive_squeeze::error::SqueezeError;
use drive_squeeze::processing::{encode_jpeg, CompressionOptions};
use image::ImageFormat;

fn run_options(target_bytes: u64) -> RunOptions {
    let mut options = RunOptions::new(target_bytes, CompressionOptions::default()).unwrap();
    options.show_progress = false;
    options
}

/// A large noisy JPEG and a budget it can only meet after re-encoding.
fn oversized_jpeg(seed: u64) -> (Vec<u8>, u64) {
    let pixels = noise_image(128, 128, seed);
    let data = encode_jpeg(&pixels, 95).unwrap();
    let target = encode_jpeg(&pixels, 50).unwrap().len() as u64;
    assert!(data.len() as u64 > target);
    (data, target)
}

fn outcome_of<'a>(summary: &'a drive_squeeze::RunSummary, id: &str) -> &'a FileOutcome {
    &summary
        .reports
        .iter()
        .find(|r| r.file.id == id)
        .unwrap()
        .outcome
}

#[test]
fn test_oversized_jpeg_is_replaced_in_place() {
    let (data, target) = oversized_jpeg(1);
    let mut store = FakeStore::with_folder("Photos");
    store.add("big", "big.jpg", "image/jpeg", data.clone());

    let summary = process_folder(&store, "folder", &run_options(target)).unwrap();

    assert_eq!(summary.folder_name, "Photos");
    assert_eq!(summary.uploaded(), 1);
    let updates = store.updates.borrow();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].file_id, "big");
    assert_eq!(updates[0].mime_type, "image/jpeg");
    assert_eq!(updates[0].new_name, None);
    assert!(updates[0].bytes.len() as u64 <= target);

    match outcome_of(&summary, "big") {
        FileOutcome::Replaced {
            original_bytes,
            compressed_bytes,
            quality,
            renamed_to,
        } => {
            assert_eq!(*original_bytes, data.len() as u64);
            assert_eq!(*compressed_bytes, updates[0].bytes.len() as u64);
            assert!(*quality >= 5 && *quality <= 85);
            assert!(renamed_to.is_none());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_small_image_is_not_downloaded_or_uploaded() {
    let small = encode_jpeg(&noise_image(16, 16, 2), 80).unwrap();
    let mut store = FakeStore::with_folder("Photos");
    store.add("small", "small.jpg", "image/jpeg", small.clone());

    let summary = process_folder(&store, "folder", &run_options(1_000_000)).unwrap();

    assert!(store.downloads.borrow().is_empty());
    assert!(store.updates.borrow().is_empty());
    assert_eq!(
        outcome_of(&summary, "small"),
        &FileOutcome::AlreadyUnderTarget {
            size_bytes: small.len() as u64
        }
    );
}

#[test]
fn test_unsupported_format_is_skipped_and_run_continues() {
    let (data, target) = oversized_jpeg(3);
    let mut store = FakeStore::with_folder("Mixed");
    store.add("anim", "anim.gif", "image/gif", vec![b'G'; target as usize * 2]);
    store.add("big", "big.jpg", "image/jpeg", data);

    let summary = process_folder(&store, "folder", &run_options(target)).unwrap();

    assert_eq!(summary.image_files, 2);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.uploaded(), 1);
    assert!(matches!(
        outcome_of(&summary, "anim"),
        FileOutcome::Skipped { .. }
    ));
    assert!(!store.downloads.borrow().contains(&"anim".to_string()));
}

#[test]
fn test_mislabelled_gif_is_skipped_after_sniffing() {
    let (_, target) = oversized_jpeg(4);
    let mut gif = b"GIF89a\x01\x00\x01\x00".to_vec();
    gif.resize(target as usize * 2, 0);
    let mut store = FakeStore::with_folder("Mixed");
    store.add("fake", "fake.jpg", "image/jpeg", gif);

    let summary = process_folder(&store, "folder", &run_options(target)).unwrap();

    assert!(matches!(
        outcome_of(&summary, "fake"),
        FileOutcome::Skipped { .. }
    ));
    assert!(store.updates.borrow().is_empty());
}

#[test]
fn test_corrupt_image_is_skipped() {
    let (_, target) = oversized_jpeg(5);
    let mut store = FakeStore::with_folder("Mixed");
    store.add("junk", "junk.png", "image/png", vec![0u8; target as usize * 2]);

    let summary = process_folder(&store, "folder", &run_options(target)).unwrap();

    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.failed(), 0);
}

#[test]
fn test_download_failure_does_not_abort_run() {
    let (first, target) = oversized_jpeg(6);
    let (second, _) = oversized_jpeg(7);
    let mut store = FakeStore::with_folder("Photos");
    store.add("broken", "broken.jpg", "image/jpeg", first);
    store.add("ok", "ok.jpg", "image/jpeg", second);
    store.broken_downloads.push("broken".to_string());

    let summary = process_folder(&store, "folder", &run_options(target)).unwrap();

    assert_eq!(summary.failed(), 1);
    match outcome_of(&summary, "broken") {
        FileOutcome::Failed { error } => assert!(error.contains("503")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(matches!(
        outcome_of(&summary, "ok"),
        FileOutcome::Replaced { .. }
    ));
}

#[test]
fn test_auth_error_aborts_run() {
    let (data, target) = oversized_jpeg(8);
    let (other, _) = oversized_jpeg(9);
    let mut store = FakeStore::with_folder("Photos");
    store.add("first", "first.jpg", "image/jpeg", data);
    store.add("second", "second.jpg", "image/jpeg", other);
    store.auth_fails_on = Some("first".to_string());

    let result = process_folder(&store, "folder", &run_options(target));

    assert!(matches!(result, Err(SqueezeError::Auth(_))));
    assert_eq!(*store.downloads.borrow(), vec!["first".to_string()]);
}

#[test]
fn test_missing_folder_is_fatal() {
    let store = FakeStore::default();
    let result = process_folder(&store, "nope", &run_options(1024));
    assert!(matches!(result, Err(SqueezeError::FolderNotFound(_))));
}

#[test]
fn test_non_images_are_ignored_and_counted() {
    let mut store = FakeStore::with_folder("Docs");
    store.add("pdf", "report.pdf", "application/pdf", vec![1, 2, 3]);
    store.new_page();
    store.add("txt", "notes.txt", "text/plain", vec![4, 5]);

    let summary = process_folder(&store, "folder", &run_options(1024)).unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.image_files, 0);
    assert!(summary.reports.is_empty());
    assert_eq!(summary.mime_counts.get("application/pdf"), Some(&1));
    assert_eq!(summary.mime_counts.get("text/plain"), Some(&1));
}

#[test]
fn test_empty_folder() {
    let store = FakeStore::with_folder("Empty");
    let summary = process_folder(&store, "folder", &run_options(1024)).unwrap();
    assert_eq!(summary.total_files, 0);
    assert!(summary.reports.is_empty());
}

#[test]
fn test_listing_spans_pages() {
    let (first, target) = oversized_jpeg(10);
    let (second, _) = oversized_jpeg(11);
    let mut store = FakeStore::with_folder("Photos");
    store.add("a", "a.jpg", "image/jpeg", first);
    store.new_page();
    store.add("b", "b.jpg", "image/jpeg", second);

    let summary = process_folder(&store, "folder", &run_options(target)).unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.uploaded(), 2);
}

#[test]
fn test_dry_run_never_uploads() {
    let (data, target) = oversized_jpeg(12);
    let mut store = FakeStore::with_folder("Photos");
    store.add("big", "big.jpg", "image/jpeg", data);
    let mut options = run_options(target);
    options.dry_run = true;

    let summary = process_folder(&store, "folder", &options).unwrap();

    assert!(store.updates.borrow().is_empty());
    assert!(store.creates.borrow().is_empty());
    assert_eq!(summary.dry_runs(), 1);
    assert!(matches!(
        outcome_of(&summary, "big"),
        FileOutcome::DryRun { met_goal: true, .. }
    ));
}

#[test]
fn test_keep_original_creates_prefixed_copy() {
    let (data, target) = oversized_jpeg(13);
    let mut store = FakeStore::with_folder("Photos");
    store.add("big", "holiday.jpeg", "image/jpeg", data);
    let mut options = run_options(target);
    options.keep_original = true;

    let summary = process_folder(&store, "folder", &options).unwrap();

    assert!(store.updates.borrow().is_empty());
    let creates = store.creates.borrow();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].folder_id, "folder");
    assert_eq!(creates[0].name, "compressed_holiday.jpeg");
    assert_eq!(creates[0].mime_type, "image/jpeg");
    assert!(matches!(
        outcome_of(&summary, "big"),
        FileOutcome::Copied { .. }
    ));
}

#[test]
fn test_png_reencoded_as_jpeg_is_renamed() {
    let pixels = noise_image(96, 96, 14);
    let png = encode(&pixels, ImageFormat::Png);
    let target = encode_jpeg(&pixels, 60).unwrap().len() as u64;
    let mut store = FakeStore::with_folder("Scans");
    store.add("scan", "scan.png", "image/png", png);

    process_folder(&store, "folder", &run_options(target)).unwrap();

    let updates = store.updates.borrow();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].mime_type, "image/jpeg");
    assert_eq!(updates[0].new_name.as_deref(), Some("scan.jpg"));
}

#[test]
fn test_unreachable_target_uploads_smaller_result() {
    let (data, _) = oversized_jpeg(15);
    let mut store = FakeStore::with_folder("Photos");
    store.add("big", "big.jpg", "image/jpeg", data.clone());

    let summary = process_folder(&store, "folder", &run_options(1)).unwrap();

    // Target missed, but the smallest attempt still beats the q95 original
    let updates = store.updates.borrow();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].bytes.len() < data.len());
    assert_eq!(summary.uploaded(), 1);
}

#[test]
fn test_no_gain_leaves_original_untouched() {
    // Already heavily compressed; re-encoding at high quality only grows it
    let data = encode_jpeg(&noise_image(64, 64, 16), 5).unwrap();
    let mut store = FakeStore::with_folder("Photos");
    store.add("tiny", "tiny.jpg", "image/jpeg", data.clone());
    let compression =
        CompressionOptions::new(Some(95), Some(90), None, None, None, Some(0), true).unwrap();
    let mut options = RunOptions::new(1, compression).unwrap();
    options.show_progress = false;

    let summary = process_folder(&store, "folder", &options).unwrap();

    assert!(store.updates.borrow().is_empty());
    assert!(store.creates.borrow().is_empty());
    assert_eq!(summary.unchanged(), 1);
    assert_eq!(summary.uploaded(), 0);
    match outcome_of(&summary, "tiny") {
        FileOutcome::NoGain {
            original_bytes,
            best_bytes,
        } => {
            assert_eq!(*original_bytes, data.len() as u64);
            assert!(best_bytes >= original_bytes);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}
