mod common;

use chrono::{Duration, Utc};
use common::*;
use preprint_sync::db::{directory, file, file_event};
use preprint_sync::model::FileStatus;
use preprint_sync::remote::BatchResponse;
use std::collections::HashMap;

const JAN: &str = "Current_Content/Jan_2024/";

#[test]
fn test_refresh_registers_listed_directory_once() {
    let service = FakeService::new().with_directories("Current_Content/Jan", &[JAN]);
    let mut settings = settings();
    settings.listing_prefixes = strings(&["Current_Content/Jan"]);
    let mut reconciler = reconciler_with(service, settings);

    assert_eq!(reconciler.refresh_directories().unwrap(), 1);
    assert_eq!(reconciler.refresh_directories().unwrap(), 0);

    let conn = reconciler.connection();
    assert_eq!(directory::count(conn).unwrap(), 1);
    let jan = directory::find_by_path(conn, JAN).unwrap().unwrap();
    assert!(jan.scanned_dt.is_none());
}

#[test]
fn test_refresh_skips_failed_prefix() {
    // "Back_Content/" has no scripted listing and answers 500.
    let service = FakeService::new().with_directories("Current_Content/Jan", &[JAN]);
    let mut reconciler = reconciler(service);

    assert_eq!(reconciler.refresh_directories().unwrap(), 1);
    assert_eq!(directory::count(reconciler.connection()).unwrap(), 1);
}

#[test]
fn test_scan_registers_discovered_files() {
    let service = FakeService::new().with_files(JAN, &["a.zip", "b.zip"]);
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();

    let stats = reconciler.scan_directories(None).unwrap();
    assert_eq!(stats.directories_scanned, 1);
    assert_eq!(stats.files_listed, 2);
    assert_eq!(stats.files_registered, 2);

    let conn = reconciler.connection();
    let jan = directory::find_by_path(conn, JAN).unwrap().unwrap();
    assert!(jan.scanned_dt.is_some());
    let files = file::files_in_directory(conn, &jan).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files
        .iter()
        .all(|f| f.file_status() == Some(FileStatus::Discovered) && f.parent_directory == jan.id));
}

#[test]
fn test_rescan_does_not_duplicate_files() {
    let service = FakeService::new().with_files(JAN, &["a.zip", "b.zip"]);
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();

    reconciler.scan_directories(None).unwrap();
    // Nothing unscanned is left without a cutoff.
    assert_eq!(reconciler.scan_directories(None).unwrap().directories_scanned, 0);

    let cutoff = Utc::now().naive_utc() + Duration::hours(1);
    let stats = reconciler.scan_directories(Some(cutoff)).unwrap();
    assert_eq!(stats.directories_scanned, 1);
    assert_eq!(stats.files_registered, 0);
    assert_eq!(file::count(reconciler.connection()).unwrap(), 2);
}

#[test]
fn test_failed_listing_still_marks_directory_scanned() {
    let service = FakeService::new();
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();

    let stats = reconciler.scan_directories(None).unwrap();
    assert_eq!(stats.failed_listings, 1);
    assert_eq!(stats.files_registered, 0);

    let conn = reconciler.connection();
    assert!(directory::find_by_path(conn, JAN)
        .unwrap()
        .unwrap()
        .scanned_dt
        .is_some());
    assert_eq!(file::count(conn).unwrap(), 0);
}

#[test]
fn test_sentinel_directories_are_marked_without_listing() {
    let service = FakeService::new().with_files(JAN, &["a.zip"]);
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), ["Back_Content/", JAN]).unwrap();

    let stats = reconciler.scan_directories(None).unwrap();
    assert_eq!(stats.directories_scanned, 2);
    assert_eq!(stats.sentinel_directories, 1);
    assert_eq!(
        *reconciler.service().listed_directories.borrow(),
        strings(&[JAN])
    );
    assert_eq!(directory::count_unscanned(reconciler.connection()).unwrap(), 0);
}

#[test]
fn test_batch_outcomes_are_applied() {
    let service = FakeService::new()
        .with_files(JAN, &["a.zip", "b.zip"])
        .with_responder(|_, _| {
            Ok(BatchResponse {
                downloaded_files: HashMap::from([("a.zip".to_string(), "a.xml".to_string())]),
                error_files: strings(&["b.zip"]),
                runtime: 120.0,
            })
        });
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    let stats = reconciler.process_pending(chunk(100)).unwrap();
    assert_eq!(stats.files_pending, 2);
    assert_eq!(stats.files_sent, 2);
    assert_eq!(stats.files_downloaded, 1);
    assert_eq!(stats.files_errored, 1);
    assert_eq!(stats.files_accounted(), 2);
    assert_eq!(stats.files_omitted, 0);
    assert_eq!(stats.files_left_pending, 0);
    assert_eq!(reconciler.service().batches.borrow().len(), 1);

    let conn = reconciler.connection();
    let a = file::find_by_name(conn, "a.zip").unwrap().unwrap();
    assert_eq!(a.file_status(), Some(FileStatus::Downloaded));
    assert_eq!(a.xml_filename.as_deref(), Some("a.xml"));
    let a_events = file_event::events_for_file(conn, &a).unwrap();
    assert_eq!(a_events.len(), 1);
    assert_eq!(a_events[0].event_type, "downloaded");

    let b = file::find_by_name(conn, "b.zip").unwrap().unwrap();
    assert_eq!(b.file_status(), Some(FileStatus::Error));
    let b_events = file_event::events_for_file(conn, &b).unwrap();
    assert_eq!(b_events.len(), 1);
    assert_eq!(b_events[0].event_type, "error");

    assert!(file::pending(conn, &FileStatus::TERMINAL, None, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_chunks_respect_partition_size() {
    let paths: Vec<String> = (0..7).map(|i| format!("f{}.zip", i)).collect();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let service = FakeService::new().with_files(JAN, &path_refs);
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    let stats = reconciler.process_pending(chunk(3)).unwrap();
    assert_eq!(stats.chunks_sent, 3);
    assert_eq!(stats.files_downloaded, 7);

    let batches = reconciler.service().batches.borrow();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    let sent: Vec<String> = batches.iter().flatten().cloned().collect();
    assert_eq!(sent, paths);
}

#[test]
fn test_transport_failure_leaves_chunk_untouched() {
    let service = FakeService::new()
        .with_files(JAN, &["a.zip", "b.zip"])
        .with_responder(|_, paths| {
            if paths.iter().any(|p| p == "a.zip") {
                Err(server_error())
            } else {
                Ok(download_all(paths))
            }
        });
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    let stats = reconciler.process_pending(chunk(1)).unwrap();
    // Pass 1 fails a.zip and converts b.zip; pass 2 retries a.zip only and
    // stops because nothing resolved.
    assert_eq!(stats.passes, 2);
    assert_eq!(stats.failed_chunks, 2);
    assert_eq!(stats.files_downloaded, 1);
    assert_eq!(stats.files_left_pending, 1);
    assert_eq!(
        *reconciler.service().batches.borrow(),
        vec![strings(&["a.zip"]), strings(&["b.zip"]), strings(&["a.zip"])]
    );

    let conn = reconciler.connection();
    let a = file::find_by_name(conn, "a.zip").unwrap().unwrap();
    assert_eq!(a.file_status(), Some(FileStatus::Discovered));
    assert!(file_event::events_for_file(conn, &a).unwrap().is_empty());
    let b = file::find_by_name(conn, "b.zip").unwrap().unwrap();
    assert_eq!(b.file_status(), Some(FileStatus::Downloaded));
}

#[test]
fn test_omitted_files_stay_pending_and_are_resent() {
    let service = FakeService::new()
        .with_files(JAN, &["a.zip", "b.zip", "c.zip"])
        .with_responder(|call, _| {
            Ok(match call {
                0 => BatchResponse {
                    downloaded_files: HashMap::from([(
                        "a.zip".to_string(),
                        "a.xml".to_string(),
                    )]),
                    ..BatchResponse::default()
                },
                1 => BatchResponse {
                    error_files: strings(&["b.zip"]),
                    ..BatchResponse::default()
                },
                _ => BatchResponse::default(),
            })
        });
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    let stats = reconciler.process_pending(chunk(10)).unwrap();
    assert_eq!(stats.passes, 3);
    assert_eq!(stats.files_sent, 6);
    assert_eq!(stats.files_accounted(), 2);
    assert_eq!(stats.files_omitted, 4);
    assert_eq!(stats.files_left_pending, 1);
    assert_eq!(
        *reconciler.service().batches.borrow(),
        vec![
            strings(&["a.zip", "b.zip", "c.zip"]),
            strings(&["b.zip", "c.zip"]),
            strings(&["c.zip"]),
        ]
    );

    let conn = reconciler.connection();
    let c = file::find_by_name(conn, "c.zip").unwrap().unwrap();
    assert_eq!(c.file_status(), Some(FileStatus::Discovered));

    // The next run picks it up again.
    let pending = file::pending(conn, &FileStatus::TERMINAL, None, None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].archive_filename, "c.zip");
}

#[test]
fn test_max_passes_bounds_resubmission() {
    let service = FakeService::new()
        .with_files(JAN, &["a.zip", "b.zip"])
        .with_responder(|call, _| {
            Ok(match call {
                0 => BatchResponse {
                    error_files: strings(&["a.zip"]),
                    ..BatchResponse::default()
                },
                _ => BatchResponse::default(),
            })
        });
    let mut settings = settings();
    settings.max_passes = 1;
    let mut reconciler = reconciler_with(service, settings);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    let stats = reconciler.process_pending(chunk(10)).unwrap();
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.files_left_pending, 1);
    assert_eq!(reconciler.service().batches.borrow().len(), 1);
}

#[test]
fn test_response_naming_unsent_file_is_rejected() {
    let service = FakeService::new()
        .with_files(JAN, &["a.zip"])
        .with_responder(|_, _| {
            Ok(BatchResponse {
                downloaded_files: HashMap::from([
                    ("a.zip".to_string(), "a.xml".to_string()),
                    ("z.zip".to_string(), "z.xml".to_string()),
                ]),
                ..BatchResponse::default()
            })
        });
    let mut settings = settings();
    settings.max_passes = 1;
    let mut reconciler = reconciler_with(service, settings);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    let stats = reconciler.process_pending(chunk(10)).unwrap();
    assert_eq!(stats.rejected_chunks, 1);
    assert_eq!(stats.files_downloaded, 0);

    let conn = reconciler.connection();
    let a = file::find_by_name(conn, "a.zip").unwrap().unwrap();
    assert_eq!(a.file_status(), Some(FileStatus::Discovered));
    assert_eq!(file_event::count(conn).unwrap(), 0);
}

#[test]
fn test_terminal_files_are_not_resubmitted() {
    let service = FakeService::new().with_files(JAN, &["a.zip", "b.zip"]);
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    reconciler.process_pending(chunk(10)).unwrap();
    let second = reconciler.process_pending(chunk(10)).unwrap();
    assert_eq!(second.files_pending, 0);
    assert_eq!(second.files_sent, 0);
    assert_eq!(reconciler.service().batches.borrow().len(), 1);
}

#[test]
fn test_update_period_creates_scans_and_processes_one_directory() {
    let march = "Current_Content/March_2024/";
    let service = FakeService::new()
        .with_files(JAN, &["old.zip"])
        .with_files(march, &["new1.zip", "new2.zip"]);
    let mut reconciler = reconciler(service);
    directory::upsert_paths(reconciler.connection(), [JAN]).unwrap();
    reconciler.scan_directories(None).unwrap();

    let (scan, process) = reconciler.update_period(march, chunk(10)).unwrap();
    assert_eq!(scan.files_registered, 2);
    assert_eq!(process.files_downloaded, 2);
    assert_eq!(
        *reconciler.service().batches.borrow(),
        vec![strings(&["new1.zip", "new2.zip"])]
    );

    let conn = reconciler.connection();
    let dir = directory::find_by_path(conn, march).unwrap().unwrap();
    assert!(dir.scanned_dt.is_some());
    let old = file::find_by_name(conn, "old.zip").unwrap().unwrap();
    assert_eq!(old.file_status(), Some(FileStatus::Discovered));
    let new1 = file::find_by_name(conn, "new1.zip").unwrap().unwrap();
    assert_eq!(new1.xml_filename.as_deref(), Some("new1.xml"));
}

#[test]
fn test_run_all_drives_every_task() {
    let service = FakeService::new()
        .with_directories("Current_Content/Jan", &[JAN])
        .with_directories("Back_Content/", &["Back_Content/"])
        .with_files(JAN, &["a.zip", "b.zip"]);
    let mut reconciler = reconciler(service);

    let summary = reconciler.run_all(None, chunk(1)).unwrap();
    assert_eq!(summary.directories_added, 2);
    assert_eq!(summary.scan.directories_scanned, 2);
    assert_eq!(summary.scan.sentinel_directories, 1);
    assert_eq!(summary.scan.files_registered, 2);
    assert_eq!(summary.process.files_downloaded, 2);
    assert_eq!(summary.process.chunks_sent, 2);
    // The current month has no scripted listing, so its scan fails softly.
    assert_eq!(summary.current_period_scan.failed_listings, 1);
    assert_eq!(summary.current_period_process.files_pending, 0);
    assert_eq!(summary.processed_total().files_downloaded, 2);
    assert_eq!(summary.processed_total().chunks_sent, 2);

    assert_eq!(directory::count(reconciler.connection()).unwrap(), 3);
}

#[test]
fn test_rescan_with_cutoff_finds_files_added_after_first_scan() {
    let service = FakeService::new()
        .with_directories("Current_Content/Jan", &[JAN])
        .with_directories("Back_Content/", &[])
        .with_files(JAN, &["a.zip"]);
    let mut reconciler = reconciler(service);
    reconciler.run_all(None, chunk(10)).unwrap();

    reconciler.service().set_files(JAN, &["a.zip", "b.zip"]);

    // Never-scanned directories only: JAN is skipped.
    let unscanned_only = reconciler.run_all(None, chunk(10)).unwrap();
    assert_eq!(unscanned_only.scan.directories_scanned, 0);
    assert!(file::find_by_name(reconciler.connection(), "b.zip")
        .unwrap()
        .is_none());

    let cutoff = Utc::now().naive_utc() + Duration::seconds(1);
    let summary = reconciler.run_all(Some(cutoff), chunk(10)).unwrap();
    assert_eq!(summary.scan.files_registered, 1);
    assert_eq!(summary.process.files_sent, 1);
    assert_eq!(summary.process.files_downloaded, 1);

    let conn = reconciler.connection();
    let b = file::find_by_name(conn, "b.zip").unwrap().unwrap();
    assert_eq!(b.file_status(), Some(FileStatus::Downloaded));
    assert_eq!(file::count(conn).unwrap(), 2);
}
