mod commons_stub;

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use commons_harvest::commons::{CollectionSource, CommonsHttpClient};
use commons_harvest::config::FetcherConfig;
use commons_harvest::domain::{CollectionId, RunStatus};
use commons_harvest::error::HarvestError;
use commons_harvest::fetcher::{Fetcher, list_members};
use commons_harvest::output::JsonOutput;
use commons_harvest::store::{DownloadLedger, OutputStore};

use commons_stub::{CommonsStub, SVG_BODY};

fn stub_config(stub: &CommonsStub) -> FetcherConfig {
    FetcherConfig {
        api_url: stub.api_url(),
        collection: "Category:Test_symbols".parse().unwrap(),
        delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
        chunk_size: 7,
        ..FetcherConfig::default()
    }
}

#[test]
fn listing_follows_continuation_tokens() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();
    let collection: CollectionId = "Category:Test_symbols".parse().unwrap();

    let abort = AtomicBool::new(false);
    let titles = list_members(&client, &collection, 500, 500, &abort, &JsonOutput).unwrap();

    assert_eq!(
        titles,
        vec!["File:Whole note.svg", "File:Half note.svg", "File:Missing.svg"]
    );
    assert_eq!(stub.hits_matching("list=categorymembers"), 2);
    assert_eq!(stub.hits_matching("cmcontinue=next-page"), 1);
    assert!(stub.hits()[0].contains("cmtype=file"));
}

#[test]
fn requests_carry_a_descriptive_user_agent() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();

    client.resolve_url("File:Whole note.svg").unwrap();

    let agents = stub.user_agents();
    assert_eq!(agents.len(), 1);
    assert!(agents[0].starts_with("commons-harvest/"));
}

#[test]
fn resolve_returns_first_image_url() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();

    let url = client.resolve_url("File:Whole note.svg").unwrap();

    assert_eq!(url, Some(stub.file_url("Whole_note.svg")));
}

#[test]
fn resolve_without_imageinfo_is_none() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();

    assert_eq!(client.resolve_url("File:Missing.svg").unwrap(), None);
}

#[test]
fn api_error_object_is_a_transport_error() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();

    let err = client.resolve_url("File:Broken.svg").unwrap_err();

    assert_matches!(err, HarvestError::Transport { status: 200, .. });
}

#[test]
fn fetch_one_writes_exact_bytes() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("Whole_note.svg");

    let written = client
        .fetch_one(&stub.file_url("Whole_note.svg"), &destination)
        .unwrap();

    assert_eq!(written, SVG_BODY.len() as u64);
    assert_eq!(std::fs::read_to_string(&destination).unwrap(), SVG_BODY);
}

#[test]
fn too_many_requests_is_reported_without_retry() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("limited.svg");

    let err = client
        .fetch_one(&stub.file_url("limited.svg"), &destination)
        .unwrap_err();

    assert!(err.is_rate_limit());
    assert_eq!(stub.hits_matching("/files/limited.svg"), 1);
    assert!(!destination.exists());
}

#[test]
fn server_errors_are_retried() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("flaky.svg");

    let written = client
        .fetch_one(&stub.file_url("flaky.svg"), &destination)
        .unwrap();

    assert_eq!(written, SVG_BODY.len() as u64);
    assert_eq!(stub.hits_matching("/files/flaky.svg"), 2);
}

#[test]
fn not_found_is_a_transport_error() {
    let stub = CommonsStub::spawn();
    let client = CommonsHttpClient::new(&stub_config(&stub)).unwrap();
    let temp = tempfile::tempdir().unwrap();

    let err = client
        .fetch_one(&stub.file_url("nope.svg"), &temp.path().join("nope.svg"))
        .unwrap_err();

    assert_matches!(err, HarvestError::Transport { status: 404, .. });
}

#[test]
fn second_run_skips_everything_already_downloaded() {
    let stub = CommonsStub::spawn();
    let config = stub_config(&stub);
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("symbols")).unwrap();
    let store = OutputStore::new(root.clone());
    store.ensure_root().unwrap();

    let first = Fetcher::new(
        CommonsHttpClient::new(&config).unwrap(),
        store.clone(),
        config.clone(),
    );
    let summary = first.run(&JsonOutput).unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.listed, 3);
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.present_in_directory, 2);
    assert!(store.contains("Whole_note.svg"));
    assert!(store.contains("Half_note.svg"));
    assert_eq!(
        std::fs::read_to_string(root.join("Half_note.svg")).unwrap(),
        SVG_BODY
    );

    let downloads_before = stub.hits_matching("/files/");
    let second = Fetcher::new(CommonsHttpClient::new(&config).unwrap(), store, config);
    let summary = second.run(&JsonOutput).unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(stub.hits_matching("/files/"), downloads_before);
}
