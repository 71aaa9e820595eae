mod common;

use std::fs;

use assert_matches::assert_matches;

use tlc_harvest::batch::{BYPASS_URL, Orchestrator};
use tlc_harvest::domain::{GroupKey, LinkBatch};
use tlc_harvest::error::HarvestError;
use tlc_harvest::fetcher::Fetcher;
use tlc_harvest::progress::{NoProgress, Position};
use tlc_harvest::store::Store;

use common::{MockRemote, pattern, utf8_tempdir};

const YELLOW_2022: &str = "https://data.example.org/trip+data/yellow_tripdata_2022-01.csv";
const GREEN_2022: &str = "https://data.example.org/trip+data/green_tripdata_2022-01.csv";
const GREEN_2020: &str = "https://data.example.org/trip+data/green_tripdata_2020-12.csv";

fn links() -> LinkBatch {
    let mut links = LinkBatch::new();
    links.insert(
        GroupKey::from(2022),
        [YELLOW_2022.to_string(), GREEN_2022.to_string()],
    );
    links.insert(GroupKey::from(2020), [GREEN_2020.to_string()]);
    links
}

fn remote() -> MockRemote {
    MockRemote::new()
        .with_resource(YELLOW_2022, pattern(700_000))
        .with_resource(GREEN_2022, pattern(1_000))
        .with_resource(GREEN_2020, pattern(2_000))
}

#[test]
fn positions_cover_the_whole_batch_in_order() {
    let (_temp, root) = utf8_tempdir();
    let orchestrator = Orchestrator::new(Store::new(root.join("records")), Fetcher::new(remote()));
    let mut seen = Vec::new();

    let report = orchestrator
        .download_all(&links(), false, &NoProgress, &mut |position, item| {
            seen.push((position, item.url.clone()))
        })
        .unwrap();

    assert_eq!(
        seen,
        vec![
            (Position { current: 1, total: 3 }, YELLOW_2022.to_string()),
            (Position { current: 2, total: 3 }, GREEN_2022.to_string()),
            (Position { current: 3, total: 3 }, GREEN_2020.to_string()),
        ]
    );
    assert_eq!(report.transferred_count(), 3);
    assert!(report.first_failure().is_none());

    let records = root.join("records");
    assert_eq!(
        fs::read(records.join("2022/green_tripdata_2022-01.csv")).unwrap(),
        pattern(1_000)
    );
    assert_eq!(
        fs::read_to_string(records.join("2020/log.txt")).unwrap(),
        format!("{}: csv\n", records.join("2020/green_tripdata_2020-12"))
    );
    assert_eq!(
        fs::read_to_string(records.join("2022/log.txt"))
            .unwrap()
            .lines()
            .count(),
        2
    );
}

#[test]
fn rerun_reports_everything_present() {
    let (_temp, root) = utf8_tempdir();
    let orchestrator = Orchestrator::new(Store::new(root.clone()), Fetcher::new(remote()));

    orchestrator
        .download_all(&links(), false, &NoProgress, &mut |_, _| {})
        .unwrap();
    let report = orchestrator
        .download_all(&links(), false, &NoProgress, &mut |_, _| {})
        .unwrap();

    assert_eq!(report.transferred_count(), 0);
    assert!(report.items.iter().all(|item| item.action == "present"));
}

#[test]
fn failed_resource_does_not_stop_the_batch() {
    let (_temp, root) = utf8_tempdir();
    let remote = remote().with_unreachable(GREEN_2022);
    let orchestrator = Orchestrator::new(Store::new(root.clone()), Fetcher::new(remote));
    let mut positions = Vec::new();

    let report = orchestrator
        .download_all(&links(), false, &NoProgress, &mut |position, _| {
            positions.push(position.current)
        })
        .unwrap();

    assert_eq!(positions, vec![1, 2, 3]);
    assert_eq!(report.failed_count(), 1);
    assert_matches!(
        report.first_failure(),
        Some(HarvestError::UnreachableResource { .. })
    );
    assert_eq!(report.items[1].action, "failed");
    assert!(report.items[1].error.is_some());
    assert!(root.join("2020/green_tripdata_2020-12.csv").as_std_path().exists());
}

#[test]
fn invalid_url_is_a_per_link_failure() {
    let (_temp, root) = utf8_tempdir();
    let mut batch = LinkBatch::new();
    batch.insert(GroupKey::from(2020), ["not a url".to_string(), GREEN_2020.to_string()]);
    let orchestrator = Orchestrator::new(Store::new(root.clone()), Fetcher::new(remote()));

    let report = orchestrator
        .download_all(&batch, false, &NoProgress, &mut |_, _| {})
        .unwrap();

    assert_matches!(report.first_failure(), Some(HarvestError::InvalidUrl(_)));
    assert_eq!(report.items[1].action, "downloaded");
}

#[test]
fn bypass_ignores_links() {
    let (_temp, root) = utf8_tempdir();
    let remote = remote().with_resource(BYPASS_URL, pattern(512));
    let orchestrator = Orchestrator::new(Store::new(root.clone()), Fetcher::new(remote));
    let mut seen = Vec::new();

    let report = orchestrator
        .download_all(&links(), true, &NoProgress, &mut |position, _| seen.push(position))
        .unwrap();

    assert_eq!(seen, vec![Position { current: 1, total: 1 }]);
    assert_eq!(report.items.len(), 1);
    assert!(root.join("2021/green_tripdata_2021-01.csv").as_std_path().exists());
    assert!(!root.join("2022").as_std_path().exists());
}

#[test]
fn blocked_group_directory_aborts() {
    let (_temp, root) = utf8_tempdir();
    fs::write(root.join("2022"), b"not a directory").unwrap();
    let orchestrator = Orchestrator::new(Store::new(root.clone()), Fetcher::new(remote()));

    let err = orchestrator
        .download_all(&links(), false, &NoProgress, &mut |_, _| {})
        .unwrap_err();

    assert_matches!(err, HarvestError::Filesystem(_));
}

#[test]
fn corrupt_ledger_aborts() {
    let (_temp, root) = utf8_tempdir();
    fs::create_dir_all(root.join("2022")).unwrap();
    fs::write(root.join("2022/log.txt"), b"garbage\n").unwrap();
    let orchestrator = Orchestrator::new(Store::new(root.clone()), Fetcher::new(remote()));

    let err = orchestrator
        .download_all(&links(), false, &NoProgress, &mut |_, _| {})
        .unwrap_err();

    assert_matches!(err, HarvestError::LedgerCorruption { .. });
}
