use assert_matches::assert_matches;
use camino::Utf8Path;

use tlc_harvest::domain::{CanonicalName, GroupKey, LinkBatch, StorageFormat, remote_file_name};
use tlc_harvest::error::HarvestError;

#[test]
fn formats_display_as_extensions() {
    let rendered: Vec<_> = StorageFormat::ALL.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["csv", "avro", "parquet"]);
}

#[test]
fn canonical_name_of_bare_file() {
    let name = CanonicalName::from_path(Utf8Path::new("yellow_tripdata_2021-07.csv"));
    assert_eq!(name.as_str(), "yellow_tripdata_2021-07");
}

#[test]
fn canonical_name_joins_variants() {
    let csv = CanonicalName::from_path(Utf8Path::new("./records/2021/green_2021-01.csv"));
    let parquet = CanonicalName::from_path(Utf8Path::new("./records/2021/green_2021-01.parquet"));
    assert_eq!(csv, parquet);
    assert_eq!(csv.as_str(), "./records/2021/green_2021-01");
}

#[test]
fn link_batch_counts_across_groups() {
    let mut batch = LinkBatch::new();
    assert!(batch.is_empty());
    batch.insert(GroupKey::from(2019), ["https://h/a.csv".to_string()]);
    batch.insert(GroupKey::new("2018"), Vec::new());
    batch.insert(GroupKey::from(2019), ["https://h/b.csv".to_string()]);

    assert_eq!(batch.total_links(), 2);
    let keys: Vec<_> = batch.groups().map(|(key, _)| key.to_string()).collect();
    assert_eq!(keys, vec!["2019", "2018"]);
}

#[test]
fn remote_file_name_requires_a_path() {
    assert_eq!(
        remote_file_name("https://s3.amazonaws.com/nyc-tlc/trip+data/fhv_tripdata_2020-01.csv")
            .unwrap(),
        "fhv_tripdata_2020-01.csv"
    );
    assert_matches!(
        remote_file_name("https://s3.amazonaws.com"),
        Err(HarvestError::InvalidUrl(_))
    );
    assert_matches!(remote_file_name("trips.csv"), Err(HarvestError::InvalidUrl(_)));
}
