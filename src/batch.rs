use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{DownloadTask, GroupKey, LinkBatch};
use crate::error::HarvestError;
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::progress::{Position, ProgressSink};
use crate::remote::RemoteSource;
use crate::store::Store;

/// The single file fetched by a bypass run.
pub const BYPASS_URL: &str =
    "https://s3.amazonaws.com/nyc-tlc/trip+data/green_tripdata_2021-01.csv";
pub const BYPASS_GROUP: u32 = 2021;

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub position: Position,
    pub group: GroupKey,
    pub url: String,
    pub local_path: Option<String>,
    pub action: String,
    pub outcome: Option<FetchOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<BatchItem>,
    #[serde(skip)]
    pub failures: Vec<HarvestError>,
}

impl BatchReport {
    pub fn first_failure(&self) -> Option<&HarvestError> {
        self.failures.first()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn transferred_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome.is_some_and(|outcome| outcome.transferred()))
            .count()
    }
}

pub struct Orchestrator<R: RemoteSource> {
    store: Store,
    fetcher: Fetcher<R>,
}

impl<R: RemoteSource> Orchestrator<R> {
    pub fn new(store: Store, fetcher: Fetcher<R>) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Downloads every link of `links`, group by group.
    ///
    /// With `bypass` set, `links` is ignored and only [`BYPASS_URL`] is fetched into group
    /// [`BYPASS_GROUP`]. `on_position` is called once per link, failed ones included, with
    /// positions counted across the whole batch.
    ///
    /// Network failures are recorded per link and the batch moves on; filesystem and
    /// ledger failures abort it.
    pub fn download_all(
        &self,
        links: &LinkBatch,
        bypass: bool,
        sink: &dyn ProgressSink,
        on_position: &mut dyn FnMut(Position, &BatchItem),
    ) -> Result<BatchReport, HarvestError> {
        let started_at = Utc::now();
        self.store.ensure_root()?;

        let bypass_links;
        let links = if bypass {
            info!(url = BYPASS_URL, "bypassing link batch");
            let mut single = LinkBatch::new();
            single.insert(GroupKey::from(BYPASS_GROUP), [BYPASS_URL.to_string()]);
            bypass_links = single;
            &bypass_links
        } else {
            links
        };

        let total = links.total_links();
        let mut current = 0usize;
        let mut items = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (group, urls) in links.groups() {
            self.store.ensure_group_dir(group)?;
            for url in urls {
                current += 1;
                let position = Position { current, total };
                let item = match self.store.local_path(group, url) {
                    Ok(local_path) => {
                        let task = DownloadTask {
                            url: url.clone(),
                            local_path,
                            group_key: group.clone(),
                            progress_index: current,
                            progress_total: total,
                        };
                        self.run_task(&task, sink)
                    }
                    Err(err) => Err(err),
                };
                let item = match item {
                    Ok(item) => item,
                    Err(err) if err.is_per_resource() => {
                        warn!(url = %url, error = %err, "skipping resource");
                        let item = BatchItem {
                            position,
                            group: group.clone(),
                            url: url.clone(),
                            local_path: None,
                            action: "failed".to_string(),
                            outcome: None,
                            error: Some(err.to_string()),
                        };
                        failures.push(err);
                        item
                    }
                    Err(err) => return Err(err),
                };
                on_position(position, &item);
                items.push(item);
            }
        }

        Ok(BatchReport {
            started_at,
            finished_at: Utc::now(),
            items,
            failures,
        })
    }

    fn run_task(
        &self,
        task: &DownloadTask,
        sink: &dyn ProgressSink,
    ) -> Result<BatchItem, HarvestError> {
        let outcome = self
            .fetcher
            .ensure_downloaded(&task.url, &task.local_path, sink)?;
        Ok(BatchItem {
            position: Position {
                current: task.progress_index,
                total: task.progress_total,
            },
            group: task.group_key.clone(),
            url: task.url.clone(),
            local_path: Some(task.local_path.to_string()),
            action: outcome.action().to_string(),
            outcome: Some(outcome),
            error: None,
        })
    }
}
