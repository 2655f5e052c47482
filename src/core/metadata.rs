//! Source metadata model, per-kind loader interface and the crawl that drives it.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::core::AppResult;
use crate::util::clock::now_ms;

/// Kind of external system a source is read from. Each kind has its own
/// `MetaLoader` implementation, selected when the source is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Hive metastore.
    Hive,
    /// Another warehouse project.
    Warehouse,
    /// Object-store bucket laid out as databases and tables.
    ObjectStore,
}

/// A source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMeta {
    /// Database name.
    pub name: String,
}

/// A source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Owning database.
    pub database: String,
    /// Table name.
    pub name: String,
    /// Partition column names, empty for unpartitioned tables.
    #[serde(default)]
    pub partition_columns: Vec<String>,
}

impl TableMeta {
    /// Whether partitions must be listed for this table.
    #[must_use]
    pub fn has_partitions(&self) -> bool {
        !self.partition_columns.is_empty()
    }
}

/// A source partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMeta {
    /// Owning database.
    pub database: String,
    /// Owning table.
    pub table: String,
    /// Partition values, one per partition column.
    pub values: Vec<String>,
}

/// Everything one crawl found in a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCatalog {
    /// Databases kept by the filter.
    pub databases: Vec<DatabaseMeta>,
    /// Tables kept by the filter.
    pub tables: Vec<TableMeta>,
    /// Partitions of the kept tables.
    pub partitions: Vec<PartitionMeta>,
    /// Completion time in milliseconds since epoch.
    pub loaded_at_ms: u128,
}

/// Adapter enumerating databases, tables and partitions of one source kind.
#[async_trait]
pub trait MetaLoader: Send + Sync {
    /// Source kind this loader reads.
    fn kind(&self) -> SourceKind;

    /// Connect to the metadata service.
    async fn open(&self) -> AppResult<()> {
        Ok(())
    }

    /// Release connections. Called after every crawl, successful or not.
    async fn close(&self) {}

    /// Prepare the source for migration, such as creating helper objects it
    /// needs. Does nothing by default.
    async fn run_initializer(&self) -> AppResult<()> {
        Ok(())
    }

    /// Names of all databases.
    async fn list_database_names(&self) -> AppResult<Vec<String>>;

    /// Details of one database.
    async fn get_database(&self, name: &str) -> AppResult<DatabaseMeta> {
        Ok(DatabaseMeta {
            name: name.to_string(),
        })
    }

    /// All tables of a database with details in one call, for sources that
    /// support it. `None` means the crawl falls back to
    /// `list_table_names` + `get_table`.
    async fn list_tables(&self, _database: &str) -> AppResult<Option<Vec<TableMeta>>> {
        Ok(None)
    }

    /// Names of the tables in a database.
    async fn list_table_names(&self, database: &str) -> AppResult<Vec<String>>;

    /// Details of one table.
    async fn get_table(&self, database: &str, table: &str) -> AppResult<TableMeta>;

    /// Partitions of a partitioned table.
    async fn list_partitions(&self, table: &TableMeta) -> AppResult<Vec<PartitionMeta>>;
}

/// Database and table selection applied during a crawl.
///
/// Table rules are either `db.table` or `*.table`. A non-empty whitelist takes
/// precedence over the blacklist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilter {
    /// Only these databases, when non-empty.
    #[serde(default)]
    pub db_whitelist: Vec<String>,
    /// Databases to skip.
    #[serde(default)]
    pub db_blacklist: Vec<String>,
    /// Only these tables, when non-empty.
    #[serde(default)]
    pub table_whitelist: Vec<String>,
    /// Tables to skip.
    #[serde(default)]
    pub table_blacklist: Vec<String>,
}

fn table_rule_matches(rule: &str, database: &str, table: &str) -> bool {
    rule.strip_prefix("*.").map_or_else(
        || {
            rule.strip_prefix(database)
                .and_then(|rest| rest.strip_prefix('.'))
                == Some(table)
        },
        |name| name == table,
    )
}

impl SourceFilter {
    /// Whether a database is crawled.
    #[must_use]
    pub fn allows_database(&self, database: &str) -> bool {
        (self.db_whitelist.is_empty() || self.db_whitelist.iter().any(|d| d == database))
            && !self.db_blacklist.iter().any(|d| d == database)
    }

    /// Whether a table is crawled.
    #[must_use]
    pub fn allows_table(&self, database: &str, table: &str) -> bool {
        if !self.table_whitelist.is_empty() {
            return self
                .table_whitelist
                .iter()
                .any(|rule| table_rule_matches(rule, database, table));
        }
        !self
            .table_blacklist
            .iter()
            .any(|rule| table_rule_matches(rule, database, table))
    }
}

/// Crawl progress in basis points (0..=10000).
#[derive(Debug, Default)]
pub struct LoadProgress(AtomicU32);

impl LoadProgress {
    /// Value of a finished crawl.
    pub const COMPLETE: u32 = 10_000;
    /// Reached once databases are listed.
    pub const DATABASES_LOADED: u32 = 100;
    /// Reached once tables are listed.
    pub const TABLES_LOADED: u32 = 500;
    /// Share of the range advanced while listing partitions.
    pub const PARTITION_SHARE: u32 = 7_000;

    /// Progress at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Jump to an absolute value.
    pub fn set(&self, basis_points: u32) {
        self.0.store(basis_points.min(Self::COMPLETE), Ordering::Release);
    }

    /// Move forward, never past completion.
    pub fn advance(&self, basis_points: u32) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            Some(current.saturating_add(basis_points).min(Self::COMPLETE))
        });
    }

    /// Current value in basis points.
    #[must_use]
    pub fn basis_points(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Current value as a fraction in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self) -> f32 {
        let bp = u16::try_from(self.basis_points()).unwrap_or(u16::MAX);
        f32::from(bp) / 10_000.0
    }
}

/// Enumerate a source through its loader.
///
/// Databases, table details and partition listings are fetched with at most
/// `parallelism` requests in flight. The loader is closed afterwards whether or
/// not it opened and whether or not the crawl succeeded.
///
/// # Errors
///
/// Returns the first loader error encountered.
pub async fn crawl(
    loader: &dyn MetaLoader,
    filter: &SourceFilter,
    parallelism: usize,
    progress: &LoadProgress,
) -> AppResult<SourceCatalog> {
    let result = match loader.open().await {
        Ok(()) => crawl_open(loader, filter, parallelism.max(1), progress).await,
        Err(err) => Err(err),
    };
    loader.close().await;
    result
}

async fn crawl_open(
    loader: &dyn MetaLoader,
    filter: &SourceFilter,
    parallelism: usize,
    progress: &LoadProgress,
) -> AppResult<SourceCatalog> {
    let names: Vec<String> = loader
        .list_database_names()
        .await?
        .into_iter()
        .filter(|name| filter.allows_database(name))
        .collect();
    let databases: Vec<DatabaseMeta> = stream::iter(names)
        .map(move |name| async move { loader.get_database(&name).await })
        .buffer_unordered(parallelism)
        .try_collect()
        .await?;
    progress.set(LoadProgress::DATABASES_LOADED);

    let mut tables = Vec::new();
    for db in &databases {
        if let Some(listed) = loader.list_tables(&db.name).await? {
            tables.extend(
                listed
                    .into_iter()
                    .filter(|t| filter.allows_table(&db.name, &t.name)),
            );
            continue;
        }
        let wanted: Vec<String> = loader
            .list_table_names(&db.name)
            .await?
            .into_iter()
            .filter(|t| filter.allows_table(&db.name, t))
            .collect();
        let fetched: Vec<TableMeta> = stream::iter(wanted)
            .map(move |table| {
                let database = db.name.clone();
                async move { loader.get_table(&database, &table).await }
            })
            .buffer_unordered(parallelism)
            .try_collect()
            .await?;
        tables.extend(fetched);
    }
    progress.set(LoadProgress::TABLES_LOADED);

    let mut partitions = Vec::new();
    {
        let partitioned: Vec<TableMeta> = tables
            .iter()
            .filter(|t| t.has_partitions())
            .cloned()
            .collect();
        let count = u32::try_from(partitioned.len()).unwrap_or(u32::MAX).max(1);
        let step = LoadProgress::PARTITION_SHARE / count;

        let mut listings = stream::iter(partitioned)
            .map(move |table| async move { loader.list_partitions(&table).await })
            .buffer_unordered(parallelism);
        while let Some(listed) = listings.next().await {
            partitions.extend(listed?);
            progress.advance(step);
            tracing::debug!(progress = progress.fraction(), "loading partitions");
        }
    }
    progress.set(LoadProgress::COMPLETE);

    tracing::info!(
        kind = ?loader.kind(),
        databases = databases.len(),
        tables = tables.len(),
        partitions = partitions.len(),
        "metadata crawl finished"
    );
    Ok(SourceCatalog {
        databases,
        tables,
        partitions,
        loaded_at_ms: now_ms(),
    })
}
