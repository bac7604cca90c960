use std::fmt;
use std::time::Duration;

use bigtable_rs::bigtable::{BigTable as BigTableClient, BigTableConnection};
use bigtable_rs::google::bigtable::v2::{
    ReadModifyWriteRowRequest, ReadModifyWriteRowResponse, ReadModifyWriteRule, ReadRowsRequest,
    RowRange, RowSet, read_modify_write_rule, row_range,
};
use google_cloud_bigtable_admin_v2::client::BigtableTableAdmin;
use google_cloud_bigtable_admin_v2::model::modify_column_families_request::Modification;
use google_cloud_bigtable_admin_v2::model::{ColumnFamily, GcRule, Table};

use super::common::{
    BoxedConnection, COUNTER_COLUMN, Connection, CounterRow, Provisioned, Store, decode_counter,
    is_counter_row,
};
use crate::error::{StoreError, StoreResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cells older than this are eligible for garbage collection.
const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Location of the counter table in Bigtable.
#[derive(Clone, Debug)]
pub struct BigTableConfig {
    /// The Google project ID (not project number) containing the instance.
    pub project_id: String,
    /// Bigtable instance name.
    pub instance_name: String,
    /// Name of the table holding the counters.
    pub table_name: String,
    /// Column family holding the [`COUNTER_COLUMN`].
    pub column_family: String,
}

/// A [`Store`] backed by Google Cloud Bigtable.
///
/// Administrative calls go through the table admin API, while every [`Connection`] opens its own
/// gRPC channel to the data API.
pub struct BigTableStore {
    config: BigTableConfig,
    admin: BigtableTableAdmin,
    instance_path: String,
    table_path: String,
}

impl BigTableStore {
    /// Creates the admin client. No tables are touched until [`Store::ensure_table`].
    pub async fn new(config: BigTableConfig) -> StoreResult<Self> {
        let admin = BigtableTableAdmin::builder()
            .build()
            .await
            .map_err(|cause| StoreError::generic("failed to create table admin client", cause))?;

        let instance_path = format!(
            "projects/{}/instances/{}",
            config.project_id, config.instance_name
        );
        let table_path = format!("{instance_path}/tables/{}", config.table_name);

        Ok(Self {
            config,
            admin,
            instance_path,
            table_path,
        })
    }

    /// Returns `true` if the instance lists the configured table.
    async fn table_exists(&self) -> StoreResult<bool> {
        let mut page_token = String::new();
        loop {
            let response = self
                .admin
                .list_tables()
                .set_parent(self.instance_path.clone())
                .set_page_token(page_token)
                .send()
                .await
                .map_err(|cause| {
                    StoreError::generic(format!("failed to list tables of {}", self.instance_path), cause)
                })?;

            if response.tables.iter().any(|table| table.name == self.table_path) {
                return Ok(true);
            }
            if response.next_page_token.is_empty() {
                return Ok(false);
            }
            page_token = response.next_page_token;
        }
    }

    async fn create_table(&self) -> StoreResult<()> {
        tracing::debug!(table = %self.table_path, "creating table");
        self.admin
            .create_table()
            .set_parent(self.instance_path.clone())
            .set_table_id(self.config.table_name.clone())
            .set_table(Table::new())
            .send()
            .await
            .map_err(|cause| {
                StoreError::generic(format!("failed to create table {}", self.table_path), cause)
            })?;
        Ok(())
    }

    async fn modify_column_family(&self, modification: Modification) -> StoreResult<()> {
        self.admin
            .modify_column_families()
            .set_name(self.table_path.clone())
            .set_modifications([modification])
            .send()
            .await
            .map_err(|cause| {
                StoreError::generic(
                    format!(
                        "failed to modify column family {} of {}",
                        self.config.column_family, self.table_path
                    ),
                    cause,
                )
            })?;
        Ok(())
    }

    async fn open(&self) -> StoreResult<BigTableClient> {
        // NB: Defaults to gcp_auth::provider() internally, but first checks the
        // BIGTABLE_EMULATOR_HOST environment variable for local dev & tests.
        let connection = BigTableConnection::new(
            &self.config.project_id,
            &self.config.instance_name,
            false, // is_read_only
            1,     // channel_size
            Some(CONNECT_TIMEOUT),
        )
        .await
        .map_err(|cause| StoreError::bigtable("failed to connect", cause))?;

        Ok(connection.client())
    }
}

impl fmt::Debug for BigTableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigTableStore")
            .field("config", &self.config)
            .field("admin", &self.admin)
            .field("table_path", &self.table_path)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Store for BigTableStore {
    fn name(&self) -> &'static str {
        "bigtable"
    }

    async fn ensure_table(&self) -> StoreResult<Provisioned> {
        if self.table_exists().await? {
            tracing::debug!(table = %self.table_path, "table exists");
            return Ok(Provisioned::Existing);
        }

        self.create_table().await?;

        let family = &self.config.column_family;
        tracing::debug!(%family, "creating column family");
        let create = Modification::new()
            .set_id(family.clone())
            .set_create(ColumnFamily::new());
        self.modify_column_family(create).await?;

        let max_age = google_cloud_wkt::Duration::try_from(MAX_AGE)
            .map_err(|cause| StoreError::generic("invalid GC max age", cause))?;
        let update = Modification::new()
            .set_id(family.clone())
            .set_update(ColumnFamily::new().set_gc_rule(GcRule::new().set_max_age(max_age)));
        self.modify_column_family(update).await?;
        tracing::debug!(table = %self.table_path, max_age = ?MAX_AGE, "GC policy set");

        Ok(Provisioned::Created)
    }

    async fn connect(&self) -> StoreResult<BoxedConnection> {
        let client = self.open().await?;
        let table_name = client.get_full_table_name(&self.config.table_name);

        Ok(Box::new(BigTableWriter {
            client,
            table_name,
            column_family: self.config.column_family.clone(),
        }))
    }

    async fn read_counters(&self, key: &str) -> StoreResult<Vec<CounterRow>> {
        let mut client = self.open().await?;

        // `$` sorts right after the `#` separator, so this covers `key` and every `key#...`.
        let row_range = RowRange {
            start_key: Some(row_range::StartKey::StartKeyClosed(key.as_bytes().to_vec())),
            end_key: Some(row_range::EndKey::EndKeyOpen(format!("{key}$").into_bytes())),
        };
        let request = ReadRowsRequest {
            table_name: client.get_full_table_name(&self.config.table_name),
            rows: Some(RowSet {
                row_keys: vec![],
                row_ranges: vec![row_range],
            }),
            ..ReadRowsRequest::default()
        };

        let rows = client
            .read_rows(request)
            .await
            .map_err(|cause| StoreError::bigtable(format!("failed to read rows of `{key}`"), cause))?;

        let mut counters = Vec::with_capacity(rows.len());
        for (row_key, cells) in rows {
            let row_key = String::from_utf8_lossy(&row_key).into_owned();
            if !is_counter_row(key, &row_key) {
                continue;
            }
            let cell = cells.iter().find(|cell| {
                cell.family_name == self.config.column_family
                    && cell.qualifier == COUNTER_COLUMN.as_bytes()
            });
            if let Some(cell) = cell {
                let value = decode_counter(&row_key, &cell.value)?;
                counters.push(CounterRow::new(row_key, value));
            }
        }

        Ok(counters)
    }
}

/// A [`Connection`] owning its own Bigtable channel.
struct BigTableWriter {
    client: BigTableClient,
    table_name: String,
    column_family: String,
}

impl fmt::Debug for BigTableWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigTableWriter")
            .field("client", &format_args!("BigTableClient {{ ... }}"))
            .field("table_name", &self.table_name)
            .field("column_family", &self.column_family)
            .finish()
    }
}

impl BigTableWriter {
    fn increment_request(&self, row_key: &str, amount: i64) -> ReadModifyWriteRowRequest {
        ReadModifyWriteRowRequest {
            table_name: self.table_name.clone(),
            row_key: row_key.as_bytes().to_vec(),
            rules: vec![ReadModifyWriteRule {
                family_name: self.column_family.clone(),
                column_qualifier: COUNTER_COLUMN.as_bytes().to_vec(),
                rule: Some(read_modify_write_rule::Rule::IncrementAmount(amount)),
            }],
            ..ReadModifyWriteRowRequest::default()
        }
    }
}

#[async_trait::async_trait]
impl Connection for BigTableWriter {
    async fn increment(&mut self, row_key: &str, amount: i64) -> StoreResult<i64> {
        let request = self.increment_request(row_key, amount);
        let response = self
            .client
            .get_client()
            .read_modify_write_row(request)
            .await
            .map(|response| response.into_inner())
            .map_err(|cause| {
                StoreError::bigtable(format!("failed to increment `{row_key}`"), cause.into())
            })?;

        incremented_value(row_key, &response)
    }
}

/// Extracts the new counter value from the row returned by a read-modify-write.
fn incremented_value(row_key: &str, response: &ReadModifyWriteRowResponse) -> StoreResult<i64> {
    let cell = response
        .row
        .iter()
        .flat_map(|row| &row.families)
        .flat_map(|family| &family.columns)
        .filter(|column| column.qualifier == COUNTER_COLUMN.as_bytes())
        .find_map(|column| column.cells.first());

    match cell {
        Some(cell) => decode_counter(row_key, &cell.value),
        None => Err(StoreError::MalformedCounter {
            row_key: row_key.to_owned(),
            len: 0,
        }),
    }
}
