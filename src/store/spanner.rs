use anyhow::{Context, Result};
use async_trait::async_trait;
use gcloud_gax::grpc::Code;
use gcloud_googleapis::spanner::admin::database::v1::{
    CreateDatabaseRequest, GetDatabaseDdlRequest, GetDatabaseRequest, UpdateDatabaseDdlRequest,
};
use gcloud_googleapis::spanner::admin::instance::v1::{
    CreateInstanceRequest, GetInstanceRequest, Instance,
};
use gcloud_spanner::admin::client::Client as AdminClient;
use gcloud_spanner::admin::AdminClientConfig;
use gcloud_spanner::client::{Client, ClientConfig, Error as SpannerError};
use gcloud_spanner::key::Key;
use gcloud_spanner::mutation::{delete, insert_or_update};
use gcloud_spanner::statement::Statement;
use gcloud_spanner::value::CommitTimestamp;
use std::sync::Arc;

use super::KvStore;
use crate::config::SpannerConfig;

const TABLE: &str = "kv_entries";

const CREATE_TABLE_DDL: &str = r#"
CREATE TABLE kv_entries (
    kv_key STRING(MAX) NOT NULL,
    kv_value STRING(MAX) NOT NULL,
    updated_at TIMESTAMP NOT NULL OPTIONS (allow_commit_timestamp=true),
) PRIMARY KEY (kv_key)
"#;

/// `KvStore` over a single Spanner table.
///
/// Reads and writes touch one row each. `del` reads the row and buffers its
/// delete inside one read-write transaction, so of two concurrent deletes
/// of the same key only one reports a removal.
#[derive(Clone)]
pub struct SpannerStore {
    inner: Arc<Client>,
}

impl SpannerStore {
    /// Connect to the configured database, provisioning it first.
    ///
    /// The gcloud-spanner client picks up `SPANNER_EMULATOR_HOST` from the
    /// environment on its own, so the emulator host in the config is only
    /// used to choose the instance config during provisioning.
    ///
    /// # Arguments
    /// * `config` - Project, instance and database to connect to
    ///
    /// # Returns
    /// * `SpannerStore` - A cloneable store sharing one Spanner client
    ///
    /// # Errors
    /// Returns an error if provisioning fails or the client cannot connect
    pub async fn from_config(config: &SpannerConfig) -> Result<Self> {
        auto_provision(config).await?;

        let database_path = config.database_path();

        match &config.emulator_host {
            Some(host) => tracing::info!("Connecting to Spanner emulator at: {}", host),
            None => tracing::info!("Connecting to production Spanner"),
        }

        let client = Client::new(&database_path, ClientConfig::default())
            .await
            .context("Failed to create Spanner client")?;

        tracing::info!("Connected to Spanner database: {}", database_path);

        Ok(Self {
            inner: Arc::new(client),
        })
    }

    async fn read_value(&self, key: &str) -> Result<Option<String>> {
        let mut statement = Statement::new("SELECT kv_value FROM kv_entries WHERE kv_key = @key");
        statement.add_param("key", &key.to_string());

        let mut tx = self
            .inner
            .single()
            .await
            .context("Failed to create read transaction")?;

        let mut result_set = tx
            .query(statement)
            .await
            .context("Failed to query kv_entries")?;

        match result_set.next().await? {
            Some(row) => {
                let value: String = row.column_by_name("kv_value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KvStore for SpannerStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let value = String::from_utf8(value)
            .with_context(|| format!("Value for key '{}' is not valid UTF-8", key))?;

        let mutation = insert_or_update(
            TABLE,
            &["kv_key", "kv_value", "updated_at"],
            &[&key.to_string(), &value, &CommitTimestamp::new()],
        );

        self.inner
            .apply(vec![mutation])
            .await
            .context("Failed to write key to Spanner")?;

        tracing::debug!("Set key: {}", key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read_value(key).await?.map(String::into_bytes))
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let key = key.to_string();

        let (_, removed) = self
            .inner
            .read_write_transaction(|tx| {
                let key = key.clone();
                Box::pin(async move {
                    let row = tx.read_row(TABLE, &["kv_key"], Key::new(&key)).await?;
                    if row.is_none() {
                        return Ok::<bool, SpannerError>(false);
                    }
                    tx.buffer_write(vec![delete(TABLE, Key::new(&key))]);
                    Ok(true)
                })
            })
            .await
            .context("Failed to delete key from Spanner")?;

        if removed {
            tracing::debug!("Deleted key: {}", key);
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.read_value(key).await?.is_some())
    }
}

/// Create the instance, database and table when missing.
///
/// Lets the service start against an empty emulator with no setup.
async fn auto_provision(config: &SpannerConfig) -> Result<()> {
    tracing::info!("Starting auto-provisioning checks...");

    let admin_client = AdminClient::new(AdminClientConfig::default())
        .await
        .context("Failed to create Spanner admin client")?;

    let project_path = format!("projects/{}", config.project);
    let instance_path = format!("{}/instances/{}", project_path, config.instance);
    let database_path = config.database_path();

    ensure_instance(&admin_client, config, &project_path, &instance_path).await?;
    let created = ensure_database(&admin_client, config, &instance_path, &database_path).await?;
    if !created {
        ensure_table(&admin_client, &database_path).await?;
    }

    tracing::info!("Auto-provisioning complete");
    Ok(())
}

async fn ensure_instance(
    admin_client: &AdminClient,
    config: &SpannerConfig,
    project_path: &str,
    instance_path: &str,
) -> Result<()> {
    let get_request = GetInstanceRequest {
        name: instance_path.to_string(),
        field_mask: None,
    };

    match admin_client.instance().get_instance(get_request, None).await {
        Ok(_) => {
            tracing::info!("Instance already exists: {}", instance_path);
            Ok(())
        }
        Err(status) if status.code() == Code::NotFound => {
            tracing::info!("Instance not found, creating: {}", instance_path);

            let instance_config = match config.emulator_host {
                Some(_) => format!("{}/instanceConfigs/emulator-config", project_path),
                None => format!("{}/instanceConfigs/regional-us-central1", project_path),
            };

            let create_request = CreateInstanceRequest {
                parent: project_path.to_string(),
                instance_id: config.instance.clone(),
                instance: Some(Instance {
                    name: instance_path.to_string(),
                    config: instance_config,
                    display_name: format!("{} instance", config.instance),
                    node_count: 1,
                    ..Default::default()
                }),
            };

            admin_client
                .instance()
                .create_instance(create_request, None)
                .await
                .context("Failed to start instance creation")?
                .wait(None)
                .await
                .context("Failed to create instance")?;

            tracing::info!("Instance created: {}", instance_path);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(
            "Failed to check instance existence: {}",
            e.message()
        )),
    }
}

/// Returns `true` when the database was created here, table included
async fn ensure_database(
    admin_client: &AdminClient,
    config: &SpannerConfig,
    instance_path: &str,
    database_path: &str,
) -> Result<bool> {
    let get_request = GetDatabaseRequest {
        name: database_path.to_string(),
    };

    match admin_client.database().get_database(get_request, None).await {
        Ok(_) => {
            tracing::info!("Database already exists: {}", database_path);
            Ok(false)
        }
        Err(status) if status.code() == Code::NotFound => {
            tracing::info!("Database not found, creating: {}", database_path);

            let create_request = CreateDatabaseRequest {
                parent: instance_path.to_string(),
                create_statement: format!("CREATE DATABASE `{}`", config.database),
                extra_statements: vec![CREATE_TABLE_DDL.trim().to_string()],
                encryption_config: None,
                database_dialect: 1, // Google Standard SQL
                proto_descriptors: vec![],
            };

            admin_client
                .database()
                .create_database(create_request, None)
                .await
                .context("Failed to start database creation")?
                .wait(None)
                .await
                .context("Failed to create database")?;

            tracing::info!("Database created with table '{}': {}", TABLE, database_path);
            Ok(true)
        }
        Err(e) => Err(anyhow::anyhow!(
            "Failed to check database existence: {}",
            e.message()
        )),
    }
}

async fn ensure_table(admin_client: &AdminClient, database_path: &str) -> Result<()> {
    let get_ddl_request = GetDatabaseDdlRequest {
        database: database_path.to_string(),
    };

    let ddl = admin_client
        .database()
        .get_database_ddl(get_ddl_request, None)
        .await
        .context("Failed to get database DDL")?
        .into_inner();

    if ddl.statements.iter().any(|stmt| declares_table(stmt)) {
        tracing::info!("Table '{}' already exists", TABLE);
        return Ok(());
    }

    tracing::info!("Table '{}' not found, creating...", TABLE);

    let update_request = UpdateDatabaseDdlRequest {
        database: database_path.to_string(),
        statements: vec![CREATE_TABLE_DDL.trim().to_string()],
        operation_id: String::new(),
        proto_descriptors: vec![],
        throughput_mode: false,
    };

    admin_client
        .database()
        .update_database_ddl(update_request, None)
        .await
        .context("Failed to start table creation")?
        .wait(None)
        .await
        .context("Failed to create table")?;

    tracing::info!("Table '{}' created", TABLE);
    Ok(())
}

fn declares_table(statement: &str) -> bool {
    statement.contains("CREATE TABLE kv_entries") || statement.contains("CREATE TABLE `kv_entries`")
}
