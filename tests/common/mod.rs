//! PostgreSQL fixtures for integration tests. Every test provisions its own
//! shared schema and tenant schemas under a random prefix and drops them
//! afterwards. Tests skip themselves when `DATABASE_URL` is not set.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tenant_scope::config::{AppConfig, DatabaseConfig};
use tenant_scope::database::{DatabaseManager, PgScopePool, PgTenantRegistry};
use tenant_scope::tenancy::Tenancy;

pub struct TenantFixture<'a> {
    pub slug: &'a str,
    /// `None` registers the tenant without creating its schema
    pub accounts: Option<Vec<(&'a str, &'a str)>>,
}

pub struct Fixture {
    pub database: DatabaseManager,
    pub tenancy: Tenancy<PgScopePool>,
    pub shared: String,
    schemas: Vec<String>,
}

impl Fixture {
    pub async fn setup(
        max_connections: u32,
        acquire_timeout_ms: u64,
        tenants: &[TenantFixture<'_>],
    ) -> Result<Option<Self>> {
        let _ = dotenvy::dotenv();
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping");
            return Ok(None);
        };

        let db_config = DatabaseConfig {
            max_connections,
            acquire_timeout_ms,
            idle_timeout_secs: 60,
            registry_table: "tenants".to_string(),
        };
        let database = DatabaseManager::connect_with_url(&url, &db_config)
            .await
            .context("failed to connect to DATABASE_URL")?;
        database.health_check().await?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let shared = format!("scope_test_{}", &id[..8]);
        let mut schemas = vec![shared.clone()];

        execute(&database, &format!("CREATE SCHEMA \"{}\"", shared)).await?;
        execute(
            &database,
            &format!(
                "CREATE TABLE \"{}\".tenants (
                    id uuid PRIMARY KEY,
                    slug text NOT NULL UNIQUE,
                    schema_name text NOT NULL UNIQUE,
                    name text NOT NULL,
                    created_at timestamptz NOT NULL DEFAULT now(),
                    settings jsonb
                )",
                shared
            ),
        )
        .await?;
        register(&database, &shared, "default", &shared, "Default").await?;

        for tenant in tenants {
            let schema = format!("{}_{}", shared, tenant.slug);
            register(&database, &shared, tenant.slug, &schema, tenant.slug).await?;

            let Some(accounts) = &tenant.accounts else { continue };
            execute(&database, &format!("CREATE SCHEMA \"{}\"", schema)).await?;
            schemas.push(schema.clone());
            execute(
                &database,
                &format!("CREATE TABLE \"{}\".accounts (id text PRIMARY KEY, owner text NOT NULL)", schema),
            )
            .await?;
            for (id, owner) in accounts {
                sqlx::query(&format!("INSERT INTO \"{}\".accounts (id, owner) VALUES ($1, $2)", schema))
                    .bind(id)
                    .bind(owner)
                    .execute(database.pool())
                    .await?;
            }
        }

        let mut config = AppConfig::from_env();
        config.database = db_config;
        config.tenancy.shared_schema = shared.clone();
        config.tenancy.allow_default_fallback = true;
        config.tenancy.entities = vec!["accounts".to_string()];

        let registry = PgTenantRegistry::new(database.pool().clone(), &shared, "tenants")?;
        let pool = PgScopePool::new(database.clone());
        let tenancy = Tenancy::initialize(&config, Arc::new(registry), Arc::new(pool)).await?;

        Ok(Some(Self {
            database,
            tenancy,
            shared,
            schemas,
        }))
    }

    /// Wait for every connection to come back; release hooks run after the
    /// scope hands the connection over.
    pub async fn wait_idle(&self) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.database.checked_out() > 0 {
            if Instant::now() > deadline {
                anyhow::bail!("{} connections still checked out", self.database.checked_out());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }

    /// Search path of `count` connections checked out at once
    pub async fn pooled_search_paths(&self, count: usize) -> Result<Vec<String>> {
        let mut conns = Vec::new();
        for _ in 0..count {
            conns.push(self.database.acquire().await?);
        }
        let mut paths = Vec::new();
        for conn in conns.iter_mut() {
            let path: String = sqlx::query_scalar("SELECT current_setting('search_path')")
                .fetch_one(&mut **conn)
                .await?;
            paths.push(path);
        }
        Ok(paths)
    }

    pub async fn teardown(self) -> Result<()> {
        for schema in self.schemas.iter().rev() {
            execute(&self.database, &format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", schema)).await?;
        }
        self.database.close().await;
        Ok(())
    }
}

pub fn owners(rows: &[Value]) -> Vec<&str> {
    rows.iter().filter_map(|r| r["owner"].as_str()).collect()
}

async fn execute(database: &DatabaseManager, sql: &str) -> Result<()> {
    sqlx::query(sql)
        .execute(database.pool())
        .await
        .with_context(|| format!("failed: {}", sql))?;
    Ok(())
}

async fn register(database: &DatabaseManager, shared: &str, slug: &str, schema: &str, name: &str) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO \"{}\".tenants (id, slug, schema_name, name) VALUES ($1, $2, $3, $4)",
        shared
    ))
    .bind(uuid::Uuid::new_v4())
    .bind(slug)
    .bind(schema)
    .bind(name)
    .execute(database.pool())
    .await?;
    Ok(())
}
