//! Minimal embedded migration runner for the single `jobs` table.

use scheduler_core::error::{Error, Result};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            migrations: jobs_migrations(),
        }
    }

    pub async fn run(&self, pool: &PgPool) -> Result<Vec<i64>> {
        self.ensure_migrations_table(pool).await?;
        let applied = self.get_applied_migrations(pool).await?;

        let mut newly_applied = Vec::new();
        for migration in &self.migrations {
            if !applied.contains(&migration.version) {
                self.apply_migration(pool, migration).await?;
                newly_applied.push(migration.version);
            }
        }

        if newly_applied.is_empty() {
            tracing::info!("no pending migrations");
        } else {
            tracing::info!(count = newly_applied.len(), "applied migrations");
        }

        Ok(newly_applied)
    }

    async fn ensure_migrations_table(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::database_with_source("failed to create migrations table", e))?;
        Ok(())
    }

    async fn get_applied_migrations(&self, pool: &PgPool) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT version FROM _migrations ORDER BY version")
            .fetch_all(pool)
            .await
            .map_err(|e| Error::database_with_source("failed to read applied migrations", e))?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    async fn apply_migration(&self, pool: &PgPool, migration: &Migration) -> Result<()> {
        tracing::info!(version = migration.version, name = %migration.name, "applying migration");

        sqlx::query(&migration.sql)
            .execute(pool)
            .await
            .map_err(|e| {
                Error::database_with_source(format!("migration {} failed", migration.version), e)
            })?;

        sqlx::query("INSERT INTO _migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.name)
            .execute(pool)
            .await
            .map_err(|e| Error::database_with_source("failed to record migration", e))?;

        Ok(())
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

fn jobs_migrations() -> Vec<Migration> {
    vec![Migration::new(
        1,
        "create_jobs_table",
        r#"
        CREATE TABLE jobs (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            job_type VARCHAR(20) NOT NULL DEFAULT 'HTTP',
            target TEXT NOT NULL,
            payload JSONB,
            schedule_type VARCHAR(20) NOT NULL,
            cron_expression VARCHAR(100),
            specific_time TIMESTAMPTZ,
            interval VARCHAR(20),
            interval_value INT,
            status VARCHAR(20) NOT NULL DEFAULT 'ACTIVE',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_run TIMESTAMPTZ,
            next_run TIMESTAMPTZ,
            error_message TEXT
        );

        CREATE INDEX idx_jobs_status ON jobs(status);
        CREATE INDEX idx_jobs_next_run ON jobs(next_run);
        "#,
    )]
}
