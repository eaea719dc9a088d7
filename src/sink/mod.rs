//! Record sink collaborator.
//!
//! Replicates extracted program and tooling records into the relational
//! store. The pipeline only depends on the [`RecordSink`] trait; replication
//! failures are per-job and never block conversion.

use async_trait::async_trait;
use snafu::prelude::*;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{ConnectSnafu, PutProgramSnafu, PutToolingSnafu, SinkError};
use crate::extract::{ProgramRecord, ToolRecord};

/// Identifier of a replicated program record.
pub type ProgramId = i64;

/// Replicates job records into the relational store.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    /// Replace any existing program row with the same o-number and tooling,
    /// insert the record, and return its id.
    async fn put_program(&self, record: &ProgramRecord) -> Result<ProgramId, SinkError>;

    /// Insert the tool rows under the given program id.
    async fn put_tooling(&self, tools: &[ToolRecord], program_id: ProgramId)
    -> Result<(), SinkError>;
}

/// SQL-backed record sink.
pub struct SqlRecordSink {
    pool: PgPool,
}

impl SqlRecordSink {
    /// Connect to the configured database.
    ///
    /// Connection failure is surfaced at startup, before any job is
    /// enqueued.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, SinkError> {
        info!(
            host = %config.host,
            port = config.port,
            db = %config.db,
            "Connecting to record sink"
        );
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&config.url())
            .await
            .context(ConnectSnafu)?;
        info!("Record sink connected");
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordSink for SqlRecordSink {
    async fn put_program(&self, record: &ProgramRecord) -> Result<ProgramId, SinkError> {
        debug!(
            o_number = record.o_number.as_deref().unwrap_or(""),
            tooling = record.tooling.as_deref().unwrap_or(""),
            "Replacing program record"
        );

        let mut tx = self.pool.begin().await.context(PutProgramSnafu)?;

        // Replace semantics: a re-run of the same job supersedes the rows it
        // wrote before.
        sqlx::query(
            "DELETE FROM toolings_list t USING programs_list p \
             WHERE t.program_id = p.id AND p.o_number = $1 AND p.tooling = $2",
        )
        .bind(&record.o_number)
        .bind(&record.tooling)
        .execute(&mut *tx)
        .await
        .context(PutProgramSnafu)?;

        sqlx::query("DELETE FROM programs_list WHERE o_number = $1 AND tooling = $2")
            .bind(&record.o_number)
            .bind(&record.tooling)
            .execute(&mut *tx)
            .await
            .context(PutProgramSnafu)?;

        let id: ProgramId = sqlx::query_scalar(
            "INSERT INTO programs_list \
             (o_number, model_num, parts_name, goods_name, files_name, create_date, \
              item_code, tools, creator, tooling, process_time, folder_path) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING id",
        )
        .bind(&record.o_number)
        .bind(&record.model_num)
        .bind(&record.parts_name)
        .bind(&record.goods_name)
        .bind(&record.files_name)
        .bind(&record.create_date)
        .bind(&record.item_code)
        .bind(&record.tools)
        .bind(&record.creator)
        .bind(&record.tooling)
        .bind(&record.process_time)
        .bind(&record.folder_path)
        .fetch_one(&mut *tx)
        .await
        .context(PutProgramSnafu)?;

        tx.commit().await.context(PutProgramSnafu)?;
        Ok(id)
    }

    async fn put_tooling(
        &self,
        tools: &[ToolRecord],
        program_id: ProgramId,
    ) -> Result<(), SinkError> {
        debug!(program_id, count = tools.len(), "Replicating tooling records");

        let mut tx = self.pool.begin().await.context(PutToolingSnafu)?;
        for tool in tools {
            sqlx::query(
                "INSERT INTO toolings_list (program_id, tool_no, name) VALUES ($1, $2, $3)",
            )
            .bind(program_id)
            .bind(&tool.tool_no)
            .bind(&tool.name)
            .execute(&mut *tx)
            .await
            .context(PutToolingSnafu)?;
        }
        tx.commit().await.context(PutToolingSnafu)?;
        Ok(())
    }
}
