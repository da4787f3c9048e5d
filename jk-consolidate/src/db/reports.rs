//! Report persistence
//!
//! Each run stores one row in `consolidation_reports` with the full report as
//! JSON plus a few columns for listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use jk_common::{Error, Result};

use crate::models::{ConsolidationReport, RepairReport};

/// Listing row for a stored report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub report_id: String,
    /// `consolidation` or `repair`
    pub kind: String,
    pub phase: Option<String>,
    pub executed: bool,
    pub snapshot_id: Option<String>,
    pub started_at: String,
    pub failed_groups: i64,
}

/// Persist a consolidation report (insert or overwrite)
pub async fn save_consolidation_report(db: &Pool<Sqlite>, report: &ConsolidationReport) -> Result<()> {
    let json = serde_json::to_string(report)
        .map_err(|e| Error::Internal(format!("Failed to serialize report: {}", e)))?;

    save_row(
        db,
        &report.report_id,
        "consolidation",
        Some(report.phase.as_str()),
        report.executed,
        report.snapshot_id.as_deref(),
        report.started_at,
        report.ended_at,
        report.failed_groups() as i64,
        &json,
    )
    .await
}

/// Persist a link repair report (insert or overwrite)
pub async fn save_repair_report(db: &Pool<Sqlite>, report: &RepairReport) -> Result<()> {
    let json = serde_json::to_string(report)
        .map_err(|e| Error::Internal(format!("Failed to serialize report: {}", e)))?;

    save_row(
        db,
        &report.report_id,
        "repair",
        None,
        report.executed,
        report.snapshot_id.as_deref(),
        report.started_at,
        report.ended_at,
        report.errors.len() as i64,
        &json,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn save_row(
    db: &Pool<Sqlite>,
    report_id: &str,
    kind: &str,
    phase: Option<&str>,
    executed: bool,
    snapshot_id: Option<&str>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    failed_groups: i64,
    json: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO consolidation_reports (
            report_id, kind, phase, executed, snapshot_id, started_at, ended_at, failed_groups, report
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(report_id) DO UPDATE SET
            executed = excluded.executed,
            snapshot_id = excluded.snapshot_id,
            ended_at = excluded.ended_at,
            failed_groups = excluded.failed_groups,
            report = excluded.report
        "#,
    )
    .bind(report_id)
    .bind(kind)
    .bind(phase)
    .bind(executed as i64)
    .bind(snapshot_id)
    .bind(started_at.to_rfc3339())
    .bind(ended_at.map(|t| t.to_rfc3339()))
    .bind(failed_groups)
    .bind(json)
    .execute(db)
    .await?;

    tracing::debug!(report_id, kind, "Saved report to database");

    Ok(())
}

/// Load a stored consolidation report
pub async fn load_consolidation_report(
    db: &Pool<Sqlite>,
    report_id: &str,
) -> Result<Option<ConsolidationReport>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT report FROM consolidation_reports WHERE report_id = ? AND kind = 'consolidation'",
    )
    .bind(report_id)
    .fetch_optional(db)
    .await?;

    row.map(|(json,)| {
        serde_json::from_str(&json)
            .map_err(|e| Error::Internal(format!("Failed to deserialize report: {}", e)))
    })
    .transpose()
}

/// Most recent reports first
pub async fn list_reports(db: &Pool<Sqlite>, limit: i64) -> Result<Vec<ReportSummary>> {
    let rows: Vec<(String, String, Option<String>, i64, Option<String>, String, i64)> = sqlx::query_as(
        r#"
        SELECT report_id, kind, phase, executed, snapshot_id, started_at, failed_groups
        FROM consolidation_reports
        ORDER BY started_at DESC, report_id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(report_id, kind, phase, executed, snapshot_id, started_at, failed_groups)| ReportSummary {
                report_id,
                kind,
                phase,
                executed: executed != 0,
                snapshot_id,
                started_at,
                failed_groups,
            },
        )
        .collect())
}
