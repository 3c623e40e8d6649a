use anyhow::Result;
use chrono::Utc;
use std::io::Write;

use crate::application::{AppError, ClassReportQuery, FinancialReport, LedgerService};
use crate::domain::ClassSlot;

use super::{BACKUP_FORMAT_VERSION, Backup, BackupAttendance, BackupPayment, BackupStudent};

/// Column headers of the member spreadsheet, shared with the importer.
pub const MEMBER_NAME_HEADER: &str = "Nama Lengkap";
pub const MEMBER_NICKNAME_HEADER: &str = "Nama Panggilan";
pub const MEMBER_SESSIONS_HEADER: &str = "Sisa Pertemuan";

/// Exporter for writing club data to JSON and CSV
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Build a full backup of every member and both histories.
    pub async fn backup(&self) -> Result<Backup> {
        let members = self.service.list_members(None).await?;
        let repo = self.service.repository();

        let mut students = Vec::with_capacity(members.len());
        for member in members {
            let payments = repo.list_payments(member.id).await?;
            let attendances = repo.list_attendances(member.id).await?;

            students.push(BackupStudent {
                id: Some(member.id.to_string()),
                name: member.name,
                nickname: member.nickname,
                remaining_sessions: member.remaining_sessions,
                payments: payments
                    .into_iter()
                    .map(|p| BackupPayment {
                        amount: p.amount,
                        sessions_added: p.sessions_added,
                        date: p.paid_at,
                    })
                    .collect(),
                attendances: attendances
                    .into_iter()
                    .map(|a| BackupAttendance {
                        date: a.attended_at,
                    })
                    .collect(),
            });
        }

        Ok(Backup {
            version: BACKUP_FORMAT_VERSION.to_string(),
            created_at: Utc::now(),
            students,
        })
    }

    /// Write the full backup as pretty JSON.
    pub async fn export_backup_json<W: Write>(&self, mut writer: W) -> Result<Backup> {
        let backup = self.backup().await?;

        let json = serde_json::to_string_pretty(&backup)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        tracing::info!(members = backup.students.len(), "exported backup");
        Ok(backup)
    }

    /// Export the member list (name, nickname, remaining sessions) to CSV.
    pub async fn export_members_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let members = self.service.list_members(None).await?;
        if members.is_empty() {
            return Err(AppError::NothingToExport("no members registered".to_string()).into());
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            MEMBER_NAME_HEADER,
            MEMBER_NICKNAME_HEADER,
            MEMBER_SESSIONS_HEADER,
        ])?;

        for member in &members {
            csv_writer.write_record([
                member.name.as_str(),
                member.nickname.as_deref().unwrap_or(""),
                &member.remaining_sessions.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(members.len())
    }

    /// Export the class attendance report to CSV, one row per member.
    pub async fn export_class_report_csv<W: Write>(
        &self,
        writer: W,
        query: &ClassReportQuery,
    ) -> Result<usize> {
        let report = self.service.class_report(query).await?;
        if report.members.is_empty() {
            return Err(
                AppError::NothingToExport("no attendance in the selected period".to_string())
                    .into(),
            );
        }

        let mut csv_writer = csv::Writer::from_writer(writer);

        let mut header = vec![
            MEMBER_NAME_HEADER.to_string(),
            MEMBER_NICKNAME_HEADER.to_string(),
        ];
        header.extend(ClassSlot::ALL.iter().map(|slot| slot.label().to_string()));
        header.push("Total".to_string());
        header.push("Status".to_string());
        csv_writer.write_record(&header)?;

        for stats in &report.members {
            let mut row = vec![
                stats.name.clone(),
                stats.nickname.clone().unwrap_or_default(),
            ];
            row.extend(ClassSlot::ALL.iter().map(|slot| stats.count(*slot).to_string()));
            row.push(stats.total_in_period.to_string());
            row.push(stats.status.label().to_string());
            csv_writer.write_record(&row)?;
        }

        csv_writer.flush()?;
        Ok(report.members.len())
    }
}

/// Write a financial report as CSV: one row per paying member.
pub fn write_financial_report_csv<W: Write>(report: &FinancialReport, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["member", "total", "payments"])?;

    for entry in &report.entries {
        csv_writer.write_record([
            entry.member_name.as_str(),
            &entry.total_amount.to_string(),
            &entry.payment_count.to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
