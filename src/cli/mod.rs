use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};

use crate::application::{ClassReportQuery, LedgerService, ReportPeriod};
use crate::config::{ClubConfig, DEFAULT_MAX_UPDATE_ATTEMPTS};
use crate::domain::{
    ClassSlot, Member, classify_instant, day_bounds, format_rupiah, from_local, parse_rupiah,
    parse_utc_offset, to_local,
};

/// Kolam - Swimming club member, session and payment ledger
#[derive(Parser)]
#[command(name = "kolam")]
#[command(about = "Track prepaid swimming sessions, check-ins and package payments")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "KOLAM_DATABASE", default_value = "kolam.db")]
    pub database: String,

    /// Club wall clock as a UTC offset (e.g. "+07:00")
    #[arg(long, env = "KOLAM_UTC_OFFSET", default_value = "+07:00", global = true)]
    pub utc_offset: String,

    /// Attempts for a contended ledger update before giving up
    #[arg(long, env = "KOLAM_MAX_UPDATE_ATTEMPTS", default_value_t = DEFAULT_MAX_UPDATE_ATTEMPTS, global = true)]
    pub max_update_attempts: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Member management commands
    #[command(subcommand)]
    Member(MemberCommands),

    /// Check a member in, using one session
    Attend {
        /// Member name or ID
        member: String,

        /// Check-in time in club time (YYYY-MM-DD HH:MM, defaults to now)
        #[arg(long)]
        at: Option<String>,

        /// Record even if the member already checked in that day
        #[arg(long)]
        force: bool,
    },

    /// Record a package payment and credit its sessions
    Pay {
        /// Member name or ID
        member: String,

        /// Amount paid (e.g. "250000", "250.000" or "Rp 500.000")
        amount: String,

        /// Payment time in club time (YYYY-MM-DD HH:MM, defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Generate reports
    #[command(subcommand)]
    Report(ReportCommands),

    /// Export data to JSON or CSV
    #[command(subcommand)]
    Export(ExportCommands),

    /// Import data from JSON or CSV
    #[command(subcommand)]
    Import(ImportCommands),
}

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Register a new member
    Add {
        /// Full name
        name: String,

        /// Nickname
        #[arg(short, long)]
        nickname: Option<String>,
    },

    /// List members
    List {
        /// Filter on name or nickname
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show a member with payment and attendance history
    Show {
        /// Member name or ID
        member: String,
    },

    /// Change a member's name or nickname
    Edit {
        /// Member name or ID
        member: String,

        /// New full name
        #[arg(long)]
        name: Option<String>,

        /// New nickname
        #[arg(short, long, conflicts_with = "clear_nickname")]
        nickname: Option<String>,

        /// Remove the nickname
        #[arg(long)]
        clear_nickname: bool,
    },

    /// Delete a member and its history
    Delete {
        /// Member name or ID
        member: String,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Overwrite the remaining session count (no history is written)
    SetSessions {
        /// Member name or ID
        member: String,

        /// New remaining session count
        #[arg(allow_negative_numbers = true)]
        sessions: i64,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Payments per member
    Financial {
        /// Start date (YYYY-MM-DD, club time)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, club time, inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Attendance per member and class slot
    Classes {
        #[command(flatten)]
        filter: ClassFilterArgs,

        /// Show check-in times per slot
        #[arg(long)]
        details: bool,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(clap::Args)]
pub struct ClassFilterArgs {
    /// Period: today, week, month, all
    #[arg(short, long, default_value = "month")]
    period: String,

    /// Custom start date (YYYY-MM-DD), overrides --period
    #[arg(long, requires = "to")]
    from: Option<String>,

    /// Custom end date (YYYY-MM-DD, inclusive)
    #[arg(long, requires = "from")]
    to: Option<String>,

    /// Only members who attended this class: A-F, J or other
    #[arg(short, long)]
    class: Option<String>,

    /// Filter on name or nickname
    #[arg(short, long)]
    search: Option<String>,
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Full backup of members and history as JSON
    Backup {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Member list as CSV
    Members {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Class attendance report as CSV
    Classes {
        #[command(flatten)]
        filter: ClassFilterArgs,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Restore a JSON backup, replacing ALL current data
    Backup {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Confirm that existing data will be replaced
        #[arg(long)]
        yes: bool,
    },

    /// Update nicknames and session counts from a CSV member list
    Members {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
}

impl Cli {
    fn club_config(&self) -> Result<ClubConfig> {
        let offset = parse_utc_offset(&self.utc_offset).with_context(|| {
            format!(
                "Invalid UTC offset '{}'. Use e.g. '+07:00'",
                self.utc_offset
            )
        })?;
        Ok(ClubConfig::default()
            .with_utc_offset(offset)
            .with_max_update_attempts(self.max_update_attempts))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.club_config()?;
        tracing::debug!(database = %self.database, utc_offset = %config.utc_offset, "starting");

        if let Commands::Init = self.command {
            LedgerService::init(&self.database, config).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let service = LedgerService::connect(&self.database, config).await?;

        match self.command {
            Commands::Init => {}

            Commands::Member(member_cmd) => {
                run_member_command(&service, member_cmd).await?;
            }

            Commands::Attend { member, at, force } => {
                run_attend_command(&service, &member, at.as_deref(), force).await?;
            }

            Commands::Pay { member, amount, at } => {
                let member = service.find_member(&member).await?;
                let amount = parse_rupiah(&amount)
                    .context("Invalid amount format. Use '250000', '250.000' or 'Rp 250.000'")?;
                let receipt = match at {
                    Some(at) => {
                        let paid_at = parse_club_time(&at, service.config().utc_offset)?;
                        service.record_payment_at(member.id, amount, paid_at).await?
                    }
                    None => service.record_payment(member.id, amount).await?,
                };

                let added = receipt.payment().map(|p| p.sessions_added).unwrap_or(0);
                println!(
                    "Recorded payment: {} for {} (+{} sessions, {} remaining)",
                    format_rupiah(amount),
                    receipt.member.name,
                    added,
                    receipt.member.remaining_sessions
                );
            }

            Commands::Report(report_cmd) => {
                run_report_command(&service, report_cmd).await?;
            }

            Commands::Export(export_cmd) => {
                run_export_command(&service, export_cmd).await?;
            }

            Commands::Import(import_cmd) => {
                run_import_command(&service, import_cmd).await?;
            }
        }

        Ok(())
    }
}

async fn run_member_command(service: &LedgerService, cmd: MemberCommands) -> Result<()> {
    match cmd {
        MemberCommands::Add { name, nickname } => {
            let member = service.register_member(&name, nickname.as_deref()).await?;
            println!("Registered member: {} ({})", member.name, member.id);
        }

        MemberCommands::List { search } => {
            let members = service.list_members(search.as_deref()).await?;
            if members.is_empty() {
                println!("No members found.");
            } else {
                println!("{:<30} {:<15} {:>9}", "NAME", "NICKNAME", "SESSIONS");
                println!("{}", "-".repeat(56));
                for member in &members {
                    println!(
                        "{:<30} {:<15} {:>9}",
                        truncate(&member.name, 30),
                        truncate(member.nickname.as_deref().unwrap_or(""), 15),
                        member.remaining_sessions
                    );
                }
                println!("{}", "-".repeat(56));
                println!("{} member(s)", members.len());
            }
        }

        MemberCommands::Show { member } => {
            let member = service.find_member(&member).await?;
            run_show_member_command(service, &member).await?;
        }

        MemberCommands::Edit {
            member,
            name,
            nickname,
            clear_nickname,
        } => {
            let current = service.find_member(&member).await?;
            let name = name.unwrap_or_else(|| current.name.clone());
            let nickname = if clear_nickname {
                None
            } else {
                nickname.or_else(|| current.nickname.clone())
            };

            let updated = service
                .update_member(current.id, &name, nickname.as_deref())
                .await?;
            println!(
                "Updated member: {}{}",
                updated.name,
                updated
                    .nickname
                    .as_deref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default()
            );
        }

        MemberCommands::Delete { member, yes } => {
            let member = service.find_member(&member).await?;
            if !yes {
                anyhow::bail!(
                    "Deleting '{}' also removes its payment and attendance history. Re-run with --yes to confirm",
                    member.name
                );
            }
            service.delete_member(member.id).await?;
            println!("Deleted member: {}", member.name);
        }

        MemberCommands::SetSessions { member, sessions } => {
            let member = service.find_member(&member).await?;
            let previous = member.remaining_sessions;
            let updated = service.set_sessions_manually(member.id, sessions).await?;
            println!(
                "Sessions for {}: {} -> {}",
                updated.name, previous, updated.remaining_sessions
            );
        }
    }
    Ok(())
}

async fn run_show_member_command(service: &LedgerService, member: &Member) -> Result<()> {
    let detail = service.member_detail(member.id).await?;
    let member = &detail.member;
    let offset = service.config().utc_offset;

    println!("Member: {}", member.name);
    println!("  ID:         {}", member.id);
    if let Some(nickname) = &member.nickname {
        println!("  Nickname:   {}", nickname);
    }
    println!("  Sessions:   {}", member.remaining_sessions);
    println!(
        "  Registered: {}",
        to_local(member.created_at, offset).format("%Y-%m-%d %H:%M")
    );
    if detail.history_balance != member.remaining_sessions {
        println!(
            "  Note:       history accounts for {} session(s); the counter was corrected manually",
            detail.history_balance
        );
    }

    println!();
    println!("Payments ({}):", detail.payments.len());
    for payment in &detail.payments {
        println!(
            "  {}  {:>12}  +{} sessions",
            to_local(payment.paid_at, offset).format("%Y-%m-%d %H:%M"),
            format_rupiah(payment.amount),
            payment.sessions_added
        );
    }

    println!();
    println!("Attendance ({}):", detail.attendances.len());
    for attendance in &detail.attendances {
        let slot = classify_instant(attendance.attended_at, offset);
        println!(
            "  {}  {}",
            to_local(attendance.attended_at, offset).format("%Y-%m-%d %H:%M"),
            slot.label()
        );
    }

    Ok(())
}

async fn run_attend_command(
    service: &LedgerService,
    member: &str,
    at: Option<&str>,
    force: bool,
) -> Result<()> {
    let member = service.find_member(member).await?;
    let offset = service.config().utc_offset;
    let attended_at = match at {
        Some(at) => parse_club_time(at, offset)?,
        None => Utc::now(),
    };

    let day = to_local(attended_at, offset).date();
    if !force && service.has_attended_on(member.id, day).await? {
        anyhow::bail!(
            "{} already checked in on {}. Use --force to record another session",
            member.name,
            day
        );
    }

    let receipt = service.record_attendance_at(member.id, attended_at).await?;
    let slot = classify_instant(attended_at, offset);
    println!(
        "Checked in: {} ({}), {} session(s) remaining",
        receipt.member.display_name(),
        slot.label(),
        receipt.member.remaining_sessions
    );
    if receipt.member.remaining_sessions < 0 {
        eprintln!(
            "Warning: {} owes {} session(s)",
            receipt.member.name,
            -receipt.member.remaining_sessions
        );
    }
    Ok(())
}

async fn run_report_command(service: &LedgerService, cmd: ReportCommands) -> Result<()> {
    use crate::io::write_financial_report_csv;

    let offset = service.config().utc_offset;

    match cmd {
        ReportCommands::Financial { from, to, format } => {
            let from_date = from
                .map(|s| parse_date(&s).map(|d| day_bounds(d, offset).0))
                .transpose()
                .context("Invalid from date")?;
            let to_date = to
                .map(|s| parse_date(&s).map(|d| day_bounds(d, offset).1))
                .transpose()
                .context("Invalid to date")?;

            let report = service.financial_report(from_date, to_date).await?;

            match format.as_str() {
                "json" => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                "csv" => {
                    write_financial_report_csv(&report, std::io::stdout())?;
                }
                _ => {
                    println!("Financial Report");
                    println!(
                        "Period: {} to {}",
                        from_date
                            .map(|d| to_local(d, offset).format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "beginning".to_string()),
                        to_date
                            .map(|d| to_local(d, offset).format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "now".to_string())
                    );
                    println!();

                    if report.entries.is_empty() {
                        println!("No payments in this period.");
                        return Ok(());
                    }

                    println!("{:<30} {:>16} {:>9}", "MEMBER", "TOTAL", "PAYMENTS");
                    println!("{}", "-".repeat(57));
                    for entry in &report.entries {
                        println!(
                            "{:<30} {:>16} {:>9}",
                            truncate(&entry.member_name, 30),
                            format_rupiah(entry.total_amount),
                            entry.payment_count
                        );
                    }
                    println!("{}", "-".repeat(57));
                    println!(
                        "{:<30} {:>16}",
                        "TOTAL REVENUE",
                        format_rupiah(report.total_revenue)
                    );
                }
            }
        }

        ReportCommands::Classes {
            filter,
            details,
            format,
        } => {
            let query = filter.to_query()?;
            let report = service.class_report(&query).await?;

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!("Class Attendance Report ({})", query.period.label());
            if let Some(slot) = query.class_filter {
                println!("Class: {} ({})", slot.label(), slot.schedule());
            }
            println!();

            if report.members.is_empty() {
                println!("No attendance in this period.");
                return Ok(());
            }

            print!("{:<24}", "MEMBER");
            for slot in ClassSlot::ALL {
                print!(" {:>5}", slot.as_str());
            }
            println!(" {:>6}  STATUS", "TOTAL");
            println!("{}", "-".repeat(24 + ClassSlot::ALL.len() * 6 + 8 + 13));

            for stats in &report.members {
                print!("{:<24}", truncate(&stats.name, 24));
                for slot in ClassSlot::ALL {
                    print!(" {:>5}", stats.count(slot));
                }
                println!(" {:>6}  {}", stats.total_in_period, stats.status.label());

                if details {
                    for (slot, times) in &stats.history {
                        if times.is_empty() {
                            continue;
                        }
                        let dates: Vec<String> = times
                            .iter()
                            .map(|t| to_local(*t, offset).format("%d/%m %H:%M").to_string())
                            .collect();
                        println!("    {}: {}", slot.label(), dates.join(", "));
                    }
                }
            }

            println!("{}", "-".repeat(24 + ClassSlot::ALL.len() * 6 + 8 + 13));
            print!("{:<24}", "TOTAL");
            for slot in ClassSlot::ALL {
                print!(
                    " {:>5}",
                    report.totals.per_slot.get(&slot).copied().unwrap_or(0)
                );
            }
            println!(" {:>6}", report.totals.total_attendance);
            println!();
            println!(
                "{} member(s), {:.1} visits per member",
                report.totals.member_count, report.totals.average_per_member
            );
        }
    }

    Ok(())
}

async fn run_export_command(service: &LedgerService, cmd: ExportCommands) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let open_output = |output: Option<&str>| -> Result<Box<dyn Write>> {
        let writer: Box<dyn Write> = match output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create output file: {}", path))?;
                Box::new(file)
            }
            None => Box::new(stdout()),
        };
        Ok(writer)
    };

    match cmd {
        ExportCommands::Backup { output } => {
            let writer = open_output(output.as_deref())?;
            let backup = exporter.export_backup_json(writer).await?;
            if output.is_some() {
                let attendances: usize = backup.students.iter().map(|s| s.attendances.len()).sum();
                let payments: usize = backup.students.iter().map(|s| s.payments.len()).sum();
                eprintln!(
                    "Exported backup: {} members, {} attendances, {} payments",
                    backup.students.len(),
                    attendances,
                    payments
                );
            }
        }

        ExportCommands::Members { output } => {
            let writer = open_output(output.as_deref())?;
            let count = exporter.export_members_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} members", count);
            }
        }

        ExportCommands::Classes { filter, output } => {
            let query = filter.to_query()?;
            let writer = open_output(output.as_deref())?;
            let count = exporter.export_class_report_csv(writer, &query).await?;
            if output.is_some() {
                eprintln!("Exported class report for {} members", count);
            }
        }
    }

    Ok(())
}

async fn run_import_command(service: &LedgerService, cmd: ImportCommands) -> Result<()> {
    use crate::io::Importer;
    use std::fs::File;
    use std::io::{Read, stdin};

    let importer = Importer::new(service);

    let open_input = |input: Option<&str>| -> Result<Box<dyn Read>> {
        let reader: Box<dyn Read> = match input {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open input file: {}", path))?;
                Box::new(file)
            }
            None => Box::new(stdin()),
        };
        Ok(reader)
    };

    match cmd {
        ImportCommands::Backup { input, yes } => {
            if !yes {
                anyhow::bail!(
                    "Restoring a backup deletes ALL current members and history. Re-run with --yes to confirm"
                );
            }
            let counts = importer
                .restore_backup_json(open_input(input.as_deref())?)
                .await?;
            println!("Restore complete");
            println!("  Members:     {}", counts.members);
            println!("  Attendances: {}", counts.attendances);
            println!("  Payments:    {}", counts.payments);
        }

        ImportCommands::Members { input } => {
            let result = importer
                .import_members_csv(open_input(input.as_deref())?)
                .await?;
            println!("Import complete");
            println!("  Updated: {}", result.updated);
            println!("  Skipped: {}", result.skipped);
        }
    }

    Ok(())
}

impl ClassFilterArgs {
    fn to_query(&self) -> Result<ClassReportQuery> {
        let period = match (&self.from, &self.to) {
            (Some(from), Some(to)) => ReportPeriod::Custom {
                from: parse_date(from).context("Invalid from date")?,
                to: parse_date(to).context("Invalid to date")?,
            },
            _ => ReportPeriod::from_str(&self.period).with_context(|| {
                format!(
                    "Invalid period '{}'. Valid periods: today, week, month, all",
                    self.period
                )
            })?,
        };

        let class_filter = self
            .class
            .as_deref()
            .map(|c| {
                ClassSlot::from_str(c).with_context(|| {
                    format!("Invalid class '{}'. Valid classes: A-F, J, other", c)
                })
            })
            .transpose()?;

        Ok(ClassReportQuery {
            period,
            class_filter,
            search: self.search.clone(),
        })
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")
}

/// Parse a time typed in club time ("YYYY-MM-DD HH:MM" or a bare date at
/// midnight); full RFC 3339 strings keep their own offset.
fn parse_club_time(input: &str, offset: FixedOffset) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(local) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(from_local(local, offset));
        }
    }

    let date = parse_date(input)
        .with_context(|| format!("Invalid time '{}'. Use YYYY-MM-DD HH:MM", input))?;
    Ok(day_bounds(date, offset).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::default_offset;
    use chrono::TimeZone;

    #[test]
    fn test_parse_club_time() {
        let offset = default_offset();
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 1, 0, 0).unwrap();

        assert_eq!(parse_club_time("2024-03-09 08:00", offset).unwrap(), expected);
        assert_eq!(parse_club_time("2024-03-09T08:00", offset).unwrap(), expected);
        assert_eq!(
            parse_club_time("2024-03-09T01:00:00Z", offset).unwrap(),
            expected
        );
        assert_eq!(
            parse_club_time("2024-03-09", offset).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 8, 17, 0, 0).unwrap()
        );
        assert!(parse_club_time("tomorrow", offset).is_err());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Dewi", 10), "Dewi");
        assert_eq!(truncate("Ñoño Ñoño Ñoño", 8), "Ñoño ...");
    }

    #[test]
    fn test_class_filter_args() {
        let args = ClassFilterArgs {
            period: "week".into(),
            from: None,
            to: None,
            class: Some("c".into()),
            search: None,
        };
        let query = args.to_query().unwrap();
        assert_eq!(query.period, ReportPeriod::Week);
        assert_eq!(query.class_filter, Some(ClassSlot::C));

        let bad = ClassFilterArgs {
            period: "fortnight".into(),
            from: None,
            to: None,
            class: None,
            search: None,
        };
        assert!(bad.to_query().is_err());
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["kolam", "attend", "Dewi", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Attend { force: true, .. }));

        let cli =
            Cli::try_parse_from(["kolam", "member", "set-sessions", "Dewi", "-2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Member(MemberCommands::SetSessions { sessions: -2, .. })
        ));
    }
}
