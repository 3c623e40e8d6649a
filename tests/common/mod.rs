// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use kolam::application::LedgerService;
use kolam::config::ClubConfig;
use kolam::domain::{Member, Sessions, default_offset};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with(ClubConfig::default()).await
}

pub async fn test_service_with(config: ClubConfig) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap(), config).await?;
    Ok((service, temp_dir))
}

/// Club wall-clock time (WIB) as a UTC instant
pub fn wib(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    default_offset()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// Register a member and set a starting balance without writing history
pub async fn member_with_sessions(
    service: &LedgerService,
    name: &str,
    sessions: Sessions,
) -> Result<Member> {
    let member = service.register_member(name, None).await?;
    Ok(service.set_sessions_manually(member.id, sessions).await?)
}
