mod common;

use anyhow::Result;
use common::{member_with_sessions, test_service, wib};
use kolam::application::{AppError, ClassReportQuery, ReportPeriod};
use kolam::io::{Exporter, Importer};

fn app_error(err: &anyhow::Error) -> &AppError {
    err.downcast_ref::<AppError>()
        .unwrap_or_else(|| panic!("expected an AppError, got {:?}", err))
}

#[tokio::test]
async fn test_backup_restores_into_empty_store() -> Result<()> {
    let (source, _src_temp) = test_service().await?;
    let dewi = source.register_member("Dewi Lestari", Some("Dewi")).await?;
    let budi = source.register_member("Budi", None).await?;
    source
        .record_payment_at(dewi.id, 500_000, wib(2024, 3, 1, 10, 0))
        .await?;
    source
        .record_attendance_at(dewi.id, wib(2024, 3, 9, 8, 0))
        .await?;
    source
        .record_attendance_at(dewi.id, wib(2024, 3, 10, 8, 0))
        .await?;
    source.set_sessions_manually(budi.id, 3).await?;

    let mut buffer = Vec::new();
    let backup = Exporter::new(&source).export_backup_json(&mut buffer).await?;
    assert_eq!(backup.version, "1.0");
    assert_eq!(backup.students.len(), 2);

    let (target, _dst_temp) = test_service().await?;
    let counts = Importer::new(&target)
        .restore_backup_json(buffer.as_slice())
        .await?;
    assert_eq!(counts.members, 2);
    assert_eq!(counts.attendances, 2);
    assert_eq!(counts.payments, 1);

    let restored = target.find_member("Dewi Lestari").await?;
    assert_ne!(restored.id, dewi.id);
    assert_eq!(restored.nickname.as_deref(), Some("Dewi"));
    assert_eq!(restored.remaining_sessions, 6);

    let payments = target.payment_history(restored.id).await?;
    assert_eq!(payments[0].amount, 500_000);
    assert_eq!(payments[0].sessions_added, 8);
    assert_eq!(payments[0].paid_at, wib(2024, 3, 1, 10, 0));

    let attendances = target.attendance_history(restored.id).await?;
    assert_eq!(attendances.len(), 2);
    assert_eq!(attendances[0].attended_at, wib(2024, 3, 10, 8, 0));

    // Counter restored as stored, not replayed from history
    assert_eq!(target.find_member("budi").await?.remaining_sessions, 3);

    Ok(())
}

#[tokio::test]
async fn test_restore_replaces_existing_data() -> Result<()> {
    let (service, _temp) = test_service().await?;
    member_with_sessions(&service, "Old Member", 7).await?;

    let json = r#"{
        "version": "1.0",
        "createdAt": "2024-03-09T01:00:00.000Z",
        "students": [{
            "id": "legacy-doc-id",
            "name": "Sari",
            "nickname": "",
            "remainingSessions": 2,
            "payments": [
                {"amount": 250000, "sessionsAdded": 4, "date": {"seconds": 1709946000, "nanoseconds": 0}}
            ],
            "attendances": [
                {"date": {"seconds": 1709947800, "nanoseconds": 0}},
                {"date": {"seconds": 1710034200, "nanoseconds": 0}}
            ]
        }]
    }"#;

    let counts = Importer::new(&service)
        .restore_backup_json(json.as_bytes())
        .await?;
    assert_eq!(counts.members, 1);
    assert_eq!(counts.attendances, 2);

    let members = service.list_members(None).await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name, "Sari");
    assert_eq!(members[0].nickname, None);
    assert_eq!(members[0].remaining_sessions, 2);

    Ok(())
}

#[tokio::test]
async fn test_invalid_backup_leaves_store_untouched() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let member = member_with_sessions(&service, "Dewi", 5).await?;
    let importer = Importer::new(&service);

    let err = importer
        .restore_backup_json(r#"{"version": "1.0"}"#.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(app_error(&err), AppError::ImportFormat(_)));

    let blank_name = r#"{"version": "1.0", "students": [{"name": "Sari"}, {"name": "  "}]}"#;
    let err = importer
        .restore_backup_json(blank_name.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(app_error(&err), AppError::ImportFormat(_)));

    let members = service.list_members(None).await?;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, member.id);
    assert_eq!(members[0].remaining_sessions, 5);

    Ok(())
}

#[tokio::test]
async fn test_members_csv_export() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let exporter = Exporter::new(&service);

    let err = exporter.export_members_csv(Vec::new()).await.unwrap_err();
    assert!(matches!(app_error(&err), AppError::NothingToExport(_)));

    service.register_member("Dewi Lestari", Some("Dewi")).await?;
    member_with_sessions(&service, "Budi", -1).await?;

    let mut buffer = Vec::new();
    let count = exporter.export_members_csv(&mut buffer).await?;
    assert_eq!(count, 2);

    let csv = String::from_utf8(buffer)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Nama Lengkap,Nama Panggilan,Sisa Pertemuan");
    assert_eq!(lines[1], "Budi,,-1");
    assert_eq!(lines[2], "Dewi Lestari,Dewi,0");

    Ok(())
}

#[tokio::test]
async fn test_members_csv_import_updates_matches() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let dewi = member_with_sessions(&service, "Dewi Lestari", 2).await?;
    let budi = service.register_member("Budi", Some("Bud")).await?;

    let csv = "Nama Lengkap,Nama Panggilan,Sisa Pertemuan\n\
               \x20 dewi lestari ,Dee,8\n\
               Budi,,empat\n\
               Unknown Person,X,4\n\
               ,Nobody,3\n";

    let result = Importer::new(&service)
        .import_members_csv(csv.as_bytes())
        .await?;
    // Budi's row has no usable cell, so only Dewi counts as updated
    assert_eq!(result.updated, 1);
    assert_eq!(result.skipped, 3);

    let dewi = service.get_member(dewi.id).await?;
    assert_eq!(dewi.nickname.as_deref(), Some("Dee"));
    assert_eq!(dewi.remaining_sessions, 8);

    // Empty nickname and non-numeric sessions leave Budi unchanged
    let budi = service.get_member(budi.id).await?;
    assert_eq!(budi.nickname.as_deref(), Some("Bud"));
    assert_eq!(budi.remaining_sessions, 0);

    // No history is written for spreadsheet corrections
    assert!(service.payment_history(dewi.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_members_csv_import_rejects_empty_or_unmatched() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let member = member_with_sessions(&service, "Dewi", 4).await?;
    let importer = Importer::new(&service);

    let err = importer.import_members_csv("".as_bytes()).await.unwrap_err();
    assert!(matches!(app_error(&err), AppError::ImportFormat(_)));

    let header_only = "Nama Lengkap,Nama Panggilan,Sisa Pertemuan\n";
    let err = importer
        .import_members_csv(header_only.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(app_error(&err), AppError::ImportFormat(_)));

    let unmatched = "Nama Lengkap,Nama Panggilan,Sisa Pertemuan\nSomeone Else,,9\n";
    let err = importer
        .import_members_csv(unmatched.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(app_error(&err), AppError::ImportFormat(_)));

    assert_eq!(service.get_member(member.id).await?.remaining_sessions, 4);

    Ok(())
}

#[tokio::test]
async fn test_members_csv_import_rejects_rows_without_changes() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let budi = service.register_member("Budi", Some("Bud")).await?;
    let importer = Importer::new(&service);

    let nothing_to_apply = "Nama Lengkap,Nama Panggilan,Sisa Pertemuan\nBudi,,\n";
    let err = importer
        .import_members_csv(nothing_to_apply.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(app_error(&err), AppError::ImportFormat(_)));

    let unusable_sessions = "Nama Lengkap,Nama Panggilan,Sisa Pertemuan\nBudi,,2.5\n";
    let err = importer
        .import_members_csv(unusable_sessions.as_bytes())
        .await
        .unwrap_err();
    assert!(matches!(app_error(&err), AppError::ImportFormat(_)));

    let budi = service.get_member(budi.id).await?;
    assert_eq!(budi.nickname.as_deref(), Some("Bud"));
    assert_eq!(budi.remaining_sessions, 0);

    // A row that sets only the counter still counts
    let sessions_only = "Nama Lengkap,Nama Panggilan,Sisa Pertemuan\nBudi,,5\n";
    let result = importer
        .import_members_csv(sessions_only.as_bytes())
        .await?;
    assert_eq!(result.updated, 1);
    assert_eq!(result.skipped, 0);

    let budi = service.get_member(budi.id).await?;
    assert_eq!(budi.nickname.as_deref(), Some("Bud"));
    assert_eq!(budi.remaining_sessions, 5);

    Ok(())
}

#[tokio::test]
async fn test_class_report_csv_export() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let dewi = service.register_member("Dewi", Some("Dee")).await?;
    service
        .record_attendance_at(dewi.id, wib(2024, 3, 9, 8, 0))
        .await?;

    let query = ClassReportQuery {
        period: ReportPeriod::All,
        ..Default::default()
    };
    let mut buffer = Vec::new();
    let count = Exporter::new(&service)
        .export_class_report_csv(&mut buffer, &query)
        .await?;
    assert_eq!(count, 1);

    let csv = String::from_utf8(buffer)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "Nama Lengkap,Nama Panggilan,Kelas A,Kelas B,Kelas C,Kelas D,Kelas E,Kelas F,Kelas J,Lainnya,Total,Status"
    );
    assert_eq!(lines[1], "Dewi,Dee,1,0,0,0,0,0,0,0,1,Jarang");

    Ok(())
}
