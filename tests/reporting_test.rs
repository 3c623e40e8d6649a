mod common;

use anyhow::Result;
use chrono::NaiveDate;
use common::{test_service, wib};
use kolam::application::{ActivityStatus, ClassReportQuery, ReportPeriod};
use kolam::domain::ClassSlot;
use kolam::io::write_financial_report_csv;

#[tokio::test]
async fn test_financial_report() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let dewi = service.register_member("Dewi", None).await?;
    let budi = service.register_member("Budi", None).await?;
    service.register_member("Citra", None).await?;

    service
        .record_payment_at(dewi.id, 250_000, wib(2024, 1, 10, 9, 0))
        .await?;
    service
        .record_payment_at(budi.id, 500_000, wib(2024, 2, 5, 9, 0))
        .await?;
    service
        .record_payment_at(budi.id, 250_000, wib(2024, 2, 20, 9, 0))
        .await?;

    let report = service.financial_report(None, None).await?;
    // Citra never paid and is left out
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.entries[0].member_name, "Budi");
    assert_eq!(report.entries[0].total_amount, 750_000);
    assert_eq!(report.entries[0].payment_count, 2);
    assert_eq!(report.entries[1].member_name, "Dewi");
    assert_eq!(report.total_revenue, 1_000_000);

    let february = service
        .financial_report(Some(wib(2024, 2, 1, 0, 0)), Some(wib(2024, 2, 10, 0, 0)))
        .await?;
    assert_eq!(february.entries.len(), 1);
    assert_eq!(february.entries[0].total_amount, 500_000);
    assert_eq!(february.total_revenue, 500_000);

    Ok(())
}

#[tokio::test]
async fn test_financial_report_csv_quotes_names() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let member = service
        .register_member("Santoso, Budi \"Bud\"", None)
        .await?;
    service.record_payment(member.id, 500_000).await?;

    let report = service.financial_report(None, None).await?;
    let mut buffer = Vec::new();
    write_financial_report_csv(&report, &mut buffer)?;

    let csv = String::from_utf8(buffer)?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines, vec![
        "member,total,payments",
        "\"Santoso, Budi \"\"Bud\"\"\",500000,1",
    ]);

    Ok(())
}

#[tokio::test]
async fn test_class_report_over_custom_period() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let dewi = service.register_member("Dewi", Some("Dee")).await?;
    let budi = service.register_member("Budi", None).await?;
    service.register_member("Citra", None).await?;

    // Fri 15:00 J, Sat 08:00 A, Sat 10:00 B, Sun 15:00 F, Mon 09:00 other
    for at in [
        wib(2024, 3, 8, 15, 0),
        wib(2024, 3, 9, 8, 0),
        wib(2024, 3, 9, 10, 0),
        wib(2024, 3, 10, 15, 0),
        wib(2024, 3, 11, 9, 0),
    ] {
        service.record_attendance_at(dewi.id, at).await?;
    }
    service
        .record_attendance_at(budi.id, wib(2024, 3, 9, 8, 30))
        .await?;
    // Outside the period
    service
        .record_attendance_at(budi.id, wib(2024, 3, 2, 8, 30))
        .await?;

    let period = ReportPeriod::Custom {
        from: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
        to: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
    };
    let report = service
        .class_report(&ClassReportQuery {
            period,
            ..Default::default()
        })
        .await?;

    assert_eq!(report.members.len(), 2);
    let first = &report.members[0];
    assert_eq!(first.member_id, dewi.id);
    assert_eq!(first.total_in_period, 5);
    for slot in [ClassSlot::J, ClassSlot::A, ClassSlot::B, ClassSlot::F, ClassSlot::Other] {
        assert_eq!(first.count(slot), 1, "slot {}", slot);
    }
    assert_eq!(first.status, ActivityStatus::Regular);

    let second = &report.members[1];
    assert_eq!(second.member_id, budi.id);
    assert_eq!(second.total_in_period, 1);
    assert_eq!(second.status, ActivityStatus::Rare);

    assert_eq!(report.totals.total_attendance, 6);
    assert_eq!(report.totals.per_slot[&ClassSlot::A], 2);

    let only_a = service
        .class_report(&ClassReportQuery {
            period,
            class_filter: Some(ClassSlot::A),
            search: Some("dee".into()),
        })
        .await?;
    assert_eq!(only_a.members.len(), 1);
    assert_eq!(only_a.members[0].member_id, dewi.id);

    Ok(())
}

#[tokio::test]
async fn test_class_report_all_time_and_today() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let dewi = service.register_member("Dewi", None).await?;
    service
        .record_attendance_at(dewi.id, wib(2023, 6, 3, 8, 0))
        .await?;

    let all = service
        .class_report(&ClassReportQuery {
            period: ReportPeriod::All,
            ..Default::default()
        })
        .await?;
    assert_eq!(all.members.len(), 1);
    assert!(all.from_date.is_none());

    let today = service
        .class_report(&ClassReportQuery {
            period: ReportPeriod::Today,
            ..Default::default()
        })
        .await?;
    assert!(today.members.is_empty());
    assert_eq!(today.totals.average_per_member, 0.0);

    service.record_attendance(dewi.id).await?;
    let today = service
        .class_report(&ClassReportQuery {
            period: ReportPeriod::Today,
            ..Default::default()
        })
        .await?;
    assert_eq!(today.members.len(), 1);
    assert_eq!(today.members[0].total_in_period, 1);

    Ok(())
}
