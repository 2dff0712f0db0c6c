use suitesync_engine::{Phase, Step, TableOutcome};

const VENDOR_COLUMNS: &[&str] = &["VENDOR_ID", "NAME", "BALANCE", "TERMS_DAYS", "DATE_LAST_MODIFIED"];

fn synced(outcome: Option<&TableOutcome>) -> (u64, u64, u64) {
    match outcome {
        Some(TableOutcome::Synced {
            rows_written,
            inserted,
            updated,
            ..
        }) => (*rows_written, *inserted, *updated),
        other => panic!("expected synced outcome, got {other:?}"),
    }
}

#[test]
#[ignore = "requires docker"]
fn create_and_bulk_load_normalizes_rows() {
    let context = suitesync_e2e::harness::bootstrap().expect("bootstrap must initialize test harness");
    let layout = context
        .allocate_layout("bulk_load")
        .expect("layout allocation must succeed");

    let result = (|| {
        context.seed_source(&layout).expect("source seed should succeed");

        let report = context
            .run_phase(&layout, Phase::CreateAndLoad, "")
            .expect("phase 0 should run");
        assert_eq!(report.failed(), 0, "{report}");
        assert_eq!(synced(report.outcome("VENDORS", Step::BulkLoad)), (3, 3, 0));

        let snapshot = context
            .table_rows_snapshot(&layout.landing, "VENDORS", VENDOR_COLUMNS, "VENDOR_ID")
            .expect("landing snapshot must succeed");
        assert_eq!(
            snapshot,
            "1|Acme|10.50|30|2024-01-01 00:00:00\n\
             2|Globex|250.25|45|2024-01-05 12:00:00\n\
             3|NULL|0.00|0|1970-01-01 00:00:00"
        );

        let accounts = context
            .table_rows_snapshot(&layout.landing, "ACCOUNTS", &["ACCOUNT_ID", "ACCOUNT_NUMBER"], "ACCOUNT_ID")
            .expect("accounts snapshot must succeed");
        assert_eq!(accounts, "100|4000");

        assert_eq!(
            context
                .table_row_count(&layout.transient, "VENDORS")
                .expect("transient table must exist"),
            0
        );
        assert!(context
            .landing_watermark(&layout, "VENDORS")
            .expect("watermark query must succeed")
            .is_some());
    })();

    context
        .drop_layout(&layout)
        .expect("schema cleanup must succeed");

    result
}

fn incremental_merges_changes(test_name: &str, extra: &str) {
    let context = suitesync_e2e::harness::bootstrap().expect("bootstrap must initialize test harness");
    let layout = context
        .allocate_layout(test_name)
        .expect("layout allocation must succeed");

    let result = (|| {
        context.seed_source(&layout).expect("source seed should succeed");
        context
            .run_phase(&layout, Phase::CreateAndLoad, extra)
            .expect("phase 0 should run");
        let before = context.landing_watermark(&layout, "VENDORS").unwrap();

        let report = context
            .run_phase(&layout, Phase::Incremental, extra)
            .expect("phase 1 should run");
        assert_eq!(report.outcome("VENDORS", Step::Incremental), Some(&TableOutcome::NoData));
        assert_eq!(context.landing_watermark(&layout, "VENDORS").unwrap(), before);

        context
            .execute(&format!(
                "UPDATE \"{src}\".\"VENDORS\" SET \"NAME\" = 'Acme Corp', \
                     \"DATE_LAST_MODIFIED\" = '2099-01-01 00:00:00' WHERE \"VENDOR_ID\" = 1;
                 INSERT INTO \"{src}\".\"VENDORS\" VALUES (4, 'Initech', 5, 15, '2099-01-02 00:00:00');",
                src = layout.source
            ))
            .expect("source change should apply");

        let report = context
            .run_phase(&layout, Phase::Incremental, extra)
            .expect("phase 1 should run");
        assert_eq!(synced(report.outcome("VENDORS", Step::Incremental)), (2, 1, 1));
        assert_eq!(report.outcome("ACCOUNTS", Step::Incremental), Some(&TableOutcome::NoData));

        let snapshot = context
            .table_rows_snapshot(&layout.landing, "VENDORS", &["VENDOR_ID", "NAME"], "VENDOR_ID")
            .expect("landing snapshot must succeed");
        assert_eq!(snapshot, "1|Acme Corp\n2|Globex\n3|NULL\n4|Initech");
        assert!(context.landing_watermark(&layout, "VENDORS").unwrap() >= before);
    })();

    context
        .drop_layout(&layout)
        .expect("schema cleanup must succeed");

    result
}

#[test]
#[ignore = "requires docker"]
fn incremental_merge_through_transient_table() {
    incremental_merges_changes("merge_transient", "");
}

#[test]
#[ignore = "requires docker"]
fn incremental_direct_upsert() {
    incremental_merges_changes("merge_direct", "incremental:\n  strategy: direct");
}
