use suitesync_engine::{Phase, Step, TableOutcome};

const DOWNSTREAM: &str = "
staging:
  change_column: DATE_LAST_MODIFIED
  tables:
    - source_table: VENDORS
      source_view: VENDORS
      target: STG_VENDORS
datamart:
  views:
    - source_view: V_DIM_VENDOR
      target: DIM_VENDOR
";

#[test]
#[ignore = "requires docker"]
fn staging_and_datamart_follow_landing() {
    let context = suitesync_e2e::harness::bootstrap().expect("bootstrap must initialize test harness");
    let layout = context
        .allocate_layout("downstream")
        .expect("layout allocation must succeed");

    let result = (|| {
        context.seed_source(&layout).expect("source seed should succeed");
        context
            .run_phase(&layout, Phase::CreateAndLoad, DOWNSTREAM)
            .expect("phase 0 should run");

        context
            .execute(&format!(
                "CREATE TABLE \"{stg}\".\"STG_VENDORS\" (
                     \"VENDOR_ID\" BIGINT, \"NAME\" VARCHAR(100), \"DATE_LAST_MODIFIED\" TIMESTAMP);
                 CREATE VIEW \"{stg}\".\"V_DIM_VENDOR\" AS
                     SELECT \"VENDOR_ID\" AS \"DW_KEY_ID\", \"NAME\", 'n/a'::text AS \"LEGACY_CODE\"
                     FROM \"{stg}\".\"STG_VENDORS\";
                 CREATE TABLE \"{dm}\".\"DIM_VENDOR\" (
                     \"DW_KEY_ID\" BIGINT PRIMARY KEY, \"NAME\" VARCHAR(100), \"DW_INSERT_DT\" TIMESTAMP);
                 INSERT INTO \"{dm}\".\"DIM_VENDOR\" VALUES (1, 'Old name', '2020-01-01 00:00:00');",
                stg = layout.staging,
                dm = layout.datamart
            ))
            .expect("downstream tables should be created");

        // Phase 2: two landing rows carry a real modification date.
        let report = context
            .run_phase(&layout, Phase::LandingToStaging, DOWNSTREAM)
            .expect("phase 2 should run");
        assert!(matches!(
            report.outcome("STG_VENDORS", Step::Staging),
            Some(TableOutcome::Synced { rows_written: 2, .. })
        ));
        assert_eq!(context.table_row_count(&layout.staging, "STG_VENDORS").unwrap(), 2);

        let report = context
            .run_phase(&layout, Phase::LandingToStaging, DOWNSTREAM)
            .expect("phase 2 should run again");
        assert_eq!(report.outcome("STG_VENDORS", Step::Staging), Some(&TableOutcome::NoData));

        // Phase 3
        let report = context
            .run_phase(&layout, Phase::StagingToDatamart, DOWNSTREAM)
            .expect("phase 3 should run");
        assert!(matches!(
            report.outcome("DIM_VENDOR", Step::Datamart),
            Some(TableOutcome::Synced { inserted: 1, updated: 1, .. })
        ));

        let snapshot = context
            .table_rows_snapshot(&layout.datamart, "DIM_VENDOR", &["DW_KEY_ID", "NAME"], "DW_KEY_ID")
            .expect("datamart snapshot must succeed");
        assert_eq!(snapshot, "1|Acme\n2|Globex");
        let audit = context
            .table_rows_snapshot(&layout.datamart, "DIM_VENDOR", &["DW_INSERT_DT"], "DW_KEY_ID")
            .expect("audit snapshot must succeed");
        let mut audit = audit.lines();
        assert_eq!(audit.next(), Some("2020-01-01 00:00:00"));
        assert_ne!(audit.next(), Some("NULL"));
    })();

    context
        .drop_layout(&layout)
        .expect("schema cleanup must succeed");

    result
}
