#[test]
#[ignore = "requires docker"]
fn harness_bootstrap_exposes_postgres_port() {
    let context = suitesync_e2e::harness::bootstrap().expect("bootstrap must initialize test harness");

    assert!(context.postgres_port > 0);
    context.connect().expect("container must accept connections");
}
