//! Server Harness Tests
//!
//! 稼働中の PostgreSQL / SQL Server に対する通し実行。
//! 接続先は既定値か `CRUD_HARNESS__*` 環境変数で指定する。
//!
//! Run with: cargo test --features integration-tests -- --ignored

#[cfg(feature = "integration-tests")]
mod server_tests {
    use crud_harness::config::ConfigLoader;
    use crud_harness::dialect::{DialectProfile, POSTGRESQL, SQL_SERVER};
    use crud_harness::schema::{Provision, SchemaDefinition, SchemaProvisioner};
    use crud_harness::suite::{CollectingReporter, CrudSuite, SkipPolicy};
    use crud_harness::Harness;

    async fn run_full_cycle(profile: &'static DialectProfile) {
        let config = ConfigLoader::new().load_from_env().build().unwrap();
        let target = config.target_for(profile);
        let suite = CrudSuite::for_target(profile, &target);
        let registry = CrudSuite::registry().unwrap();
        let mut harness = Harness::new(SchemaProvisioner::new(target));
        let mut reporter = CollectingReporter::default();

        let outcome = harness
            .run(
                profile,
                &SchemaDefinition::standard(),
                &registry,
                &suite,
                &SkipPolicy::new(true),
                &mut reporter,
            )
            .await
            .unwrap();

        assert!(
            outcome.is_success(),
            "{:?}",
            outcome.report.abort_summary()
        );
        assert_eq!(
            outcome.report.passed() + outcome.report.skipped.len(),
            registry.len()
        );
        assert!(outcome.report.skipped.is_empty());
        assert_eq!(outcome.teardown_warning, None);
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL server
    async fn test_postgresql_full_cycle() {
        run_full_cycle(&POSTGRESQL).await;
    }

    #[tokio::test]
    #[ignore] // Requires running SQL Server
    async fn test_sqlserver_full_cycle() {
        run_full_cycle(&SQL_SERVER).await;
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL server
    async fn test_postgresql_create_database_twice() {
        let mut config = ConfigLoader::new().load_from_env().build().unwrap();
        // 通し実行のテストと並行しても衝突しない名前
        config.harness.database_name = "testdbsimplecrud_twice".to_string();
        let provisioner = SchemaProvisioner::new(config.target_for(&POSTGRESQL));

        provisioner.create_database(&POSTGRESQL).await.unwrap();
        provisioner.create_database(&POSTGRESQL).await.unwrap();
        provisioner
            .create_schema(&POSTGRESQL, &SchemaDefinition::standard())
            .await
            .unwrap();
        provisioner.drop_database(&POSTGRESQL).await.unwrap();
        // 存在しないデータベースの削除も成功する
        provisioner.drop_database(&POSTGRESQL).await.unwrap();
    }
}
