//! Environment variables override TOML and defaults.

use aims_config::AimsConfig;
use aims_core::enums::{CollectionKind, CollectionStrategy};
use figment::Jail;

#[test]
fn env_overrides_nested_sections() {
    Jail::expect_with(|jail| {
        jail.set_env("AIMS_DATABASE__PATH", ":memory:");
        jail.set_env("AIMS_RESOLVER__FUZZY_THRESHOLD", "0.75");
        jail.set_env("AIMS_IMPORT__STRATEGIES__BUDGETS", "append");

        let config = AimsConfig::load().expect("config loads");
        assert_eq!(config.database.path, ":memory:");
        assert!((config.resolver.fuzzy_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(
            config.import.strategies.for_kind(CollectionKind::Budgets),
            CollectionStrategy::Append
        );
        Ok(())
    });
}

#[test]
fn env_beats_project_toml() {
    Jail::expect_with(|jail| {
        jail.create_dir(".aims")?;
        jail.create_file(
            ".aims/config.toml",
            r#"
[general]
error_log_limit = 10
"#,
        )?;
        jail.set_env("AIMS_GENERAL__ERROR_LOG_LIMIT", "50");

        let config = AimsConfig::load().expect("config loads");
        assert_eq!(config.general.error_log_limit, 50);
        Ok(())
    });
}

#[test]
fn env_value_still_validated() {
    Jail::expect_with(|jail| {
        jail.set_env("AIMS_RESOLVER__FUZZY_THRESHOLD", "1.5");
        assert!(AimsConfig::load().is_err());
        Ok(())
    });
}
