use scheduling_agent::{ConfigError, SchedulerConfig};

#[test]
fn partial_toml_keeps_defaults_for_missing_fields() {
    let config = SchedulerConfig::parse(
        r#"
        [engine]
        top_n = 3

        [model]
        region = "eu-central-1"
        max_retries = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.engine.top_n, 3);
    assert_eq!(config.engine.max_replacements, 3);
    assert_eq!(config.model.max_retries, 5);
    assert_eq!(config.model.timeout_ms, 30_000);
    assert_eq!(
        config.model.endpoint_url(),
        "https://bedrock-runtime.eu-central-1.amazonaws.com/openai/v1"
    );
}

#[test]
fn empty_document_is_the_default_configuration() {
    assert_eq!(SchedulerConfig::parse("").unwrap(), SchedulerConfig::default());
}

#[test]
fn syntax_errors_are_parse_errors() {
    let err = SchedulerConfig::parse("[model\nregion = ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn invalid_values_are_rejected_at_parse_time() {
    for doc in [
        "[model]\nmax_retries = 0",
        "[model]\ntop_p = 0.0",
        "[model]\ntemperature = 3.5",
        "[model]\nregion = \"US East\"",
        "[model]\nendpoint = \"ftp://example.com\"",
        "[model]\ninitial_backoff_ms = 9000\nmax_backoff_ms = 1000",
        "[model]\ninitial_backoff_ms = 0",
        "[model]\nmax_backoff_ms = 9223372036854775807",
        "[model]\ntimeout_ms = 9223372036854775807",
        "[model]\ntimeout_ms = 0",
        "[model]\ninput_cost_per_1k = -1.0",
        "[engine]\ntop_n = 0",
        "[engine]\nslot_granularity_minutes = 0",
        "[engine]\nlook_around_days = 4294967295",
    ] {
        let err = SchedulerConfig::parse(doc).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{doc}: {err:?}");
    }
}

#[test]
fn overrides_replace_file_values() {
    let mut config = SchedulerConfig::parse("[model]\nmax_retries = 5").unwrap();
    config
        .apply_overrides([
            ("SCHEDULER_MODEL_MAX_RETRIES", "2"),
            ("SCHEDULER_MODEL_ENABLED", "false"),
            ("SCHEDULER_MODEL_ID", "anthropic.claude-haiku"),
            ("SCHEDULER_MODEL_TEMPERATURE", " 0.7 "),
            ("SCHEDULER_TOP_N", "8"),
            ("SCHEDULER_LOOK_AROUND_DAYS", "14"),
            ("PATH", "/usr/bin"),
            ("SCHEDULER_UNKNOWN_KNOB", "whatever"),
        ])
        .unwrap();

    assert_eq!(config.model.max_retries, 2);
    assert!(!config.model.enabled);
    assert_eq!(config.model.model_id, "anthropic.claude-haiku");
    assert_eq!(config.model.temperature, 0.7);
    assert_eq!(config.engine.top_n, 8);
    assert_eq!(config.engine.look_around_days, 14);
    config.validate().unwrap();
}

#[test]
fn unparseable_override_names_the_key() {
    let mut config = SchedulerConfig::default();
    let err = config
        .apply_overrides([("SCHEDULER_MODEL_TIMEOUT_MS", "soon")])
        .unwrap_err();

    match err {
        ConfigError::Override { key, value, .. } => {
            assert_eq!(key, "SCHEDULER_MODEL_TIMEOUT_MS");
            assert_eq!(value, "soon");
        }
        other => panic!("expected Override, got {:?}", other),
    }
}

#[test]
fn override_can_make_config_invalid() {
    let mut config = SchedulerConfig::default();
    config
        .apply_overrides([("SCHEDULER_MODEL_TOP_P", "1.5")])
        .unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn from_file_reads_toml() {
    let path = std::env::temp_dir().join(format!("scheduler-config-{}.toml", std::process::id()));
    std::fs::write(&path, "[engine]\nmax_replacements = 1\n").unwrap();

    let config = SchedulerConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.engine.max_replacements, 1);
}

#[test]
fn missing_file_is_a_read_error() {
    let err = SchedulerConfig::from_file("/nonexistent/scheduler.toml").unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile(_)));
}
