use super::*;
use secrecy::ExposeSecret;
use std::collections::HashMap;

#[test]
fn test_defaults_match_upload_limits() {
    let config = Config::default();
    assert_eq!(config.server.max_upload_mb, 50);
    assert_eq!(config.server.max_upload_bytes(), 50 * 1024 * 1024);
    assert_eq!(config.storage.bucket, "patient-reports");
    assert_eq!(config.sessions.ttl_secs, 3600);
    assert!(config.database.url.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = Config::from_toml(
        r#"
        [server]
        bind = "127.0.0.1:8080"

        [llm.gemini]
        api_key = "g-key"
        model = "gemini-1.5-pro"
        "#,
    )
    .unwrap();

    assert_eq!(config.server.bind, "127.0.0.1:8080");
    assert_eq!(config.server.max_upload_mb, 50);
    let gemini = config.llm.gemini.as_ref().unwrap();
    assert_eq!(gemini.api_key.as_ref().unwrap().expose_secret(), "g-key");
    assert_eq!(gemini.model.as_deref(), Some("gemini-1.5-pro"));
    assert!(config.llm.openai.is_none());
    assert!(config.llm.vision_enabled);
}

#[test]
fn test_empty_api_key_is_treated_as_missing() {
    let config = Config::from_toml("[llm.openai]\napi_key = \"\"\n").unwrap();
    assert!(config.llm.openai.unwrap().api_key.is_none());
}

#[test]
fn test_env_overrides_win() {
    let mut config = Config::from_toml("[database]\nurl = \"postgres://file\"\n").unwrap();
    let env: HashMap<&str, &str> = [
        ("DATABASE_URL", "postgres://env"),
        ("OPENAI_API_KEY", "sk-test"),
        ("RADSCOPE_BIND", "  "),
    ]
    .into_iter()
    .collect();

    config.apply_env(|k| env.get(k).map(|v| v.to_string()));

    assert_eq!(config.database.url.as_deref(), Some("postgres://env"));
    assert_eq!(
        config.llm.openai.as_ref().unwrap().api_key.as_ref().unwrap().expose_secret(),
        "sk-test"
    );
    // blank values are ignored
    assert_eq!(config.server.bind, "0.0.0.0:5000");
}

#[test]
fn test_supabase_backend_requires_credentials() {
    let mut config = Config::from_toml("[storage]\nbackend = \"supabase\"\n").unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    config.apply_env(|k| match k {
        "SUPABASE_URL" => Some("https://x.supabase.co".to_string()),
        "SUPABASE_KEY" => Some("service-key".to_string()),
        _ => None,
    });
    assert!(config.validate().is_ok());
}

#[test]
fn test_unknown_storage_backend_rejected() {
    let err = Config::from_toml("[storage]\nbackend = \"s3\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_lesion_bounds_validated() {
    let config = Config::from_toml("[analysis]\nmin_lesion_area = 200\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("min_lesion_area"));
}

#[test]
fn test_from_file_reports_missing_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(Config::from_file(&missing), Err(ConfigError::Io { .. })));

    let present = dir.path().join("radscope.toml");
    std::fs::write(&present, "[sessions]\nttl_secs = 60\n").unwrap();
    assert_eq!(Config::from_file(&present).unwrap().sessions.ttl_secs, 60);
}
