use std::fs;

use fixtory::{Error, LogConfig, LogFormat, Registry, init_logging};

#[test]
fn json_logs_are_appended_to_the_configured_file() {
    let path = std::env::temp_dir().join(format!("fixtory_log_{}.jsonl", uuid::Uuid::new_v4()));
    let config = LogConfig {
        filter: "fixtory=info".to_string(),
        format: LogFormat::Json,
        path: Some(path.clone()),
    };
    init_logging(&config).expect("install subscriber");

    let mut registry = Registry::new();
    registry.define("widget", |schema| {
        schema.has_one("name");
    });

    let contents = fs::read_to_string(&path).expect("read log file");
    assert!(contents.contains("template registered"));
    assert!(contents.contains("\"template\":\"widget\""));

    let second = init_logging(&config);
    assert!(matches!(second, Err(Error::Logging(_))));

    let _ = fs::remove_file(&path);
}
