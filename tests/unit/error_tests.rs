use agent_missions::AppError;

#[test]
fn display_prefixes_domain() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::Ipc("closed".into()), "ipc: closed"),
        (AppError::Io("disk".into()), "io: disk"),
        (AppError::Spawn("enoent".into()), "spawn: enoent"),
        (AppError::Process("esrch".into()), "process: esrch"),
        (AppError::Schedule("field".into()), "schedule: field"),
        (AppError::Timeout("budget".into()), "timeout: budget"),
        (AppError::NotFound("m1".into()), "not found: m1"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn only_timeout_is_timeout() {
    assert!(AppError::Timeout("x".into()).is_timeout());
    assert!(!AppError::Process("x".into()).is_timeout());
    assert!(!AppError::Spawn("x".into()).is_timeout());
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("nope")));
}

#[test]
fn toml_errors_become_config_errors() {
    let toml_err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let err: AppError = toml_err.into();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

#[test]
fn json_errors_become_ipc_errors() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    let err: AppError = json_err.into();
    assert!(matches!(err, AppError::Ipc(ref msg) if msg.starts_with("invalid json")));
}
