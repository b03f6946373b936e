use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn config_dir_override_wins() {
    let dir = get_config_dir(Some(Path::new("/opt/catalog"))).expect("override always resolves");
    assert_eq!(dir, PathBuf::from("/opt/catalog"));
}

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");

    let original_config = Config {
        ollama: OllamaConfig {
            protocol: "https".to_string(),
            host: "test-host".to_string(),
            port: 8080,
            model: "test-model".to_string(),
            batch_size: 32,
        },
        catalog: CatalogConfig {
            metadata_path: PathBuf::from("catalog/tables.json"),
            index_dir: Some(PathBuf::from("idx")),
            top_k: 5,
            watch_interval_secs: 60,
        },
        links: LinksConfig {
            config_file: Some(PathBuf::from("catalog.env")),
            poll_interval_secs: 2,
        },
        base_dir: temp_dir.path().to_path_buf(),
    };

    let toml_content = toml::to_string_pretty(&original_config)
        .expect("config should convert to toml string successfully");
    fs::write(&config_path, toml_content).expect("should write to config_path successfully");

    let content =
        fs::read_to_string(&config_path).expect("should read from config_path successfully");
    let mut loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");
    loaded_config.base_dir = temp_dir.path().to_path_buf();

    assert_eq!(original_config, loaded_config);
}

#[test]
fn invalid_toml_handling() {
    let invalid_toml = r#"
        [ollama
        host = "localhost"
        port = "invalid_port"
    "#;

    let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
    assert!(result.is_err());
}

#[test]
fn wrong_field_type_is_rejected() {
    let result: Result<Config, toml::de::Error> = toml::from_str("[catalog]\ntop_k = \"three\"\n");
    assert!(result.is_err());
}

#[test]
fn empty_host_is_invalid() {
    let config = Config {
        ollama: OllamaConfig {
            host: String::new(),
            ..OllamaConfig::default()
        },
        ..Config::default()
    };

    assert!(config.validate().is_err());
}

#[test]
fn ollama_url_generation_with_different_hosts() {
    let configs = vec![
        ("http", "localhost", 11434, "http://localhost:11434/"),
        ("http", "127.0.0.1", 8080, "http://127.0.0.1:8080/"),
        (
            "https",
            "secure.example.com",
            443,
            "https://secure.example.com/",
        ),
    ];

    for (protocol, host, port, expected_url) in configs {
        let config = Config {
            ollama: OllamaConfig {
                protocol: protocol.to_string(),
                host: host.to_string(),
                port,
                ..OllamaConfig::default()
            },
            ..Config::default()
        };

        let url = config.ollama_url().expect("ollama_url is ok");
        assert_eq!(url.as_str(), expected_url);
    }
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::InvalidProtocol("ftp".to_string()),
        ConfigError::InvalidPort(0),
        ConfigError::InvalidBatchSize(0),
        ConfigError::InvalidModel(String::new()),
        ConfigError::InvalidUrl("invalid-url".to_string()),
        ConfigError::InvalidTopK(0),
        ConfigError::InvalidPollInterval(0),
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(message.len() > 10);
    }
}
