use super::*;
use tempfile::TempDir;

#[test]
fn default_config_is_valid() {
    let config = Config {
        ollama: OllamaConfig::default(),
        chunking: ChunkingConfig::default(),
        search: SearchConfig::default(),
        base_dir: PathBuf::from("/tmp/docvec-test"),
    };

    assert!(config.validate().is_ok());
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_dimension, 768);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.search.default_top_k, 5);
}

#[test]
fn load_without_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("can create temp dir");

    let config = Config::load(temp_dir.path()).expect("load should succeed");

    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn save_and_reload_round_trip() {
    let temp_dir = TempDir::new().expect("can create temp dir");

    let mut config = Config::load(temp_dir.path()).expect("load should succeed");
    config.ollama.model = "all-minilm:latest".to_string();
    config.ollama.batch_size = 64;
    config.chunking.chunk_size = 2000;
    config.search.default_top_k = 10;
    config.save().expect("save should succeed");

    let reloaded = Config::load(temp_dir.path()).expect("reload should succeed");
    assert_eq!(reloaded.ollama.model, "all-minilm:latest");
    assert_eq!(reloaded.ollama.batch_size, 64);
    assert_eq!(reloaded.chunking.chunk_size, 2000);
    assert_eq!(reloaded.search.default_top_k, 10);
}

#[test]
fn invalid_protocol_rejected() {
    let config = OllamaConfig {
        protocol: "ftp".to_string(),
        ..OllamaConfig::default()
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));
}

#[test]
fn invalid_batch_size_rejected() {
    let config = OllamaConfig {
        batch_size: 0,
        ..OllamaConfig::default()
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));
}

#[test]
fn overlap_must_be_smaller_than_chunk_size() {
    let config = Config {
        ollama: OllamaConfig::default(),
        chunking: ChunkingConfig {
            chunk_size: 500,
            overlap: 500,
            ..ChunkingConfig::default()
        },
        search: SearchConfig::default(),
        base_dir: PathBuf::from("/tmp/docvec-test"),
    };

    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidOverlap(500, 500))
    ));
}

#[test]
fn zero_top_k_rejected() {
    let config = Config {
        ollama: OllamaConfig::default(),
        chunking: ChunkingConfig::default(),
        search: SearchConfig { default_top_k: 0 },
        base_dir: PathBuf::from("/tmp/docvec-test"),
    };

    assert!(matches!(config.validate(), Err(ConfigError::InvalidTopK(0))));
}

#[test]
fn base_url_formats_host_and_port() {
    let config = OllamaConfig {
        host: "embed-host".to_string(),
        port: 4321,
        ..OllamaConfig::default()
    };

    let url = config.base_url().expect("valid url");
    assert_eq!(url.host_str(), Some("embed-host"));
    assert_eq!(url.port(), Some(4321));
}
