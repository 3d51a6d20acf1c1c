use std::io::Write;

use serial_test::serial;

use super::*;
use crate::vault::MockVaultProvider;

const ENV_KEYS: [&str; 14] = [
    "DOCENT_LLM_PROVIDER",
    "DOCENT_LLM_MODEL",
    "DOCENT_LLM_EMBEDDING_MODEL",
    "DOCENT_LLM_BASE_URL",
    "DOCENT_LLM_TEMPERATURE",
    "DOCENT_DATABASE_PATH",
    "DOCENT_MEDIA_ROOT",
    "DOCENT_VECTOR_ROOT",
    "DOCENT_RAG_TOP_K",
    "DOCENT_RAG_HYDE",
    "DOCENT_SERVER_HOST",
    "DOCENT_SERVER_PORT",
    "DOCENT_SERVER_RATE_LIMIT",
    "DOCENT_GEMINI_API_KEY",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.llm.provider, ProviderKind::Gemini);
    assert_eq!(config.llm.model, "gemini-2.0-flash-exp");
    assert_eq!(config.llm.embedding_model, "text-embedding-004");
    assert!(config.llm.base_url.is_none());
    assert!((config.llm.temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(config.ingest.chunk_size, 1000);
    assert_eq!(config.ingest.chunk_overlap, 200);
    assert_eq!(config.ingest.max_file_size, 50 * 1024 * 1024);
    assert_eq!(config.rag.top_k, 5);
    assert!(config.rag.hyde);
    assert_eq!(config.server.port, 8080);
    assert!(config.secrets.gemini_api_key.is_none());
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.storage.database_path, "data/docent.db");
    assert_eq!(config.storage.vector_root, "data/vectors");
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[llm]
provider = "ollama"
model = "llama3:8b"
embedding_model = "nomic-embed-text"
base_url = "http://ollama:11434"

[storage]
vector_root = "/srv/docent/vectors"

[ingest]
chunk_size = 500
chunk_overlap = 50

[rag]
top_k = 3
hyde = false
"#
    )
    .unwrap();

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.llm.model, "llama3:8b");
    assert_eq!(config.llm.base_url.as_deref(), Some("http://ollama:11434"));
    assert_eq!(config.storage.vector_root, "/srv/docent/vectors");
    assert_eq!(config.storage.media_root, "data/media");
    assert_eq!(config.ingest.chunk_size, 500);
    assert_eq!(config.ingest.chunk_overlap, 50);
    assert_eq!(config.rag.top_k, 3);
    assert!(!config.rag.hyde);
    config.validate().unwrap();
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[llm\nprovider = ").unwrap();
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse config file"));
}

#[test]
#[serial]
fn unknown_provider_in_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[llm]\nprovider = \"claude\"\n").unwrap();
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides_apply() {
    clear_env();
    unsafe {
        std::env::set_var("DOCENT_LLM_PROVIDER", "openai");
        std::env::set_var("DOCENT_LLM_MODEL", "gpt-4o-mini");
        std::env::set_var("DOCENT_LLM_BASE_URL", "http://proxy/v1");
        std::env::set_var("DOCENT_VECTOR_ROOT", "/tmp/vectors");
        std::env::set_var("DOCENT_RAG_TOP_K", "8");
        std::env::set_var("DOCENT_RAG_HYDE", "false");
        std::env::set_var("DOCENT_SERVER_PORT", "9000");
        std::env::set_var("DOCENT_SERVER_HOST", "0.0.0.0");
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.llm.base_url.as_deref(), Some("http://proxy/v1"));
    assert_eq!(config.storage.vector_root, "/tmp/vectors");
    assert_eq!(config.rag.top_k, 8);
    assert!(!config.rag.hyde);
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("DOCENT_LLM_PROVIDER", "claude");
        std::env::set_var("DOCENT_RAG_TOP_K", "many");
        std::env::set_var("DOCENT_SERVER_PORT", "99999");
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Gemini);
    assert_eq!(config.rag.top_k, 5);
    assert_eq!(config.server.port, 8080);
}

#[test]
fn validate_rejects_zero_chunk_size() {
    let mut config = Config::default();
    config.ingest.chunk_size = 0;
    config.ingest.chunk_overlap = 0;
    assert!(config.validate().unwrap_err().to_string().contains("chunk_size"));
}

#[test]
fn validate_rejects_overlap_not_smaller_than_chunk() {
    let mut config = Config::default();
    config.ingest.chunk_size = 100;
    config.ingest.chunk_overlap = 100;
    assert!(config.validate().unwrap_err().to_string().contains("chunk_overlap"));
}

#[test]
fn validate_rejects_zero_top_k() {
    let mut config = Config::default();
    config.rag.top_k = 0;
    assert!(config.validate().unwrap_err().to_string().contains("top_k"));
}

#[test]
fn provider_kind_display() {
    assert_eq!(ProviderKind::Gemini.to_string(), "gemini");
    assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
    assert_eq!(ProviderKind::Ollama.to_string(), "ollama");
}

#[tokio::test]
async fn resolve_secrets_from_vault() {
    let vault = MockVaultProvider::new().with_secret(GEMINI_API_KEY_VAR, "g-key");
    let mut config = Config::default();
    config.resolve_secrets(&vault).await.unwrap();
    assert_eq!(
        config.secrets.gemini_api_key.as_ref().map(Secret::expose),
        Some("g-key")
    );
    assert!(config.secrets.openai_api_key.is_none());
    assert_eq!(format!("{:?}", config.secrets.gemini_api_key), "Some([REDACTED])");
}
