use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_storage();
        self.apply_env_overrides_service();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("DOCENT_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid DOCENT_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_TEMPERATURE")
            && let Ok(t) = v.parse::<f32>()
        {
            self.llm.temperature = t;
        }
    }

    fn apply_env_overrides_storage(&mut self) {
        if let Ok(v) = std::env::var("DOCENT_DATABASE_PATH") {
            self.storage.database_path = v;
        }
        if let Ok(v) = std::env::var("DOCENT_MEDIA_ROOT") {
            self.storage.media_root = v;
        }
        if let Ok(v) = std::env::var("DOCENT_VECTOR_ROOT") {
            self.storage.vector_root = v;
        }
    }

    fn apply_env_overrides_service(&mut self) {
        if let Ok(v) = std::env::var("DOCENT_RAG_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.rag.top_k = k;
        }
        if let Ok(v) = std::env::var("DOCENT_RAG_HYDE")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.rag.hyde = enabled;
        }
        if let Ok(v) = std::env::var("DOCENT_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("DOCENT_SERVER_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.server.port = port;
        }
        if let Ok(v) = std::env::var("DOCENT_SERVER_RATE_LIMIT")
            && let Ok(limit) = v.parse::<u32>()
        {
            self.server.rate_limit = limit;
        }
    }
}
