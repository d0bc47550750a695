use conversation::{OpenAiConfig, Role};

/// Default chat-completions endpoint (llama.cpp / vLLM style server).
const DEFAULT_URL: &str = "http://localhost:8080/v1";
const DEFAULT_MODEL: &str = "default";

/// Generation endpoint configuration, one model per role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub writer_model: String,
    pub reader_model: String,
    pub expert_model: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

impl EndpointConfig {
    /// Build from `STORY_LLM_*` and per-role `STORY_*_MODEL` variables.
    ///
    /// Role models fall back to `STORY_LLM_MODEL`, then to the server default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let shared = lookup("STORY_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        let role_model = |var: &str| lookup(var).unwrap_or_else(|| shared.clone());
        Self {
            url: lookup("STORY_LLM_URL").unwrap_or_else(|| DEFAULT_URL.into()),
            api_key: lookup("STORY_LLM_API_KEY").filter(|k| !k.is_empty()),
            writer_model: role_model("STORY_WRITER_MODEL"),
            reader_model: role_model("STORY_READER_MODEL"),
            expert_model: role_model("STORY_EXPERT_MODEL"),
        }
    }

    pub fn model_for(&self, role: Role) -> &str {
        match role {
            Role::Writer => &self.writer_model,
            Role::Reader => &self.reader_model,
            Role::Expert => &self.expert_model,
        }
    }

    /// Backend settings for one role.
    pub fn openai_config(&self, role: Role, stream: bool) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.url.clone(),
            model: self.model_for(role).to_string(),
            api_key: self.api_key.clone(),
            // Writer runs hotter than the reviewing roles.
            temperature: if role == Role::Writer { 0.8 } else { 0.3 },
            stream,
            ..OpenAiConfig::default()
        }
    }
}
