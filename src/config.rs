use serde::Deserialize;

/// Which LLM backend the AI disambiguator talks to.
///
/// Selection mirrors credential precedence: OpenRouter, then Gemini, then
/// Groq. Absence of every key disables the adapter, it never errors the
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Openrouter,
    Gemini,
    Groq,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Openrouter => "openrouter",
            LlmProvider::Gemini => "gemini",
            LlmProvider::Groq => "groq",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// SearXNG-style meta-search endpoint used by the search adapter.
    pub search_endpoint: String,
    /// Realistic browser UA for domain probing (bot UAs get blocked).
    pub http_user_agent: String,
    /// Places API credential; `None` skips the places adapter.
    pub places_api_key: Option<String>,
    /// Directory API credential; `None` skips the directory adapter.
    pub directory_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    /// Override base URLs so tests can point adapters at a mock server.
    pub openrouter_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
    pub groq_base_url: Option<String>,
    pub places_base_url: Option<String>,
    pub directory_base_url: Option<String>,
    /// Start the verification loop on boot.
    pub auto_runner_enabled: bool,
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            search_endpoint: std::env::var("SEARCH_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8888/search".to_string()),
            http_user_agent: std::env::var("HTTP_USER_AGENT").unwrap_or_else(|_| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string()
            }),
            places_api_key: optional_env("PLACES_API_KEY"),
            directory_api_key: optional_env("DIRECTORY_API_KEY"),
            openrouter_api_key: optional_env("OPENROUTER_API_KEY"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            groq_api_key: optional_env("GROQ_API_KEY"),
            openrouter_base_url: optional_env("OPENROUTER_BASE_URL"),
            gemini_base_url: optional_env("GEMINI_BASE_URL"),
            groq_base_url: optional_env("GROQ_BASE_URL"),
            places_base_url: optional_env("PLACES_BASE_URL"),
            directory_base_url: optional_env("DIRECTORY_BASE_URL"),
            auto_runner_enabled: std::env::var("AUTO_RUNNER_ENABLED")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Search endpoint: {}", config.search_endpoint);
        tracing::debug!("Server Port: {}", config.port);
        if config.places_api_key.is_some() {
            tracing::info!("Places API credential configured");
        }
        if config.directory_api_key.is_some() {
            tracing::info!("Directory API credential configured");
        }
        if let Some(provider) = config.llm_provider() {
            tracing::info!("LLM provider selected: {}", provider.as_str());
        }

        Ok(config)
    }

    /// Pick the LLM provider by credential precedence.
    pub fn llm_provider(&self) -> Option<LlmProvider> {
        if self.openrouter_api_key.is_some() {
            Some(LlmProvider::Openrouter)
        } else if self.gemini_api_key.is_some() {
            Some(LlmProvider::Gemini)
        } else if self.groq_api_key.is_some() {
            Some(LlmProvider::Groq)
        } else {
            None
        }
    }

    pub fn llm_api_key(&self) -> Option<&str> {
        match self.llm_provider()? {
            LlmProvider::Openrouter => self.openrouter_api_key.as_deref(),
            LlmProvider::Gemini => self.gemini_api_key.as_deref(),
            LlmProvider::Groq => self.groq_api_key.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> Config {
        Config {
            database_url: "postgresql://test".to_string(),
            port: 3000,
            search_endpoint: "http://localhost:8888/search".to_string(),
            http_user_agent: "test-agent".to_string(),
            places_api_key: None,
            directory_api_key: None,
            openrouter_api_key: None,
            gemini_api_key: None,
            groq_api_key: None,
            openrouter_base_url: None,
            gemini_base_url: None,
            groq_base_url: None,
            places_base_url: None,
            directory_base_url: None,
            auto_runner_enabled: false,
        }
    }

    #[test]
    fn llm_provider_precedence() {
        let mut config = bare_config();
        assert_eq!(config.llm_provider(), None);

        config.groq_api_key = Some("g".to_string());
        assert_eq!(config.llm_provider(), Some(LlmProvider::Groq));

        config.gemini_api_key = Some("ge".to_string());
        assert_eq!(config.llm_provider(), Some(LlmProvider::Gemini));

        config.openrouter_api_key = Some("or".to_string());
        assert_eq!(config.llm_provider(), Some(LlmProvider::Openrouter));
        assert_eq!(config.llm_api_key(), Some("or"));
    }
}
