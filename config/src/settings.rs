//! Typed runtime settings read from the merged environment.

/// Provider wiring read from the environment after [`crate::load_and_apply`].
///
/// Hosts use this to pick and construct a provider implementation; the engine
/// itself never reads these variables.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Provider backend name (`WEFT_PROVIDER`), e.g. `"openrouter"`. Defaults
    /// to `"mock"` when unset so tests and dry runs need no configuration.
    pub provider: String,
    /// Model identifier passed through to the provider (`WEFT_MODEL`).
    pub model: Option<String>,
    /// Name of the env var holding the API key (`WEFT_API_KEY_VAR`), so the
    /// key itself never travels through config files.
    pub api_key_var: Option<String>,
}

impl RuntimeSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self {
            provider: std::env::var("WEFT_PROVIDER").unwrap_or_else(|_| "mock".to_string()),
            model: std::env::var("WEFT_MODEL").ok(),
            api_key_var: std::env::var("WEFT_API_KEY_VAR").ok(),
        }
    }

    /// Resolves the API key through the indirection var, if configured.
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_var.as_deref()?;
        std::env::var(var).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_mock_provider() {
        std::env::remove_var("WEFT_PROVIDER");
        let s = RuntimeSettings::from_env();
        assert_eq!(s.provider, "mock");
    }

    #[test]
    fn api_key_resolved_through_named_var() {
        std::env::set_var("WEFT_TEST_KEY_SLOT", "sekrit");
        let s = RuntimeSettings {
            provider: "mock".into(),
            model: None,
            api_key_var: Some("WEFT_TEST_KEY_SLOT".into()),
        };
        assert_eq!(s.api_key().as_deref(), Some("sekrit"));
        std::env::remove_var("WEFT_TEST_KEY_SLOT");
    }
}
