use webpilot_core::{Config, Result};

use crate::{AzureProvider, OllamaProvider, OpenAIProvider, Provider};

/// Build the configured decision provider. Missing credentials surface as
/// `Error::Config` before any browser resources are touched.
pub fn create_provider(config: &Config) -> Result<Box<dyn Provider>> {
    config.validate_provider()?;

    let provider: Box<dyn Provider> = match config.provider.as_str() {
        "openai" => Box::new(OpenAIProvider::new(
            &config.openai.api_key,
            &config.openai.base_url,
            &config.openai.model_id,
        )),
        "azure" => Box::new(AzureProvider::new(
            &config.azure.endpoint,
            &config.azure.api_key,
            &config.azure.deployment_name,
            &config.azure.api_version,
        )),
        // validate_provider restricts the set, anything else is ollama
        _ => Box::new(OllamaProvider::new(
            &config.ollama.base_url,
            &config.ollama.model_id,
        )),
    };

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpilot_core::Error;

    #[test]
    fn test_create_default_ollama() {
        let config = Config::default();
        assert!(create_provider(&config).is_ok());
    }

    #[test]
    fn test_missing_openai_key_is_config_error() {
        let mut config = Config::default();
        config.provider = "openai".into();
        assert!(matches!(create_provider(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_azure_with_credentials() {
        let mut config = Config::default();
        config.provider = "azure".into();
        config.azure.endpoint = "https://res.openai.azure.com".into();
        config.azure.api_key = "k".into();
        config.azure.deployment_name = "gpt-4o".into();
        assert!(create_provider(&config).is_ok());
    }
}
