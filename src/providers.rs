use crate::config::{ProviderSettings, Vendor};
use std::collections::HashMap;

/// The closed set of logical models this relay can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    DeepSeekR1,
    DeepSeekV3,
    ChatGpt4o,
    Claude35,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::DeepSeekR1,
        ModelKind::DeepSeekV3,
        ModelKind::ChatGpt4o,
        ModelKind::Claude35,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DeepSeek-R1" => Some(Self::DeepSeekR1),
            "DeepSeek-v3" => Some(Self::DeepSeekV3),
            "ChatGPT-4o" => Some(Self::ChatGpt4o),
            "Claude3.5" => Some(Self::Claude35),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepSeekR1 => "DeepSeek-R1",
            Self::DeepSeekV3 => "DeepSeek-v3",
            Self::ChatGpt4o => "ChatGPT-4o",
            Self::Claude35 => "Claude3.5",
        }
    }

    pub fn vendor(&self) -> Vendor {
        match self {
            Self::DeepSeekR1 | Self::DeepSeekV3 => Vendor::DeepSeek,
            Self::ChatGpt4o => Vendor::OpenAi,
            Self::Claude35 => Vendor::Claude,
        }
    }

    pub fn upstream_model_id(&self) -> &'static str {
        match self {
            Self::DeepSeekR1 => "ep-20250209190801-s22n6",
            Self::DeepSeekV3 => "ep-20250210104447-czrhz",
            Self::ChatGpt4o => "gpt-4o",
            Self::Claude35 => "claude-3-5-sonnet-20241022",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub upstream_model_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown model_name: {0:?}")]
    UnknownModel(String),
    #[error("model {model} is not configured: {variable} is not set")]
    MissingCredential {
        model: String,
        variable: &'static str,
    },
}

/// Logical model name → upstream connection parameters.
///
/// Built once from [`ProviderSettings`] and never mutated afterwards, so
/// lookups are pure. Every [`ModelKind`] has an entry; an entry whose
/// credentials were missing at startup resolves to the recorded error.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    entries: HashMap<ModelKind, Result<ProviderConfig, ConfigError>>,
}

impl ProviderRegistry {
    pub fn new(settings: &ProviderSettings) -> Self {
        let entries = ModelKind::ALL
            .into_iter()
            .map(|kind| (kind, build_entry(kind, settings)))
            .collect();
        Self { entries }
    }

    pub fn resolve(&self, model_name: &str) -> Result<&ProviderConfig, ConfigError> {
        let kind = ModelKind::from_name(model_name)
            .ok_or_else(|| ConfigError::UnknownModel(model_name.to_string()))?;
        match self.entries.get(&kind) {
            Some(Ok(config)) => Ok(config),
            Some(Err(err)) => Err(err.clone()),
            None => Err(ConfigError::UnknownModel(model_name.to_string())),
        }
    }

    /// Logical names that currently resolve to a usable provider.
    pub fn configured_models(&self) -> Vec<&'static str> {
        ModelKind::ALL
            .into_iter()
            .filter(|kind| matches!(self.entries.get(kind), Some(Ok(_))))
            .map(|kind| kind.as_str())
            .collect()
    }
}

fn build_entry(kind: ModelKind, settings: &ProviderSettings) -> Result<ProviderConfig, ConfigError> {
    let vendor = kind.vendor();
    let creds = settings.vendor(vendor);
    let missing = |variable| ConfigError::MissingCredential {
        model: kind.as_str().to_string(),
        variable,
    };
    let api_key = creds
        .api_key
        .clone()
        .ok_or_else(|| missing(vendor.api_key_var()))?;
    let base_url = creds
        .base_url
        .clone()
        .ok_or_else(|| missing(vendor.base_url_var()))?;
    Ok(ProviderConfig {
        api_key,
        base_url,
        upstream_model_id: kind.upstream_model_id().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ModelKind, ProviderRegistry};
    use crate::config::{ProviderSettings, VendorCredentials};

    fn full_settings() -> ProviderSettings {
        ProviderSettings {
            deepseek: VendorCredentials::new("ds-key", "https://ds.example/api/v3"),
            openai: VendorCredentials::new("oa-key", "https://oa.example/v1"),
            claude: VendorCredentials::new("cl-key", "https://cl.example/v1"),
        }
    }

    #[test]
    fn every_logical_name_round_trips() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ModelKind::from_name("deepseek-v3"), None);
    }

    #[test]
    fn deepseek_variants_share_credentials_but_not_model_id() {
        let registry = ProviderRegistry::new(&full_settings());
        let r1 = registry.resolve("DeepSeek-R1").unwrap();
        let v3 = registry.resolve("DeepSeek-v3").unwrap();
        assert_eq!(r1.api_key, "ds-key");
        assert_eq!(r1.base_url, v3.base_url);
        assert_eq!(r1.upstream_model_id, "ep-20250209190801-s22n6");
        assert_eq!(v3.upstream_model_id, "ep-20250210104447-czrhz");
    }

    #[test]
    fn resolve_is_pure() {
        let registry = ProviderRegistry::new(&full_settings());
        for kind in ModelKind::ALL {
            let first = registry.resolve(kind.as_str()).unwrap().clone();
            for _ in 0..3 {
                assert_eq!(registry.resolve(kind.as_str()).unwrap(), &first);
            }
        }
    }

    #[test]
    fn unknown_model_is_an_explicit_error() {
        let registry = ProviderRegistry::new(&full_settings());
        assert_eq!(
            registry.resolve("gpt-5"),
            Err(ConfigError::UnknownModel("gpt-5".to_string()))
        );
        assert_eq!(
            registry.resolve(""),
            Err(ConfigError::UnknownModel(String::new()))
        );
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let mut settings = full_settings();
        settings.claude.api_key = None;
        settings.openai.base_url = None;
        let registry = ProviderRegistry::new(&settings);

        assert_eq!(
            registry.resolve("Claude3.5"),
            Err(ConfigError::MissingCredential {
                model: "Claude3.5".to_string(),
                variable: "claude_api_key",
            })
        );
        assert_eq!(
            registry.resolve("ChatGPT-4o"),
            Err(ConfigError::MissingCredential {
                model: "ChatGPT-4o".to_string(),
                variable: "openai_url",
            })
        );
        assert_eq!(
            registry.configured_models(),
            vec!["DeepSeek-R1", "DeepSeek-v3"]
        );
    }
}
