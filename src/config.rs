use serde::{Deserialize, Serialize};

/// Credentials for one upstream vendor, as read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VendorCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl VendorCredentials {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: Some(base_url.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    DeepSeek,
    OpenAi,
    Claude,
}

impl Vendor {
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Vendor::DeepSeek => "deepseek_api_key",
            Vendor::OpenAi => "openai_api_key",
            Vendor::Claude => "claude_api_key",
        }
    }

    pub fn base_url_var(&self) -> &'static str {
        match self {
            Vendor::DeepSeek => "deepseek_url",
            Vendor::OpenAi => "openai_url",
            Vendor::Claude => "claude_url",
        }
    }
}

/// Per-vendor credential table. Read once at startup and turned into the
/// provider registry; nothing reads the environment after that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub deepseek: VendorCredentials,
    #[serde(default)]
    pub openai: VendorCredentials,
    #[serde(default)]
    pub claude: VendorCredentials,
}

impl ProviderSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |vendor: Vendor| VendorCredentials {
            api_key: non_blank(lookup(vendor.api_key_var())),
            base_url: non_blank(lookup(vendor.base_url_var())),
        };
        Self {
            deepseek: read(Vendor::DeepSeek),
            openai: read(Vendor::OpenAi),
            claude: read(Vendor::Claude),
        }
    }

    pub fn vendor(&self, vendor: Vendor) -> &VendorCredentials {
        match vendor {
            Vendor::DeepSeek => &self.deepseek,
            Vendor::OpenAi => &self.openai,
            Vendor::Claude => &self.claude,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
