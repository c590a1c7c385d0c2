//! Carga y gestión de configuración de la aplicación (datos + proveedores LLM).

use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::routing::MatchPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Claves de API por proveedor. Una clave vacía equivale a no configurada.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderKeys {
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

impl ProviderKeys {
    pub fn get(&self, provider: LlmProvider) -> Option<&str> {
        let key = match provider {
            LlmProvider::Gemini => &self.gemini,
            LlmProvider::OpenAI => &self.openai,
            LlmProvider::Anthropic => &self.anthropic,
        };
        key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Claves de `self` con prioridad sobre las de `base`.
    pub fn over(&self, base: &ProviderKeys) -> ProviderKeys {
        let pick = |p: LlmProvider| self.get(p).or_else(|| base.get(p)).map(str::to_string);
        ProviderKeys {
            gemini: pick(LlmProvider::Gemini),
            openai: pick(LlmProvider::OpenAI),
            anthropic: pick(LlmProvider::Anthropic),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProviderModels {
    pub gemini: String,
    pub openai: String,
    pub anthropic: String,
}

impl ProviderModels {
    pub fn get(&self, provider: LlmProvider) -> &str {
        match provider {
            LlmProvider::Gemini => &self.gemini,
            LlmProvider::OpenAI => &self.openai,
            LlmProvider::Anthropic => &self.anthropic,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub data_dir: PathBuf,

    pub provider_order: Vec<LlmProvider>,
    pub provider_keys: ProviderKeys,
    pub provider_models: ProviderModels,
    pub llm_timeout: Duration,

    pub technician_policy: MatchPolicy,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una función arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server_addr = var("SERVER_ADDR", "127.0.0.1:3322");
        let data_dir = PathBuf::from(var("DATA_DIR", "data"));

        let provider_order = var("LLM_PROVIDER_ORDER", "gemini,openai,anthropic")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(LlmProvider::from_str)
            .collect::<Result<Vec<_>>>()?;

        let provider_keys = ProviderKeys {
            gemini: lookup("GEMINI_API_KEY"),
            openai: lookup("OPENAI_API_KEY"),
            anthropic: lookup("ANTHROPIC_API_KEY"),
        };

        let provider_models = ProviderModels {
            gemini: var("GEMINI_MODEL", "gemini-1.5-flash"),
            openai: var("OPENAI_MODEL", "gpt-3.5-turbo"),
            anthropic: var("ANTHROPIC_MODEL", "claude-3-haiku-20240307"),
        };

        let timeout_secs: u64 = var("LLM_TIMEOUT_SECS", "30")
            .parse()
            .map_err(|_| anyhow!("LLM_TIMEOUT_SECS debe ser un entero positivo"))?;
        if timeout_secs == 0 {
            return Err(anyhow!("LLM_TIMEOUT_SECS debe ser mayor que cero"));
        }

        let technician_policy = MatchPolicy::from_str(&var("TECHNICIAN_POLICY", "least-loaded"))?;

        Ok(Self {
            server_addr,
            data_dir,
            provider_order,
            provider_keys,
            provider_models,
            llm_timeout: Duration::from_secs(timeout_secs),
            technician_policy,
        })
    }
}
