//! Abstracción sobre Rig para trabajar con varios proveedores de LLM.
//!
//! Cada operación recorre los proveedores configurados en orden (un único
//! intento por proveedor, sin reintentos) y termina siempre en el generador de
//! respaldo, de modo que quien llama nunca ve un error.

use std::{sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::{AppConfig, LlmProvider, ProviderKeys, ProviderModels},
    context::DataContext,
    fallback::{self, FALLBACK_SOURCE},
    models::{Classification, Employee, Priority},
};

/// Motivo por el que un proveedor no produjo una respuesta utilizable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderFailure {
    #[error("ningún proveedor de IA configurado")]
    NotConfigured,
    #[error("cuota del proveedor agotada: {0}")]
    QuotaExceeded(String),
    #[error("tiempo de espera agotado tras {0}s")]
    Timeout(u64),
    #[error("error del proveedor: {0}")]
    Transport(String),
    #[error("respuesta mal formada: {0}")]
    Malformed(String),
}

impl ProviderFailure {
    /// Clasifica el texto de un error del cliente HTTP/LLM.
    pub fn from_error_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("quota") || lower.contains("429") || lower.contains("rate limit") {
            Self::QuotaExceeded(text.to_string())
        } else {
            Self::Transport(text.to_string())
        }
    }

    /// Aviso para el usuario final que acompaña a las respuestas de respaldo.
    pub fn user_note(&self) -> &'static str {
        match self {
            Self::NotConfigured => "AI not configured - add an AI provider key for personalized, AI-generated answers.",
            Self::QuotaExceeded(_) => "AI quota limit reached - using standard pattern-based guidance.",
            Self::Timeout(_) | Self::Transport(_) | Self::Malformed(_) => {
                "AI services temporarily unavailable - using standard pattern-based guidance."
            }
        }
    }
}

/// Petición a un proveedor concreto.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
    pub preamble: String,
    pub prompt: String,
    pub max_tokens: u64,
    pub temperature: f64,
}

/// Punto de enganche con el servicio remoto.
pub trait CompletionBackend: Send + Sync {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String, ProviderFailure>>;
}

/// Backend real basado en los clientes de Rig.
#[derive(Debug, Clone, Copy, Default)]
pub struct RigBackend;

impl CompletionBackend for RigBackend {
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> BoxFuture<'a, Result<String, ProviderFailure>> {
        use rig::client::CompletionClient as _;
        use rig::completion::Prompt;
        use rig::providers::{anthropic, gemini, openai};

        async move {
            let answer = match req.provider {
                LlmProvider::Gemini => {
                    let client = gemini::Client::new(&req.api_key);
                    let agent = client
                        .agent(&req.model)
                        .preamble(&req.preamble)
                        .temperature(req.temperature)
                        .max_tokens(req.max_tokens)
                        .build();
                    agent.prompt(req.prompt.as_str()).await
                }
                LlmProvider::OpenAI => {
                    let client = openai::Client::new(&req.api_key);
                    let agent = client
                        .agent(&req.model)
                        .preamble(&req.preamble)
                        .temperature(req.temperature)
                        .max_tokens(req.max_tokens)
                        .build();
                    agent.prompt(req.prompt.as_str()).await
                }
                LlmProvider::Anthropic => {
                    let client = anthropic::Client::new(&req.api_key);
                    let agent = client
                        .agent(&req.model)
                        .preamble(&req.preamble)
                        .temperature(req.temperature)
                        .max_tokens(req.max_tokens)
                        .build();
                    agent.prompt(req.prompt.as_str()).await
                }
            };
            answer.map_err(|e| ProviderFailure::from_error_text(&e.to_string()))
        }
        .boxed()
    }
}

/// Resultado de la cascada junto con la estrategia que lo produjo.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub source: String,
}

/// Parámetros de una tarea independientes del proveedor.
struct Task {
    preamble: String,
    prompt: String,
    max_tokens: u64,
    temperature: f64,
}

/// Esquema JSON que se exige al proveedor al clasificar tickets.
#[derive(Debug, Deserialize, JsonSchema)]
struct ProviderClassification {
    /// Exactamente uno de los nombres de categoría proporcionados.
    category: String,
    priority: Priority,
    /// Confianza entre 0 y 1.
    #[serde(default = "default_confidence")]
    confidence: f64,
    /// Explicación breve.
    #[serde(default)]
    reasoning: String,
}

fn default_confidence() -> f64 {
    fallback::DEFAULT_CONFIDENCE
}

/// Quita las vallas de markdown (```json ... ```) alrededor de una respuesta.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"));
    match inner {
        Some(rest) => rest.trim_end().trim_end_matches("```").trim(),
        None => trimmed,
    }
}

fn non_empty(text: &str) -> Result<String, ProviderFailure> {
    let t = text.trim();
    if t.is_empty() {
        Err(ProviderFailure::Malformed("respuesta vacía".to_string()))
    } else {
        Ok(t.to_string())
    }
}

fn parse_classification(text: &str, categories: &[String]) -> Result<Classification, ProviderFailure> {
    let raw: ProviderClassification = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| ProviderFailure::Malformed(format!("JSON de clasificación inválido: {e}")))?;

    let category = fallback::resolve_category(&raw.category, categories)
        .ok_or_else(|| ProviderFailure::Malformed(format!("categoría fuera del catálogo: {}", raw.category)))?;
    let confidence = if raw.confidence.is_finite() { raw.confidence.clamp(0.0, 1.0) } else { 0.0 };

    Ok(Classification {
        category: category.to_string(),
        priority: raw.priority,
        confidence,
        reasoning: raw.reasoning,
        source: String::new(),
    })
}

/// Gestor de LLMs: proveedores configurados, orden de la cascada y backend.
#[derive(Clone)]
pub struct LlmManager {
    backend: Arc<dyn CompletionBackend>,
    order: Vec<LlmProvider>,
    keys: ProviderKeys,
    models: ProviderModels,
    timeout: Duration,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::with_backend(cfg, Arc::new(RigBackend))
    }

    pub fn with_backend(cfg: &AppConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        let manager = Self {
            backend,
            order: cfg.provider_order.clone(),
            keys: cfg.provider_keys.clone(),
            models: cfg.provider_models.clone(),
            timeout: cfg.llm_timeout,
        };
        let configured = manager.configured_providers(&ProviderKeys::default());
        if configured.is_empty() {
            info!("Sin claves de IA: todas las respuestas usarán el generador de respaldo.");
        } else {
            info!("Proveedores de IA configurados: {:?}", configured);
        }
        manager
    }

    /// Proveedores que la cascada intentará, en orden, para estas credenciales.
    pub fn configured_providers(&self, overrides: &ProviderKeys) -> Vec<LlmProvider> {
        let keys = overrides.over(&self.keys);
        self.order.iter().copied().filter(|p| keys.get(*p).is_some()).collect()
    }

    async fn run_cascade<T, P, F>(&self, overrides: &ProviderKeys, task: Task, parse: P, on_exhausted: F) -> Outcome<T>
    where
        P: Fn(&str) -> Result<T, ProviderFailure>,
        F: FnOnce(&ProviderFailure) -> T,
    {
        let keys = overrides.over(&self.keys);
        let mut last_failure = ProviderFailure::NotConfigured;

        for provider in self.order.iter().copied() {
            let Some(api_key) = keys.get(provider) else { continue };
            let request = CompletionRequest {
                provider,
                api_key: api_key.to_string(),
                model: self.models.get(provider).to_string(),
                preamble: task.preamble.clone(),
                prompt: task.prompt.clone(),
                max_tokens: task.max_tokens,
                temperature: task.temperature,
            };

            let result = match tokio::time::timeout(self.timeout, self.backend.complete(&request)).await {
                Ok(answer) => answer.and_then(|text| parse(&text)),
                Err(_) => Err(ProviderFailure::Timeout(self.timeout.as_secs())),
            };

            match result {
                Ok(value) => {
                    return Outcome { value, source: provider.name().to_string() };
                }
                Err(failure) => {
                    warn!("El proveedor {} falló: {}. Se pasa a la siguiente estrategia.", provider.name(), failure);
                    last_failure = failure;
                }
            }
        }

        Outcome { value: on_exhausted(&last_failure), source: FALLBACK_SOURCE.to_string() }
    }

    // ---------------------------------------------------------------------
    // TICKETS
    // ---------------------------------------------------------------------

    /// Clasifica una incidencia. Nunca falla: en el peor caso devuelve la
    /// clasificación de respaldo.
    pub async fn classify_ticket(&self, description: &str, categories: &[String], keys: &ProviderKeys) -> Classification {
        let schema = serde_json::to_string_pretty(&schemars::schema_for!(ProviderClassification))
            .unwrap_or_else(|_| "{}".to_string());

        let preamble = format!(
            "You are Manila Water's ticket classification system. Classify the ticket into exactly one of these categories:\n\
             {}\n\n\
             Also determine the priority level: Critical, High, Medium, Low.\n\n\
             Respond only with a JSON object matching this schema:\n{}",
            categories.join(", "),
            schema
        );
        let task = Task {
            preamble,
            prompt: format!("Ticket Description: {description}"),
            max_tokens: 200,
            temperature: 0.3,
        };

        let outcome = self
            .run_cascade(
                keys,
                task,
                |text| parse_classification(text, categories),
                |cause| fallback::classify(description, categories, cause),
            )
            .await;

        let mut classification = outcome.value;
        classification.source = outcome.source;
        classification
    }

    pub async fn suggest_solution(&self, category: &str, description: &str, keys: &ProviderKeys) -> Outcome<String> {
        let preamble = format!(
            "You are Manila Water's technical support AI. Suggest practical solutions for customer issues.\n\n\
             Category: {category}\n\
             Issue Description: {description}\n\n\
             Provide:\n\
             1. Immediate steps the customer can take\n\
             2. What Manila Water will do to resolve the issue\n\
             3. Expected timeline\n\n\
             Keep response concise and actionable."
        );
        let task = Task {
            preamble,
            prompt: format!("Please suggest solutions for this {category} issue: {description}"),
            max_tokens: 250,
            temperature: 0.6,
        };
        self.run_cascade(keys, task, non_empty, |cause| fallback::solution(category, cause))
            .await
    }

    // ---------------------------------------------------------------------
    // RRHH
    // ---------------------------------------------------------------------

    pub async fn hr_response(
        &self,
        query: &str,
        employee: Option<&Employee>,
        context: &str,
        keys: &ProviderKeys,
    ) -> Outcome<String> {
        let employee_json = employee
            .and_then(|e| serde_json::to_string_pretty(e).ok())
            .unwrap_or_else(|| "{}".to_string());

        let preamble = format!(
            "You are Manila Water's HR AI Assistant. You help employees with HR-related queries.\n\n\
             Employee Context: {employee_json}\n\
             Additional Context: {context}\n\n\
             Respond professionally and helpfully. If you need to reference specific policies or procedures, \
             mention that detailed information is available in the employee handbook.\n\
             Keep responses concise but informative."
        );
        let task = Task { preamble, prompt: query.to_string(), max_tokens: 300, temperature: 0.7 };
        self.run_cascade(keys, task, non_empty, |cause| fallback::hr_reply(query, employee, cause))
            .await
    }

    // ---------------------------------------------------------------------
    // DATOS
    // ---------------------------------------------------------------------

    pub async fn data_insights(&self, query: &str, ctx: &DataContext, keys: &ProviderKeys) -> Outcome<String> {
        let preamble = format!(
            "You are Manila Water's Data Analytics AI. You help users understand water utility data and operational metrics.\n\n\
             Available Data Context:\n{}\n\n\
             Provide clear, actionable insights based on the data. Include specific numbers and trends when relevant.\n\
             If the query cannot be answered with available data, suggest what additional information might be needed.",
            ctx.to_pretty_json()
        );
        let task = Task { preamble, prompt: query.to_string(), max_tokens: 400, temperature: 0.5 };
        self.run_cascade(keys, task, non_empty, |cause| fallback::insights(query, ctx, cause))
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::{collections::VecDeque, sync::Mutex};

    /// Backend en memoria: devuelve respuestas pregrabadas y registra los
    /// proveedores a los que se llamó.
    #[derive(Default)]
    pub struct ScriptedBackend {
        pub replies: Mutex<VecDeque<Result<String, ProviderFailure>>>,
        pub calls: Mutex<Vec<LlmProvider>>,
        pub delay: Option<Duration>,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<String, ProviderFailure>>) -> Self {
            Self { replies: Mutex::new(replies.into()), ..Default::default() }
        }

        pub fn calls(&self) -> Vec<LlmProvider> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CompletionBackend for ScriptedBackend {
        fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String, ProviderFailure>> {
            async move {
                self.calls.lock().unwrap().push(request.provider);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                let next = self.replies.lock().unwrap().pop_front();
                next.unwrap_or_else(|| Err(ProviderFailure::Transport("sin respuesta grabada".into())))
            }
            .boxed()
        }
    }

    pub fn config_with_keys(keys: ProviderKeys) -> AppConfig {
        let mut cfg = AppConfig::from_lookup(|_| None).unwrap();
        cfg.provider_keys = keys;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::{context::assemble_data_context, dataset::fixture};

    fn categories() -> Vec<String> {
        fixture().category_names()
    }

    fn all_keys() -> ProviderKeys {
        ProviderKeys { gemini: Some("g".into()), openai: Some("o".into()), anthropic: Some("a".into()) }
    }

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  {\"b\":2} "), "{\"b\":2}");
    }

    #[test]
    fn quota_errors_are_recognised() {
        assert!(matches!(ProviderFailure::from_error_text("HTTP 429 Too Many Requests"), ProviderFailure::QuotaExceeded(_)));
        assert!(matches!(ProviderFailure::from_error_text("Quota exceeded"), ProviderFailure::QuotaExceeded(_)));
        assert!(matches!(ProviderFailure::from_error_text("connection reset"), ProviderFailure::Transport(_)));
    }

    #[tokio::test]
    async fn no_keys_means_fallback_without_calls() {
        let backend = Arc::new(ScriptedBackend::default());
        let llm = LlmManager::with_backend(&config_with_keys(ProviderKeys::default()), backend.clone());

        let c = llm
            .classify_ticket("Major water main break on Ayala Avenue causing street flooding", &categories(), &ProviderKeys::default())
            .await;
        assert_eq!(c.source, FALLBACK_SOURCE);
        assert_eq!(c.priority, Priority::Critical);
        assert!(c.reasoning.contains("AI not configured"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_answer_moves_to_next_provider() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("I think this is about water quality".into()),
            Ok("```json\n{\"category\":\"water quality issues\",\"priority\":\"high\",\"confidence\":1.4,\"reasoning\":\"odor\"}\n```".into()),
        ]));
        let llm = LlmManager::with_backend(&config_with_keys(all_keys()), backend.clone());

        let c = llm.classify_ticket("Tap water smells odd", &categories(), &ProviderKeys::default()).await;
        assert_eq!(c.source, "openai");
        assert_eq!(c.category, "Water Quality Issues");
        assert_eq!(c.priority, Priority::High);
        assert_eq!(c.confidence, 1.0);
        assert_eq!(backend.calls(), vec![LlmProvider::Gemini, LlmProvider::OpenAI]);
    }

    #[tokio::test]
    async fn category_outside_catalog_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            r#"{"category":"Alien Activity","priority":"Low","confidence":0.9,"reasoning":"?"}"#.into(),
        )]));
        let keys = ProviderKeys { gemini: Some("g".into()), ..Default::default() };
        let llm = LlmManager::with_backend(&config_with_keys(keys), backend);

        let cats = categories();
        let c = llm.classify_ticket("Strange lights above the reservoir", &cats, &ProviderKeys::default()).await;
        assert_eq!(c.source, FALLBACK_SOURCE);
        assert!(c.category == fallback::DEFAULT_CATEGORY || cats.contains(&c.category));
        assert!(c.reasoning.contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn quota_failure_is_explained_in_fallback() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(ProviderFailure::QuotaExceeded("429".into()))]));
        let keys = ProviderKeys { gemini: Some("g".into()), ..Default::default() };
        let llm = LlmManager::with_backend(&config_with_keys(keys), backend);

        let out = llm.suggest_solution("Service Interruption", "No water", &ProviderKeys::default()).await;
        assert_eq!(out.source, FALLBACK_SOURCE);
        assert!(out.value.contains("AI quota limit reached"));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let backend = Arc::new(ScriptedBackend {
            replies: std::sync::Mutex::new(vec![Ok("late answer".to_string())].into()),
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let mut cfg = config_with_keys(ProviderKeys { openai: Some("o".into()), ..Default::default() });
        cfg.llm_timeout = Duration::from_millis(20);
        let llm = LlmManager::with_backend(&cfg, backend);

        let out = llm.hr_response("When is payday?", None, "", &ProviderKeys::default()).await;
        assert_eq!(out.source, FALLBACK_SOURCE);
        assert!(out.value.contains("payroll"));
    }

    #[test]
    fn session_credentials_enable_providers() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("Consumption is up 3%.".into())]));
        let llm = LlmManager::with_backend(&config_with_keys(ProviderKeys::default()), backend.clone());
        let session_keys = ProviderKeys { anthropic: Some("sess".into()), ..Default::default() };
        assert_eq!(llm.configured_providers(&session_keys), vec![LlmProvider::Anthropic]);

        let ds = fixture();
        let ctx = assemble_data_context("consumption", &ds);
        let out = tokio_test::block_on(llm.data_insights("consumption", &ctx, &session_keys));
        assert_eq!(out, Outcome { value: "Consumption is up 3%.".to_string(), source: "anthropic".to_string() });
        assert_eq!(backend.calls(), vec![LlmProvider::Anthropic]);
    }

    #[test]
    fn classification_schema_lists_priorities() {
        let schema = serde_json::to_string(&schemars::schema_for!(ProviderClassification)).unwrap();
        for level in ["Critical", "High", "Medium", "Low"] {
            assert!(schema.contains(level), "{level} missing from schema");
        }

        let cats = categories();
        let ok = parse_classification(r#"{"category":"Billing Inquiries","priority":"LOW"}"#, &cats).unwrap();
        assert_eq!(ok.priority, Priority::Low);
        assert_eq!(ok.confidence, fallback::DEFAULT_CONFIDENCE);
        let bad = parse_classification(r#"{"category":"Billing Inquiries","priority":"urgent"}"#, &cats);
        assert!(matches!(bad, Err(ProviderFailure::Malformed(_))));
    }

    #[test]
    fn empty_answer_is_malformed() {
        assert!(matches!(non_empty("   "), Err(ProviderFailure::Malformed(_))));
        assert_eq!(non_empty(" ok ").unwrap(), "ok");
    }
}
