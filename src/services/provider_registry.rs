//! Provider registry and model routing.
//!
//! The registry owns the named adapters and resolves a model name to one of
//! them: explicit prefix rules from the configuration first, then a name
//! heuristic. It is shared through an `Arc` and safe for concurrent use.

use crate::core::config::{AppConfig, RouteRule};
use crate::core::error::{ProviderError, RoutingError};
use crate::providers::{gemini, openai, GeminiProvider, OpenAIProvider, Provider};
use crate::transformer::{merge_capabilities, ProviderCapabilities, ProviderInfo};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type ProviderMap = HashMap<String, Arc<dyn Provider>>;

pub struct ProviderRegistry {
    providers: RwLock<ProviderMap>,
    routes: Vec<RouteRule>,
}

impl ProviderRegistry {
    pub fn new(routes: Vec<RouteRule>) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            routes,
        }
    }

    /// Build the registry from configuration.
    ///
    /// A vendor is registered only when its API key is non-empty.
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        let registry = Self::new(config.routes.clone());
        let timeout = config.request_timeout();

        if config.openai.is_enabled() {
            let provider = OpenAIProvider::from_config(client.clone(), &config.openai, timeout);
            registry.insert(openai::PROVIDER_NAME, Arc::new(provider));
        } else {
            tracing::info!("OpenAI API key not set, provider disabled");
        }

        if config.gemini.is_enabled() {
            let provider = GeminiProvider::from_config(client, &config.gemini, timeout);
            registry.insert(gemini::PROVIDER_NAME, Arc::new(provider));
        } else {
            tracing::info!("Gemini API key not set, provider disabled");
        }

        registry
    }

    /// Resolve `model` to an adapter.
    ///
    /// The first route rule whose prefix matches decides; if it names an
    /// unregistered provider the lookup fails without trying the heuristic.
    pub fn route(&self, model: &str) -> Result<Arc<dyn Provider>, RoutingError> {
        let providers = self.providers.read();

        if let Some(rule) = self.routes.iter().find(|r| model.starts_with(&r.prefix)) {
            return providers
                .get(&rule.provider)
                .cloned()
                .ok_or_else(|| RoutingError::ProviderNotConfigured {
                    provider: rule.provider.clone(),
                    model: model.to_string(),
                });
        }

        match_by_name(&providers, model)
    }

    /// Resolve `model` using only the name heuristic.
    pub fn provider_for_model(&self, model: &str) -> Result<Arc<dyn Provider>, RoutingError> {
        match_by_name(&self.providers.read(), model)
    }

    /// Register `provider` under `name`, replacing any previous entry.
    pub fn register(&self, name: &str, provider: Option<Arc<dyn Provider>>) -> Result<(), RoutingError> {
        let provider = provider.ok_or_else(|| RoutingError::NilProvider(name.to_string()))?;
        self.insert(name, provider);
        Ok(())
    }

    fn insert(&self, name: &str, provider: Arc<dyn Provider>) {
        let replaced = self.providers.write().insert(name.to_string(), provider).is_some();
        tracing::debug!(provider = name, replaced, "Provider registered");
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.read().get(name).cloned()
    }

    /// Info of every registered adapter, sorted by name.
    pub fn list(&self) -> Vec<ProviderInfo> {
        let providers = self.providers.read();
        let mut infos: Vec<ProviderInfo> = providers.values().map(|p| p.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Merged capabilities of every registered adapter.
    pub fn capabilities(&self) -> ProviderCapabilities {
        let caps: Vec<ProviderCapabilities> = {
            let providers = self.providers.read();
            let mut entries: Vec<_> = providers.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries.into_iter().map(|(_, p)| p.capabilities()).collect()
        };
        merge_capabilities(&caps)
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    pub fn routes(&self) -> &[RouteRule] {
        &self.routes
    }

    /// Close every adapter, in name order.
    ///
    /// Every adapter is visited even when one fails; the last failure is
    /// returned.
    pub async fn close_all(&self) -> Result<(), ProviderError> {
        let snapshot: Vec<(String, Arc<dyn Provider>)> = {
            let providers = self.providers.read();
            let mut entries: Vec<_> = providers
                .iter()
                .map(|(name, p)| (name.clone(), Arc::clone(p)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        };

        let mut last_err = None;
        for (name, provider) in snapshot {
            if let Err(e) = provider.close().await {
                tracing::error!(provider = %name, error = %e, "Failed to close provider");
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Log the registered providers and route rules at startup.
    pub fn log_providers(&self) {
        let infos = self.list();
        tracing::info!("Starting gateway with {} providers", infos.len());
        for info in &infos {
            tracing::info!(
                "  - {}: {} models, streaming={}",
                info.name,
                info.capabilities.supported_models.len(),
                info.capabilities.supports_streaming
            );
        }
        for rule in &self.routes {
            tracing::info!("  route {}* -> {}", rule.prefix, rule.provider);
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

// Deliberately loose: "gpt" or "openai" anywhere in the name selects OpenAI.
fn is_openai_model(model: &str) -> bool {
    model.starts_with("gpt-")
        || model.starts_with("gpt4")
        || model.contains("gpt")
        || model.ends_with("-openai")
        || model.contains("openai")
}

fn is_gemini_model(model: &str) -> bool {
    model.contains("gemini")
}

fn match_by_name(providers: &ProviderMap, model: &str) -> Result<Arc<dyn Provider>, RoutingError> {
    if is_openai_model(model) {
        if let Some(p) = providers.get(openai::PROVIDER_NAME) {
            return Ok(Arc::clone(p));
        }
    }

    if is_gemini_model(model) {
        if let Some(p) = providers.get(gemini::PROVIDER_NAME) {
            return Ok(Arc::clone(p));
        }
    }

    Err(RoutingError::NoProviderForModel(model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VendorConfig;
    use crate::providers::ByteStream;
    use crate::transformer::{GenerateRequest, GenerateResponse};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        name: String,
        caps: ProviderCapabilities,
        fail_close: bool,
        closes: AtomicUsize,
    }

    impl StubProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                caps: ProviderCapabilities {
                    supports_streaming: true,
                    max_tokens: 10,
                    supported_models: vec![format!("{}-model", name)],
                    ..Default::default()
                },
                fail_close: false,
                closes: AtomicUsize::new(0),
            }
        }

        fn failing_close(mut self) -> Self {
            self.fail_close = true;
            self
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
            Err(ProviderError::Closed(self.name.clone()))
        }

        async fn stream_generate(&self, _request: &GenerateRequest) -> Result<ByteStream, ProviderError> {
            Err(ProviderError::Closed(self.name.clone()))
        }

        fn capabilities(&self) -> ProviderCapabilities {
            self.caps.clone()
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: self.name.clone(),
                version: "test".into(),
                capabilities: self.caps.clone(),
                status: "active".into(),
                last_updated: Utc::now(),
            }
        }

        async fn close(&self) -> Result<(), ProviderError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(ProviderError::Closed(self.name.clone()))
            } else {
                Ok(())
            }
        }
    }

    fn registry_with(routes: Vec<RouteRule>, names: &[&str]) -> ProviderRegistry {
        let registry = ProviderRegistry::new(routes);
        for name in names {
            registry
                .register(name, Some(Arc::new(StubProvider::new(name))))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_rule_takes_precedence_over_heuristic() {
        let registry = registry_with(
            vec![RouteRule::new("gpt-", "gemini")],
            &["openai", "gemini"],
        );
        assert_eq!(registry.route("gpt-4").unwrap().name(), "gemini");
    }

    #[test]
    fn test_route_with_vendor_prefix_rules() {
        let registry = registry_with(
            vec![
                RouteRule::new("gpt-", "openai"),
                RouteRule::new("gemini-", "gemini"),
            ],
            &["openai", "gemini"],
        );
        assert_eq!(registry.route("gpt-4").unwrap().name(), "openai");
        assert_eq!(registry.route("gemini-pro").unwrap().name(), "gemini");
        assert_eq!(
            registry.route("unknown-model").err(),
            Some(RoutingError::NoProviderForModel("unknown-model".into()))
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let registry = registry_with(
            vec![
                RouteRule::new("gpt-4", "gemini"),
                RouteRule::new("gpt-", "openai"),
            ],
            &["openai", "gemini"],
        );
        assert_eq!(registry.route("gpt-4o").unwrap().name(), "gemini");
        assert_eq!(registry.route("gpt-3.5-turbo").unwrap().name(), "openai");
    }

    #[test]
    fn test_matched_rule_without_provider_does_not_fall_through() {
        let registry = registry_with(vec![RouteRule::new("gpt-", "azure")], &["openai"]);
        let err = registry.route("gpt-4").err().unwrap();
        assert_eq!(
            err,
            RoutingError::ProviderNotConfigured {
                provider: "azure".into(),
                model: "gpt-4".into()
            }
        );
    }

    #[test]
    fn test_heuristic_fallback() {
        let registry = registry_with(vec![], &["openai", "gemini"]);

        assert_eq!(registry.route("gpt-4").unwrap().name(), "openai");
        assert_eq!(registry.route("gpt4all").unwrap().name(), "openai");
        assert_eq!(registry.route("my-gpt-clone").unwrap().name(), "openai");
        assert_eq!(registry.route("local-openai").unwrap().name(), "openai");
        assert_eq!(registry.route("gemini-1.5-pro").unwrap().name(), "gemini");
        assert_eq!(registry.route("tuned-gemini").unwrap().name(), "gemini");
        assert_eq!(
            registry.route("claude-3").err(),
            Some(RoutingError::NoProviderForModel("claude-3".into()))
        );
    }

    #[test]
    fn test_heuristic_skips_unregistered_vendor() {
        let registry = registry_with(vec![], &["gemini"]);
        assert!(matches!(
            registry.route("gpt-4"),
            Err(RoutingError::NoProviderForModel(_))
        ));
        // Both hints present; only Gemini is available
        assert_eq!(registry.provider_for_model("gpt-on-gemini").unwrap().name(), "gemini");
    }

    #[test]
    fn test_routing_is_deterministic() {
        let registry = registry_with(
            vec![RouteRule::new("gemini-", "gemini")],
            &["openai", "gemini"],
        );
        for _ in 0..100 {
            assert_eq!(registry.route("gemini-pro").unwrap().name(), "gemini");
            assert_eq!(registry.route("gpt-4o").unwrap().name(), "openai");
        }
    }

    #[test]
    fn test_register_nil_provider() {
        let registry = ProviderRegistry::default();
        assert_eq!(
            registry.register("openai", None),
            Err(RoutingError::NilProvider("openai".into()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_overwrites() {
        let registry = registry_with(vec![], &["openai"]);
        registry
            .register("openai", Some(Arc::new(StubProvider::new("replacement"))))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("openai").unwrap().name(), "replacement");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = registry_with(vec![], &["zeta", "alpha", "mid"]);
        let names: Vec<String> = registry.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_capabilities_are_merged() {
        let registry = registry_with(vec![], &["b", "a"]);
        let caps = registry.capabilities();
        assert!(caps.supports_streaming);
        assert_eq!(caps.max_tokens, 10);
        assert_eq!(caps.supported_models, vec!["a-model", "b-model"]);

        assert_eq!(ProviderRegistry::default().capabilities(), ProviderCapabilities::default());
    }

    #[tokio::test]
    async fn test_close_all_visits_every_provider() {
        let registry = ProviderRegistry::default();
        let a = Arc::new(StubProvider::new("a").failing_close());
        let b = Arc::new(StubProvider::new("b"));
        let c = Arc::new(StubProvider::new("c").failing_close());
        registry.register("a", Some(a.clone())).unwrap();
        registry.register("b", Some(b.clone())).unwrap();
        registry.register("c", Some(c.clone())).unwrap();

        let err = registry.close_all().await.unwrap_err();

        assert!(matches!(err, ProviderError::Closed(ref name) if name == "c"));
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
        assert_eq!(c.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config_registers_only_keyed_vendors() {
        let config = AppConfig {
            openai: VendorConfig {
                api_key: "sk-test".into(),
                ..Default::default()
            },
            routes: vec![RouteRule::new("gpt-", "openai")],
            ..Default::default()
        };

        let registry = ProviderRegistry::from_config(&config, reqwest::Client::new());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("openai").is_some());
        assert!(registry.get("gemini").is_none());
        assert_eq!(registry.routes().len(), 1);
    }
}
