//! Provider registry: lazily instantiates and caches provider singletons
//! by name, and disposes them on shutdown.

use std::sync::Arc;

use tokio::sync::Mutex;

use lr_config::Settings;
use lr_types::Provider as ProviderKind;

use crate::{bedrock::BedrockProvider, openai::OpenAIProvider, Provider};

#[derive(Default)]
pub struct ProviderRegistry {
    openai: Mutex<Option<Arc<dyn Provider>>>,
    bedrock: Mutex<Option<Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or lazily create the singleton for `kind`.
    pub async fn get(&self, kind: ProviderKind, settings: &Settings) -> Arc<dyn Provider> {
        match kind {
            ProviderKind::Openai => {
                let mut slot = self.openai.lock().await;
                if let Some(existing) = slot.as_ref() {
                    return existing.clone();
                }
                let provider: Arc<dyn Provider> = Arc::new(OpenAIProvider::new(
                    settings.upstream_base_url.clone(),
                    settings.upstream_api_key.clone(),
                ));
                *slot = Some(provider.clone());
                provider
            }
            ProviderKind::Bedrock => {
                let mut slot = self.bedrock.lock().await;
                if let Some(existing) = slot.as_ref() {
                    return existing.clone();
                }
                let provider: Arc<dyn Provider> = Arc::new(BedrockProvider::from_env(&settings.aws_region).await);
                *slot = Some(provider.clone());
                provider
            }
        }
    }

    /// Dispose every instantiated provider. Invoked from the gateway's
    /// shutdown hook.
    pub async fn close(&self) {
        if let Some(p) = self.openai.lock().await.take() {
            p.close().await;
        }
        if let Some(p) = self.bedrock.lock().await.take() {
            p.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_provider_kind_returns_the_same_singleton() {
        let registry = ProviderRegistry::new();
        let settings = Settings::for_test();
        let a = registry.get(ProviderKind::Openai, &settings).await;
        let b = registry.get(ProviderKind::Openai, &settings).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn close_clears_cached_instances() {
        let registry = ProviderRegistry::new();
        let settings = Settings::for_test();
        let _ = registry.get(ProviderKind::Openai, &settings).await;
        registry.close().await;
        assert!(registry.openai.lock().await.is_none());
    }
}
