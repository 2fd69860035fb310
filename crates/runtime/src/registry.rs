//! Session registry: connects tool providers and routes calls to them.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::model::{ToolSpec, ToolUse};
use crate::tools::{
    Connector, ProviderConfig, ProviderError, ProviderSession, ToolError, ToolHost,
};
use crate::{Error, Result};

/// Default bound on a single tool round-trip.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Registry tuning.
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// How long one tool call may take before it fails with a timeout.
    pub tool_timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// A connected provider and the tools it advertised.
struct Provider<S> {
    name: String,
    session: S,
    tools: Vec<ToolSpec>,
}

/// Owns every provider session and the tool-name routing table.
///
/// The catalog is rebuilt from scratch on every registration: providers in
/// registration order, tools in declaration order. When two providers
/// advertise the same name, the entry keeps its first position but takes
/// the later provider's descriptor, and calls route to the later provider.
pub struct SessionRegistry<C: Connector> {
    connector: C,
    options: RegistryOptions,
    providers: Vec<Provider<C::Session>>,
    catalog: Vec<ToolSpec>,
    routes: HashMap<String, usize>,
}

impl<C: Connector> SessionRegistry<C> {
    /// Create an empty registry.
    pub fn new(connector: C, options: RegistryOptions) -> Self {
        Self {
            connector,
            options,
            providers: Vec::new(),
            catalog: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Connect a provider, discover its tools, and merge them in.
    ///
    /// Returns `Ok(false)` when the provider failed and was skipped. A
    /// failing provider marked `required` is an error instead.
    pub async fn register(&mut self, config: &ProviderConfig) -> Result<bool> {
        let name = config.name();
        match self.acquire(config).await {
            Ok(provider) => {
                for tool in &provider.tools {
                    if let Some(&previous) = self.routes.get(&tool.name) {
                        warn!(
                            tool = %tool.name,
                            previous = %self.providers[previous].name,
                            provider = %name,
                            "tool name collision, later provider wins"
                        );
                    }
                }
                info!(provider = %name, tools = provider.tools.len(), "registered tool provider");
                self.providers.push(provider);
                self.rebuild();
                Ok(true)
            }
            Err(source) if config.required => Err(Error::ProviderUnavailable {
                name: name.to_string(),
                source,
            }),
            Err(source) => {
                warn!(provider = %name, error = %source, "skipping tool provider");
                Ok(false)
            }
        }
    }

    /// Register each config in order; returns how many came up.
    pub async fn register_all(&mut self, configs: &[ProviderConfig]) -> Result<usize> {
        let mut connected = 0;
        for config in configs {
            if self.register(config).await? {
                connected += 1;
            }
        }
        Ok(connected)
    }

    async fn acquire(
        &self,
        config: &ProviderConfig,
    ) -> std::result::Result<Provider<C::Session>, ProviderError> {
        let session = self.connector.connect(config).await?;
        match session.discover().await {
            Ok(tools) => Ok(Provider {
                name: config.name().to_string(),
                session,
                tools,
            }),
            Err(e) => {
                session.shutdown().await;
                Err(e)
            }
        }
    }

    fn rebuild(&mut self) {
        self.catalog.clear();
        self.routes.clear();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for (index, provider) in self.providers.iter().enumerate() {
            for tool in &provider.tools {
                match positions.get(tool.name.as_str()) {
                    Some(&position) => self.catalog[position] = tool.clone(),
                    None => {
                        positions.insert(&tool.name, self.catalog.len());
                        self.catalog.push(tool.clone());
                    }
                }
                self.routes.insert(tool.name.clone(), index);
            }
        }
    }

    /// The aggregated tool catalog handed to the model.
    pub fn catalog(&self) -> &[ToolSpec] {
        &self.catalog
    }

    /// Which provider a tool name routes to.
    pub fn route(&self, tool: &str) -> Option<&str> {
        self.routes
            .get(tool)
            .map(|&index| self.providers[index].name.as_str())
    }

    /// Connected providers, in registration order.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name.as_str())
    }

    /// Invoke a tool on the provider that owns it.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> std::result::Result<String, ToolError> {
        let index = *self
            .routes
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let provider = &self.providers[index];

        debug!(tool = %name, provider = %provider.name, "dispatching tool call");
        let limit = self.options.tool_timeout;
        match timeout(limit, provider.session.invoke(name, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(limit.as_millis() as u64)),
        }
    }

    /// Close every session, most recently registered first.
    pub async fn shutdown(mut self) {
        let providers = std::mem::take(&mut self.providers);
        for provider in providers.into_iter().rev() {
            debug!(provider = %provider.name, "shutting down tool provider");
            provider.session.shutdown().await;
        }
    }
}

impl<C: Connector> Drop for SessionRegistry<C> {
    fn drop(&mut self) {
        // Sessions release their processes on drop; keep the reverse order.
        while let Some(provider) = self.providers.pop() {
            debug!(provider = %provider.name, "dropping tool provider");
        }
    }
}

impl<C: Connector> ToolHost for SessionRegistry<C> {
    fn specs(&self) -> &[ToolSpec] {
        self.catalog()
    }

    async fn execute(&self, call: &ToolUse) -> std::result::Result<String, ToolError> {
        self.dispatch(&call.name, call.arguments.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, FakeProvider, provider};
    use serde_json::json;

    fn names(registry: &SessionRegistry<FakeConnector>) -> Vec<&str> {
        registry.catalog().iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn catalog_follows_registration_then_declaration_order() {
        let connector = FakeConnector::default()
            .with("research", FakeProvider::with_tools(&["search_papers", "extract_info"]))
            .with("fs", FakeProvider::with_tools(&["read_file"]));
        let mut registry = SessionRegistry::new(connector, RegistryOptions::default());

        registry.register(&provider("research")).await.unwrap();
        registry.register(&provider("fs")).await.unwrap();

        assert_eq!(names(&registry), ["search_papers", "extract_info", "read_file"]);
        assert_eq!(registry.providers().collect::<Vec<_>>(), ["research", "fs"]);
        assert_eq!(registry.route("read_file"), Some("fs"));
    }

    #[tokio::test]
    async fn later_provider_wins_name_collision() {
        let mut second = FakeProvider::with_tools(&["x", "y"]);
        second.tools[0].description = "second x".into();
        let connector = FakeConnector::default()
            .with("first", FakeProvider::with_tools(&["x", "w"]))
            .with("second", second);
        let mut registry = SessionRegistry::new(connector, RegistryOptions::default());

        registry.register(&provider("first")).await.unwrap();
        registry.register(&provider("second")).await.unwrap();

        assert_eq!(names(&registry), ["x", "w", "y"]);
        assert_eq!(registry.catalog()[0].description, "second x");
        assert_eq!(registry.route("x"), Some("second"));
        assert_eq!(registry.dispatch("x", Map::new()).await.unwrap(), "second:x");
        assert_eq!(registry.dispatch("w", Map::new()).await.unwrap(), "first:w");
    }

    #[tokio::test]
    async fn failed_provider_is_skipped() {
        let connector = FakeConnector::default()
            .with("broken", FakeProvider {
                fail_connect: true,
                ..FakeProvider::with_tools(&["nothing"])
            })
            .with("research", FakeProvider::with_tools(&["search_papers"]));
        let mut registry = SessionRegistry::new(connector, RegistryOptions::default());

        let connected = registry
            .register_all(&[provider("broken"), provider("missing"), provider("research")])
            .await
            .unwrap();

        assert_eq!(connected, 1);
        assert_eq!(names(&registry), ["search_papers"]);
        assert_eq!(registry.route("nothing"), None);
    }

    #[tokio::test]
    async fn failed_discovery_closes_the_session() {
        let connector = FakeConnector::default().with("flaky", FakeProvider {
            fail_discover: true,
            ..FakeProvider::with_tools(&["a"])
        });
        let mut registry = SessionRegistry::new(connector.clone(), RegistryOptions::default());

        assert!(!registry.register(&provider("flaky")).await.unwrap());
        assert!(registry.catalog().is_empty());
        assert_eq!(connector.events(), ["connect flaky", "shutdown flaky"]);
    }

    #[tokio::test]
    async fn required_provider_failure_is_an_error() {
        let connector = FakeConnector::default();
        let mut registry = SessionRegistry::new(connector, RegistryOptions::default());

        let err = registry
            .register(&provider("research").required())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable { ref name, .. } if name == "research"));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool() {
        let registry = SessionRegistry::new(FakeConnector::default(), RegistryOptions::default());
        let err = registry.dispatch("nope", Map::new()).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn dispatch_passes_arguments_and_errors_through() {
        let connector =
            FakeConnector::default().with("research", FakeProvider::with_tools(&["search_papers", "broken"]));
        let mut registry = SessionRegistry::new(connector, RegistryOptions::default());
        registry.register(&provider("research")).await.unwrap();

        let mut args = Map::new();
        args.insert("topic".into(), json!("llm"));
        assert_eq!(
            registry.dispatch("search_papers", args).await.unwrap(),
            r#"research:search_papers:{"topic":"llm"}"#
        );
        assert_eq!(
            registry.dispatch("broken", Map::new()).await.unwrap_err(),
            ToolError::Application("it broke".into())
        );
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let connector = FakeConnector::default().with("slow", FakeProvider {
            delay: Some(Duration::from_secs(5)),
            ..FakeProvider::with_tools(&["wait"])
        });
        let options = RegistryOptions {
            tool_timeout: Duration::from_millis(20),
        };
        let mut registry = SessionRegistry::new(connector, options);
        registry.register(&provider("slow")).await.unwrap();

        let err = registry.dispatch("wait", Map::new()).await.unwrap_err();
        assert_eq!(err, ToolError::Timeout(20));
    }

    #[tokio::test]
    async fn shutdown_runs_in_reverse_registration_order() {
        let connector = FakeConnector::default()
            .with("a", FakeProvider::with_tools(&["one"]))
            .with("b", FakeProvider::with_tools(&["two"]))
            .with("c", FakeProvider::with_tools(&["three"]));
        let mut registry = SessionRegistry::new(connector.clone(), RegistryOptions::default());
        registry
            .register_all(&[provider("a"), provider("b"), provider("c")])
            .await
            .unwrap();

        registry.shutdown().await;

        assert_eq!(
            connector.events(),
            ["connect a", "connect b", "connect c", "shutdown c", "shutdown b", "shutdown a"]
        );
    }
}
