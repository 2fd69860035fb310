//! Scoped startup and teardown of tool providers.

use tracing::{info, warn};

use crate::Result;
use crate::registry::{RegistryOptions, SessionRegistry};
use crate::tools::{Connector, ProviderConfig};

/// Bring up every configured provider, run `body` against the ready
/// registry, then tear all providers down in reverse order.
///
/// Teardown happens whatever `body` returns. If a `required` provider
/// fails during startup, the providers already connected are shut down
/// and the error is returned without running `body`. If `body` panics,
/// the registry's `Drop` releases the sessions.
pub async fn with_registry<C, T>(
    connector: C,
    options: RegistryOptions,
    configs: &[ProviderConfig],
    body: impl AsyncFnOnce(&SessionRegistry<C>) -> T,
) -> Result<T>
where
    C: Connector,
{
    let mut registry = SessionRegistry::new(connector, options);

    match registry.register_all(configs).await {
        Ok(connected) => {
            info!(
                connected,
                configured = configs.len(),
                tools = registry.catalog().len(),
                "tool providers ready"
            );
        }
        Err(e) => {
            warn!(error = %e, "aborting startup");
            registry.shutdown().await;
            return Err(e);
        }
    }

    let output = body(&registry).await;
    registry.shutdown().await;
    Ok(output)
}
