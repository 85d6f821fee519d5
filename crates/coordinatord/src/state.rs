//! Shared application state: every cooperating subsystem a handler needs,
//! composed the way the teacher's `AppState` wraps its connection pool.

use std::sync::Arc;

use std::time::Duration;

use arc_swap::ArcSwap;
use coord_acl::{FilterRule, Policy};
use coord_crypto::Keypair;
use coord_store::Store;
use openidconnect::core::CoreClient;

use crate::auth::AuthConfig;
use crate::broadcast::ChangeBroadcaster;
use crate::cache::RegistrationCache;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub server_keys: Arc<Keypair>,
    pub registration_cache: Arc<RegistrationCache>,
    /// CSRF-state → pending-registration entries for the OIDC hand-off
    /// (spec §11), separate from `registration_cache` since its entries are
    /// strictly single-use and live only for the length of the IdP redirect.
    pub oidc_state_cache: Arc<RegistrationCache>,
    pub oidc_client: Option<Arc<CoreClient>>,
    pub broadcaster: Arc<ChangeBroadcaster>,
    pub acl_policy: Arc<ArcSwap<Policy>>,
    pub acl_rules: Arc<ArcSwap<Vec<FilterRule>>>,
    pub config: Arc<AppConfig>,
    pub auth_config: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        store: Store,
        server_keys: Keypair,
        config: AppConfig,
        auth_config: AuthConfig,
        initial_policy: Policy,
        initial_rules: Vec<FilterRule>,
        oidc_client: Option<CoreClient>,
    ) -> Self {
        Self {
            store,
            server_keys: Arc::new(server_keys),
            registration_cache: Arc::new(RegistrationCache::new(config.timing.registration_cache_ttl)),
            oidc_state_cache: Arc::new(RegistrationCache::new(Duration::from_secs(10 * 60))),
            oidc_client: oidc_client.map(Arc::new),
            broadcaster: Arc::new(ChangeBroadcaster::new()),
            acl_policy: Arc::new(ArcSwap::from_pointee(initial_policy)),
            acl_rules: Arc::new(ArcSwap::from_pointee(initial_rules)),
            config: Arc::new(config),
            auth_config: Arc::new(auth_config),
        }
    }

    /// Recompile and hot-swap the ACL policy (spec §9 "ACL policy
    /// hot-swap"). On failure the caller retains the previously compiled
    /// rules, since the swap only happens after a successful compile.
    pub async fn reload_acl(&self, raw_policy: &str) -> Result<(), crate::error::ApiError> {
        let policy = Policy::parse(raw_policy)?;
        let nodes = self.store.nodes.list_all().await?;
        let views = crate::acl_views::nodes_to_views(&self.store, &nodes).await?;
        let rules = coord_acl::compile(&policy, &views)?;
        self.acl_policy.store(Arc::new(policy));
        self.acl_rules.store(Arc::new(rules));
        self.broadcaster.advance_epoch();
        Ok(())
    }
}
