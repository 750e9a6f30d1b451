use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use helpdesk_core::{AccessToken, FieldCatalog, TicketLayout, TokenResource, TokenService};
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, RwLock};

use crate::{config::SharePointTarget, discovery, error::HelpdeskError, graph::GraphClient};

/// Snapshot of everything a ticket operation needs from Graph before it
/// can touch list items. Replaced wholesale on refresh.
#[derive(Debug)]
pub struct GraphContext {
    pub token: AccessToken,
    pub site_id: String,
    pub list_id: String,
    pub catalog: FieldCatalog,
    pub layout: TicketLayout,
    pub refreshed_at: OffsetDateTime,
}

impl GraphContext {
    pub fn is_fresh(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        self.refreshed_at
            .checked_add(ttl)
            .is_none_or(|deadline| deadline > now)
            && self.token.is_fresh(now)
    }
}

/// Process-wide context cache. Concurrent callers that find it stale wait
/// on a single refresh instead of each re-running discovery.
pub struct ContextStore {
    tokens: Arc<TokenService>,
    graph: GraphClient,
    target: SharePointTarget,
    ttl: Duration,
    current: RwLock<Option<Arc<GraphContext>>>,
    refresh_gate: Mutex<()>,
    refreshes: AtomicU64,
}

impl ContextStore {
    pub fn new(
        tokens: Arc<TokenService>,
        graph: GraphClient,
        target: SharePointTarget,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            tokens,
            graph,
            target,
            ttl: Duration::try_from(ttl).unwrap_or(Duration::MAX),
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn target(&self) -> &SharePointTarget {
        &self.target
    }

    pub async fn get_or_refresh(&self) -> Result<Arc<GraphContext>, HelpdeskError> {
        if let Some(context) = self.fresh_snapshot().await {
            return Ok(context);
        }

        let _gate = self.refresh_gate.lock().await;
        // another caller may have refreshed while we waited
        if let Some(context) = self.fresh_snapshot().await {
            return Ok(context);
        }

        let context = Arc::new(self.load().await?);
        *self.current.write().await = Some(context.clone());
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            site_id = %context.site_id,
            list_id = %context.list_id,
            columns = context.catalog.len(),
            "graph context refreshed"
        );
        Ok(context)
    }

    /// Drop the snapshot and its Graph token, e.g. after Graph answered 401.
    pub async fn invalidate(&self) {
        self.current.write().await.take();
        self.tokens.invalidate(&TokenResource::Graph);
    }

    /// Completed refreshes since start.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    async fn fresh_snapshot(&self) -> Option<Arc<GraphContext>> {
        let guard = self.current.read().await;
        guard
            .as_ref()
            .filter(|context| context.is_fresh(OffsetDateTime::now_utc(), self.ttl))
            .cloned()
    }

    async fn load(&self) -> Result<GraphContext, HelpdeskError> {
        let token = self.tokens.get_token(&TokenResource::Graph).await?;
        let target = &self.target;
        let site_id = discovery::resolve_site_id(
            &self.graph,
            &token.value,
            &target.hostname,
            &target.site_path,
        )
        .await?;
        let list_id =
            discovery::resolve_list_id(&self.graph, &token.value, &site_id, &target.list_name)
                .await?;
        let catalog =
            discovery::get_field_catalog(&self.graph, &token.value, &site_id, &list_id).await?;
        let layout = TicketLayout::resolve(&catalog);

        Ok(GraphContext {
            token,
            site_id,
            list_id,
            catalog,
            layout,
            refreshed_at: OffsetDateTime::now_utc(),
        })
    }
}
