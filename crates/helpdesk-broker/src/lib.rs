//! Helpdesk ticket broker: files, lists and resolves tickets kept in a
//! SharePoint list through Microsoft Graph.

pub mod attachments;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod http;
pub mod notify;
pub mod sequence;
pub mod store;
pub mod tickets;

use std::sync::Arc;

use helpdesk_core::TokenService;

use crate::{
    config::BrokerConfig,
    context::ContextStore,
    error::HelpdeskError,
    graph::GraphClient,
    http::{AppContext, SharedContext},
    tickets::{TicketService, TicketSettings},
};

/// Wire the token cache, Graph client, context store and orchestrator
/// from configuration. No network calls happen here.
pub fn build_context(config: &BrokerConfig) -> Result<SharedContext, HelpdeskError> {
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|err| HelpdeskError::Config(format!("http client: {err}")))?;

    let tokens = Arc::new(
        TokenService::new(config.credentials.clone(), http_client.clone())
            .with_login_base_url(config.login_base_url.clone()),
    );
    let graph = GraphClient::new(http_client, config.graph_base_url.clone());
    let context = Arc::new(ContextStore::new(
        tokens,
        graph.clone(),
        config.sharepoint.clone(),
        config.context_ttl,
    ));
    let tickets = TicketService::new(context, graph, TicketSettings::from_config(config));

    Ok(Arc::new(AppContext {
        tickets: Arc::new(tickets),
    }))
}
