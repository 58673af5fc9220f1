use dioxus::prelude::*;
use std::sync::Arc;

mod components;
mod config;
mod context;
mod farming;
mod ledger;
mod rpc;
mod storage;

use components::*;
use config::AppConfig;
use context::WalletContext;
use farming::{ActionSubmitter, BridgeSubmitter, PositionSource, SubgraphClient};
use rpc::ReceiptClient;

/// External collaborators shared by the dashboard components
pub struct FarmingServices {
    pub submitter: Arc<dyn ActionSubmitter>,
    pub source: Arc<dyn PositionSource>,
    pub receipts: ReceiptClient,
    pub receipt_poll_ms: u64,
}

impl FarmingServices {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            submitter: Arc::new(BridgeSubmitter::new(&config.bridge_url)),
            source: Arc::new(SubgraphClient::new(&config.subgraph_url)),
            receipts: ReceiptClient::new(&config.rpc_url),
            receipt_poll_ms: config.receipt_poll_ms,
        }
    }
}

#[derive(Debug, Clone, Routable, PartialEq)]
#[rustfmt::skip]
enum Route {
    #[route("/")]
    Farms {},
}

fn main() {
    dioxus::launch(App);
}

#[component]
fn App() -> Element {
    let config = use_hook(AppConfig::from_env);
    let services_config = config.clone();
    use_context_provider(move || Arc::new(FarmingServices::from_config(&services_config)));
    use_context_provider(move || config);

    rsx! {
        Router::<Route> {}
    }
}

#[component]
fn Farms() -> Element {
    let config = use_context::<AppConfig>();

    if !config.is_valid() {
        log::error!("Invalid configuration: {:?}", config);
        return rsx! {
            div { class: "error-message", "Unsupported network configuration" }
        };
    }

    let Some(account) = config.account.clone() else {
        return rsx! {
            div { class: "empty-mock", "Connect a wallet to see your farms" }
        };
    };

    match WalletContext::new(&account, config.chain_id) {
        Ok(ctx) => rsx! {
            h1 { class: "page-title", "My farms" }
            StakerMyStakes { ctx: ctx }
        },
        Err(e) => rsx! {
            div { class: "error-message", "{e}" }
        },
    }
}
