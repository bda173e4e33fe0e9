use crate::admission::AdmissionPolicy;
use crate::api::routes;
use crate::bridge::ChallengeBridge;
use crate::config::Shared;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: Shared,
    pub bridge: ChallengeBridge,
    pub admission: Arc<AdmissionPolicy>,
}

/// Serve the challenge API. Only call this once [`launch`][crate::dns::launch] has returned,
/// so every published token is answerable.
pub fn new(
    config: Shared,
    bridge: ChallengeBridge,
    admission: Arc<AdmissionPolicy>,
) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.api_bind_addr).serve(
        routes::new(AppState {
            config: config.clone(),
            bridge,
            admission,
        })
        .into_make_service_with_connect_info::<SocketAddr>(),
    )
}
