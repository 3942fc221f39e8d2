//! Gateway wiring: listeners, routers and the handshake initiator.

use crate::context::SeppContext;
use crate::error::{SeppError, SeppResult};
use crate::handshake::{HandshakeInitiator, N32cClient, ResponderState, n32c_router};
use crate::proxy::{ForwardingProxy, MutualTlsRouteBuilder, sbi_router};
use crate::telescopic::{TopologyMapper, mapping_router};
use crate::tls::{
    ClientTlsMaterial, TlsMaterial, mutual_tls_server_config, serve_tls, server_tls_config,
};
use axum::Router;
use rustls::ServerConfig;
use sepp_kernel::settings::SeppConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// A fully initialised gateway, ready to bind.
///
/// Everything that can fail on bad configuration (PEM files, client
/// identity) fails in [`SeppServer::new`], before any socket is opened.
pub struct SeppServer {
    config: SeppConfig,
    ctx: Arc<SeppContext>,
    n32_tls: Arc<ServerConfig>,
    sbi_tls: Arc<ServerConfig>,
    nsepp_tls: Option<Arc<ServerConfig>>,
    client_tls: ClientTlsMaterial,
    initiator: Option<Arc<HandshakeInitiator>>,
}

impl SeppServer {
    pub fn new(config: SeppConfig) -> SeppResult<Self> {
        config.validate().map_err(sepp_kernel::config::ConfigError::from)?;

        let local = &config.sepp.local;
        let ctx = Arc::new(SeppContext::new(config.local_fqdn()));

        let n32_tls = mutual_tls_server_config(&TlsMaterial::from_files(&local.n32.tls)?)?;
        let sbi_tls = mutual_tls_server_config(&TlsMaterial::from_files(&local.sbi.tls)?)?;
        let nsepp_tls = match &local.nsepp {
            Some(nsepp) => Some(server_tls_config(&TlsMaterial::server_only(&nsepp.tls)?)?),
            None => None,
        };

        // Without a dedicated client identity the N32 identity is presented.
        let remote_tls = &config.sepp.remote.tls;
        let client_files = if remote_tls.cert.is_empty() {
            &local.n32.tls
        } else {
            remote_tls
        };
        let client_tls = ClientTlsMaterial::load(client_files)?;

        let initiator = match config.remote_url() {
            Some(url) => {
                let transport = N32cClient::with_mutual_tls(url, &client_tls)?;
                Some(Arc::new(HandshakeInitiator::new(
                    Arc::clone(&ctx),
                    Arc::new(transport),
                    config.supported_capabilities(),
                    config.retry_interval(),
                )))
            }
            None => None,
        };

        Ok(Self {
            config,
            ctx,
            n32_tls,
            sbi_tls,
            nsepp_tls,
            client_tls,
            initiator,
        })
    }

    pub fn context(&self) -> Arc<SeppContext> {
        Arc::clone(&self.ctx)
    }

    pub fn initiator(&self) -> Option<Arc<HandshakeInitiator>> {
        self.initiator.clone()
    }

    /// Router served on the N32 listener.
    pub fn n32_router(&self) -> Router {
        let responder = ResponderState::new(Arc::clone(&self.ctx), self.config.supported_capabilities());
        let mut router = n32c_router(responder);
        if self.nsepp_tls.is_none() {
            router = router.merge(mapping_router(TopologyMapper::new(Arc::clone(&self.ctx))));
        }
        router.layer(TraceLayer::new_for_http())
    }

    /// Router served on the SBI listener.
    pub fn sbi_router(&self) -> Router {
        let proxy = ForwardingProxy::new(
            Arc::clone(&self.ctx),
            MutualTlsRouteBuilder::new(self.client_tls.clone()),
        );
        sbi_router(Arc::new(proxy)).layer(TraceLayer::new_for_http())
    }

    /// Router served on the Nsepp listener, when one is configured.
    pub fn nsepp_router(&self) -> Option<Router> {
        self.nsepp_tls.as_ref().map(|_| {
            mapping_router(TopologyMapper::new(Arc::clone(&self.ctx)))
                .layer(TraceLayer::new_for_http())
        })
    }

    /// Bind every listener, serve until `cancel` fires, then drain.
    pub async fn run(self, cancel: CancellationToken) -> SeppResult<()> {
        let n32 = bind("N32", self.config.n32_addr()).await?;
        let sbi = bind("SBI", self.config.sbi_addr()).await?;
        let nsepp = match self.config.nsepp_addr() {
            Some(addr) => Some(bind("Nsepp", addr).await?),
            None => None,
        };

        let grace = self.config.shutdown_grace();
        let mut tasks = JoinSet::new();

        tasks.spawn(serve_tls(
            "N32",
            n32,
            TlsAcceptor::from(Arc::clone(&self.n32_tls)),
            self.n32_router(),
            cancel.clone(),
            grace,
        ));
        tasks.spawn(serve_tls(
            "SBI",
            sbi,
            TlsAcceptor::from(Arc::clone(&self.sbi_tls)),
            self.sbi_router(),
            cancel.clone(),
            grace,
        ));
        if let (Some(listener), Some(tls), Some(router)) =
            (nsepp, self.nsepp_tls.clone(), self.nsepp_router())
        {
            tasks.spawn(serve_tls(
                "Nsepp",
                listener,
                TlsAcceptor::from(tls),
                router,
                cancel.clone(),
                grace,
            ));
        }

        match self.initiator.clone() {
            Some(initiator) => {
                let cancel = cancel.clone();
                tasks.spawn(async move {
                    initiator.run(cancel).await;
                });
            }
            None => info!("no remote URL configured; running as responder only"),
        }

        info!(fqdn = %self.ctx.local_fqdn(), "SEPP started");

        let mut failed = None;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "gateway task failed");
                cancel.cancel();
                failed.get_or_insert(e.to_string());
            }
        }

        info!("SEPP stopped");
        match failed {
            Some(message) => Err(SeppError::Task("gateway", message)),
            None => Ok(()),
        }
    }
}

async fn bind(listener: &'static str, addr: String) -> SeppResult<TcpListener> {
    TcpListener::bind(&addr)
        .await
        .map_err(|source| SeppError::Bind {
            listener,
            addr,
            source,
        })
}
