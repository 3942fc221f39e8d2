//! TLS material and the TLS accept loop shared by all listeners.
//!
//! N32 and SBI listeners require and verify a client certificate against the
//! configured CA; the optional Nsepp listener only authenticates itself.
//! Every request on a connection that presented a verified chain carries a
//! [`PeerCertificates`] extension, which is how handlers (the forwarding proxy
//! in particular) learn that mutual authentication took place.

use crate::error::TlsError;
use axum::Router;
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use sepp_kernel::settings::TlsFiles;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::Service;
use tracing::{debug, info, warn};

const ALPN_H2: &[u8] = b"h2";
const ALPN_HTTP11: &[u8] = b"http/1.1";

/// TCP plus TLS setup budget for outbound connections.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outer bound on any outbound request made with [`ClientTlsMaterial::http_client`].
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed `accept` (fd exhaustion and the like) before retrying.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────────────────
// Material
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed server identity plus the CA used to verify clients.
#[derive(Debug)]
pub struct TlsMaterial {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
    pub client_roots: Option<Arc<RootCertStore>>,
}

impl TlsMaterial {
    /// Load a certificate chain and key, and the client CA when `ca` is given.
    pub fn load(cert: &str, key: &str, ca: Option<&str>) -> Result<Self, TlsError> {
        let certs = load_certs(cert)?;
        let key_pem = read_file(key)?;
        let key = PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| TlsError::Pem {
            path: key.to_string(),
            message: e.to_string(),
        })?;

        let client_roots = match ca.filter(|ca| !ca.is_empty()) {
            Some(ca) => Some(Arc::new(load_roots(ca)?)),
            None => None,
        };

        Ok(Self {
            certs,
            key,
            client_roots,
        })
    }

    /// Listener that verifies clients against `files.ca`.
    pub fn from_files(files: &TlsFiles) -> Result<Self, TlsError> {
        Self::load(&files.cert, &files.key, Some(&files.ca))
    }

    /// Listener that does not ask for client certificates.
    pub fn server_only(files: &TlsFiles) -> Result<Self, TlsError> {
        Self::load(&files.cert, &files.key, None)
    }
}

/// Client identity presented to the peer, kept as PEM for `reqwest`.
#[derive(Clone)]
pub struct ClientTlsMaterial {
    identity_pem: Vec<u8>,
    ca_pem: Vec<u8>,
}

impl std::fmt::Debug for ClientTlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTlsMaterial").finish_non_exhaustive()
    }
}

impl ClientTlsMaterial {
    pub fn load(files: &TlsFiles) -> Result<Self, TlsError> {
        // Parse up front so a bad file fails startup, not the first request.
        load_certs(&files.cert)?;
        load_roots(&files.ca)?;

        let mut identity_pem = read_file(&files.cert)?;
        let key_pem = read_file(&files.key)?;
        PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| TlsError::Pem {
            path: files.key.clone(),
            message: e.to_string(),
        })?;
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(&key_pem);

        Ok(Self {
            identity_pem,
            ca_pem: read_file(&files.ca)?,
        })
    }

    /// HTTP client that presents this identity and trusts only the CA.
    pub fn http_client(&self) -> Result<reqwest::Client, TlsError> {
        let identity = reqwest::Identity::from_pem(&self.identity_pem)
            .map_err(|e| TlsError::ClientIdentity(e.to_string()))?;
        let ca = reqwest::Certificate::from_pem(&self.ca_pem)
            .map_err(|e| TlsError::ClientIdentity(e.to_string()))?;

        reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TlsError::ClientIdentity(e.to_string()))
    }
}

fn read_file(path: &str) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_string(),
        source,
    })
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read_file(path)?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Pem {
            path: path.to_string(),
            message: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_string()));
    }
    Ok(certs)
}

fn load_roots(path: &str) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

// ─────────────────────────────────────────────────────────────────────────────
// Server configs
// ─────────────────────────────────────────────────────────────────────────────

/// Server config that requires a client certificate chaining to the CA.
pub fn mutual_tls_server_config(material: &TlsMaterial) -> Result<Arc<ServerConfig>, TlsError> {
    let roots = material
        .client_roots
        .clone()
        .ok_or_else(|| TlsError::Verifier("no client CA configured".to_string()))?;
    let provider = provider();

    let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider.clone())
        .build()
        .map_err(|e| TlsError::Verifier(e.to_string()))?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(material.certs.clone(), material.key.clone_key())?;
    config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()];
    Ok(Arc::new(config))
}

/// Server config without client authentication.
pub fn server_tls_config(material: &TlsMaterial) -> Result<Arc<ServerConfig>, TlsError> {
    let mut config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(material.certs.clone(), material.key.clone_key())?;
    config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()];
    Ok(Arc::new(config))
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept loop
// ─────────────────────────────────────────────────────────────────────────────

/// Verified client chain of the connection a request arrived on.
#[derive(Debug, Clone)]
pub struct PeerCertificates(pub Arc<Vec<CertificateDer<'static>>>);

impl PeerCertificates {
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.0.first()
    }
}

/// Serve `router` over TLS until `cancel` fires.
///
/// On cancellation the listener stops accepting, every live connection is
/// asked to shut down gracefully, and in-flight work gets up to `grace` to
/// finish.
pub async fn serve_tls(
    name: &'static str,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
    cancel: CancellationToken,
    grace: Duration,
) {
    let tracker = TaskTracker::new();
    if let Ok(addr) = listener.local_addr() {
        info!(listener = name, %addr, "listening");
    }

    let listener = &listener;
    while let Some((stream, remote)) =
        accept_next(name, move || listener.accept(), &cancel, ACCEPT_ERROR_BACKOFF).await
    {
        tracker.spawn(serve_connection(
            name,
            stream,
            remote,
            acceptor.clone(),
            router.clone(),
            cancel.clone(),
        ));
    }

    tracker.close();
    info!(listener = name, connections = tracker.len(), "draining connections");
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        warn!(listener = name, ?grace, "grace period elapsed with connections still open");
    }
    info!(listener = name, "stopped");
}

/// Next accepted item, or `None` once cancelled.  Failed accepts are logged
/// and retried after `backoff`.
async fn accept_next<T, F, Fut>(
    name: &'static str,
    mut accept: F,
    cancel: &CancellationToken,
    backoff: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            accepted = accept() => match accepted {
                Ok(item) => return Some(item),
                Err(e) => warn!(listener = name, error = %e, ?backoff, "accept failed"),
            },
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

async fn serve_connection(
    name: &'static str,
    stream: tokio::net::TcpStream,
    remote: SocketAddr,
    acceptor: TlsAcceptor,
    router: Router,
    cancel: CancellationToken,
) {
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(e) => {
            debug!(listener = name, %remote, error = %e, "TLS handshake failed");
            return;
        }
    };

    let peer = tls
        .get_ref()
        .1
        .peer_certificates()
        .filter(|chain| !chain.is_empty())
        .map(|chain| PeerCertificates(Arc::new(chain.to_vec())));
    debug!(listener = name, %remote, client_cert = peer.is_some(), "connection established");

    let service = hyper::service::service_fn(move |mut req: Request<Incoming>| {
        if let Some(peer) = &peer {
            req.extensions_mut().insert(peer.clone());
        }
        router.clone().call(req)
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(tls), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!(listener = name, %remote, error = %e, "connection closed with error");
                }
                break;
            }
            _ = cancel.cancelled(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}
