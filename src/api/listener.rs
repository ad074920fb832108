//! HTTP listener
//!
//! Serves the gateway router over plain TCP or TLS (never both). TLS
//! material is loaded when the listener is built, so a missing or invalid
//! certificate is a startup failure rather than a runtime one.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::WebConfig;
use crate::error::{ConfigStoreError, ConfigStoreResult};

/// How long in-flight requests may run once a close is requested
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// The network listener of the gateway
pub struct Listener {
    addr: SocketAddr,
    tls: Option<RustlsConfig>,
    router: Router,
    handle: Handle,
    close: CancellationToken,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("addr", &self.addr)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl Listener {
    /// Resolve the listen address and load TLS material when enabled
    ///
    /// The socket itself is bound by [`Listener::serve`].
    pub async fn new(config: &WebConfig, router: Router) -> ConfigStoreResult<Self> {
        let addr = config.socket_addr()?;

        let tls = if config.tls {
            let cert_file = config.tls_cert_file.clone();
            let key_file = config.tls_key_file.clone();
            match RustlsConfig::from_pem_file(&cert_file, &key_file).await {
                Ok(tls) => Some(tls),
                Err(source) => {
                    tracing::error!(
                        cert_file = %cert_file,
                        key_file = %key_file,
                        error = %source,
                        "failed to load tls certificate"
                    );
                    return Err(ConfigStoreError::Tls {
                        cert_file,
                        key_file,
                        source,
                    });
                }
            }
        } else {
            None
        };

        Ok(Self {
            addr,
            tls,
            router,
            handle: Handle::new(),
            close: CancellationToken::new(),
        })
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Cancelling the token closes the listener gracefully
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Resolves to the bound address once serving, `None` if binding failed
    pub fn local_addr(&self) -> impl Future<Output = Option<SocketAddr>> + Send + 'static {
        let handle = self.handle.clone();
        async move { handle.listening().await }
    }

    /// Serve until closed or until the server fails
    pub async fn serve(self) -> io::Result<()> {
        let Listener {
            addr,
            tls,
            router,
            handle,
            close,
        } = self;

        let closer = {
            let handle = handle.clone();
            tokio::spawn(async move {
                close.cancelled().await;
                tracing::info!("closing http listener");
                handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
            })
        };

        tracing::info!(%addr, tls = tls.is_some(), "http listener starting");
        let app = router.into_make_service();
        let result = match tls {
            Some(tls) => {
                axum_server::bind_rustls(addr, tls)
                    .handle(handle)
                    .serve(app)
                    .await
            }
            None => axum_server::bind(addr).handle(handle).serve(app).await,
        };

        closer.abort();
        result
    }
}
