//! HTTP server and graceful shutdown.
//!
//! Two ways to run a [`Router`]:
//!
//! - [`Server::serve`] blocks until SIGTERM or Ctrl-C, then drains in-flight
//!   connections and returns. This is what `main` wants.
//! - [`Server::listen`] binds, spawns the accept loop and hands back a
//!   [`ServerHandle`] as soon as the socket is ready. [`ServerHandle::close`]
//!   stops accepting and drains. This is what tests and embedders want.
//!
//! Both share the same accept loop: stop accepting on shutdown, let every
//! connection task finish, return.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::error::Error;
use crate::request::{Request, TransportBody};
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`).
    ///
    /// ```rust
    /// use enplex::Server;
    /// let server = Server::bind("127.0.0.1:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse()
            .map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        Ok(Self { addr })
    }

    /// All interfaces on `port`. Port `0` picks a free port.
    pub fn port(port: u16) -> Self {
        Self { addr: SocketAddr::from(([0, 0, 0, 0], port)) }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::bind(&config.server.addr)
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains and returns.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "enplex listening");
        run(listener, Arc::new(router), shutdown_signal()).await;
        Ok(())
    }

    /// Binds and starts serving in the background. Returning `Ok` means the
    /// socket is bound and accepting.
    pub async fn listen(self, router: Router) -> Result<ServerHandle, Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "enplex listening");

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(run(listener, Arc::new(router), async move {
            // A dropped handle detaches the server instead of stopping it.
            if stop_rx.await.is_err() {
                std::future::pending::<()>().await;
            }
        }));

        Ok(ServerHandle { local_addr, stop: Some(stop_tx), task })
    }
}

/// Control over a server started with [`Server::listen`].
///
/// Only [`close`](Self::close) stops the server. Dropping the handle leaves
/// it running in the background for the rest of the runtime's life.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address, with the real port when `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for in-flight ones to finish.
    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("server task ended abnormally: {e}");
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn run(listener: TcpListener, router: Arc<Router>, shutdown: impl Future<Output = ()>) {
    // JoinSet tracks every spawned connection task so we can wait for
    // them all to finish during graceful shutdown.
    let mut tasks = tokio::task::JoinSet::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Check shutdown first so a stop request wins over queued accepts.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown requested, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let router = Arc::clone(&router);
                let io = TokioIo::new(stream);

                let mut stop = stop_rx.clone();

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let router = Arc::clone(&router);
                        async move { dispatch(router, req, remote_addr).await }
                    });

                    // `auto::Builder` handles both HTTP/1.1 and HTTP/2.
                    let builder = ConnBuilder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(io, svc);
                    tokio::pin!(conn);

                    let result = tokio::select! {
                        res = conn.as_mut() => res,
                        _ = stop.changed() => {
                            // Finish the in-flight request, then close idle keep-alives.
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = result {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    let _ = stop_tx.send(true);
    while tasks.join_next().await.is_some() {}
    info!("enplex stopped");
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Bridges hyper to the router. Every failure becomes a response, so hyper
/// never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<TransportBody>, Infallible> {
    let req = Request::from_http(req).with_remote_addr(remote_addr);
    Ok(router.handle(req).await.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). Only Ctrl-C on Windows.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
