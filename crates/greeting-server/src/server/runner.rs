//! Listener ownership and the serving lifecycle.
//!
//! A run goes through these steps, each finishing before the next starts:
//!
//! 1. bind the TCP listener ([`ServerRunner::bind`]),
//! 2. let the [`Register`] collaborator attach its services,
//! 3. start the signal listener, then spawn the serving task with
//!    [`LoggingLayer`] around every route,
//! 4. wait for the [`Shutdown`] coordinator to fire,
//! 5. run the collaborator's shutdown hook, then stop the server gracefully:
//!    no new calls are accepted and in-flight calls run to completion,
//! 6. join the serving task, which drops the listener.
//!
//! If the serving task stops early for any reason, a panic included, the
//! coordinator fires and the same shutdown sequence runs.
//!
//! The graceful stop has no deadline of its own. A second termination signal
//! forces it: the serving task is aborted and [`Error::Forced`] is returned.

use super::{
    error::{Error, Result},
    interceptor::LoggingLayer,
    register::Register,
    shutdown::{Shutdown, ShutdownTrigger},
    signals::spawn_signal_listener,
};
use futures::Stream;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::RoutesBuilder;
use tonic::transport::{Server, server::Connected};

/// Expands a `:port` address to all IPv4 interfaces. Other forms are kept.
pub fn resolve_bind_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_owned(),
    }
}

/// A bound listener waiting to serve.
#[derive(Debug)]
pub struct ServerRunner {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ServerRunner {
    /// Opens the TCP listener for `addr` (`host:port` or `:port`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is invalid or cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self> {
        let bind_err = |source| Error::Bind {
            addr: addr.to_owned(),
            source,
        };

        let listener = TcpListener::bind(resolve_bind_addr(addr))
            .await
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        tracing::debug!(%local_addr, "Created tcp listener");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address the listener is actually bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Registers services and serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serve`] or [`Error::ServeTask`] if serving failed and
    /// [`Error::Forced`] if the graceful stop was forced.
    pub async fn serve<R>(self, registrar: &R, shutdown: Shutdown) -> Result<()>
    where
        R: Register + Sync,
    {
        let Self {
            listener,
            local_addr,
        } = self;

        serve_incoming(
            TcpListenerStream::new(listener),
            Some(local_addr),
            registrar,
            shutdown,
        )
        .await
    }
}

/// Binds `addr` and serves until `shutdown` fires.
///
/// # Errors
///
/// See [`ServerRunner::bind`] and [`ServerRunner::serve`].
pub async fn run<R>(addr: &str, registrar: &R, shutdown: Shutdown) -> Result<()>
where
    R: Register + Sync,
{
    ServerRunner::bind(addr)
        .await?
        .serve(registrar, shutdown)
        .await
}

pub(crate) async fn serve_incoming<I, IO, IE, R>(
    incoming: I,
    local_addr: Option<SocketAddr>,
    registrar: &R,
    shutdown: Shutdown,
) -> Result<()>
where
    I: Stream<Item = core::result::Result<IO, IE>> + Send + 'static,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError> + Send + 'static,
    R: Register + Sync,
{
    // Nothing is spawned until registration returns; a panic here drops
    // `incoming` and with it the listener.
    let mut routes = RoutesBuilder::default();
    registrar.register(&mut routes);

    let router = Server::builder()
        .layer(LoggingLayer::new())
        .add_routes(routes.routes());

    let signal_task = spawn_signal_listener(shutdown.clone());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut serve_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match local_addr {
                Some(addr) => tracing::info!(%addr, "Server listening..."),
                None => tracing::info!("Server listening..."),
            }

            // A dropped sender stops the server just like an explicit stop.
            let stop = async move {
                let _ = stop_rx.await;
            };
            let result = router.serve_with_incoming_shutdown(incoming, stop).await;

            match &result {
                Ok(()) => {
                    shutdown.trigger(ShutdownTrigger::ServeExited);
                }
                Err(e) => {
                    tracing::error!(error = %e, "gRPC server failed");
                    shutdown.trigger(ShutdownTrigger::ServeFailed);
                }
            }
            result
        }
    });

    // A panicking serving task never reaches its own trigger.
    let early_exit = tokio::select! {
        () = shutdown.fired() => None,
        joined = &mut serve_task => {
            if let Err(e) = &joined {
                tracing::error!(error = %e, "gRPC server task failed");
                shutdown.trigger(ShutdownTrigger::ServeFailed);
            }
            Some(joined)
        }
    };
    tracing::warn!("Server shutting down gracefully...");

    let drain = async {
        registrar.on_shutdown().await;
        // The server may already be gone if it stopped on its own.
        let _ = stop_tx.send(());

        match early_exit {
            Some(joined) => joined,
            None => (&mut serve_task).await,
        }
    };
    let drained = tokio::select! {
        served = drain => Some(served),
        () = shutdown.forced() => None,
    };
    signal_task.abort();

    let Some(served) = drained else {
        // Open connections are dropped with the serving task.
        serve_task.abort();
        return Err(Error::Forced);
    };

    served??;
    tracing::debug!("Listener released");
    Ok(())
}
