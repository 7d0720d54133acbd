//! The hook through which service collaborators attach handlers.

use core::future::Future;
use tonic::service::RoutesBuilder;

/// Attaches gRPC services to the server before it starts accepting.
///
/// [`register`](Register::register) is called exactly once per run, on the
/// runner's task, and must only add services: it must not block or start I/O.
/// [`on_shutdown`](Register::on_shutdown) runs after shutdown has been
/// signalled and before in-flight calls are drained.
///
/// Any `Fn(&mut RoutesBuilder)` closure is a `Register` with a no-op shutdown
/// hook.
pub trait Register {
    fn register(&self, routes: &mut RoutesBuilder);

    fn on_shutdown(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

impl<F> Register for F
where
    F: Fn(&mut RoutesBuilder),
{
    fn register(&self, routes: &mut RoutesBuilder) {
        self(routes);
    }
}
