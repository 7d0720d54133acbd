//! Services attached by the binary.
//!
//! The server itself carries no business logic; everything it answers comes
//! from a [`Register`] implementation. [`HealthServices`] is the default set:
//! the standard `grpc.health.v1.Health` service.

use crate::server::register::Register;
use std::sync::OnceLock;
use tonic::service::RoutesBuilder;
use tonic_health::{ServingStatus, server::HealthReporter};

/// Registers the gRPC health service.
///
/// The overall server status (the empty service name) reports `SERVING`
/// while the server runs and flips to `NOT_SERVING` once shutdown starts, so
/// health-checking load balancers stop routing new calls while in-flight ones
/// drain.
#[derive(Default)]
pub struct HealthServices {
    reporter: OnceLock<HealthReporter>,
}

impl HealthServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reporter for the registered health service, once registered.
    pub fn reporter(&self) -> Option<&HealthReporter> {
        self.reporter.get()
    }
}

impl Register for HealthServices {
    fn register(&self, routes: &mut RoutesBuilder) {
        let (reporter, service) = tonic_health::server::health_reporter();
        routes.add_service(service);

        if self.reporter.set(reporter).is_err() {
            tracing::warn!("Health service registered more than once, keeping the first reporter");
        }
        tracing::debug!("Registered grpc.health.v1.Health");
    }

    fn on_shutdown(&self) -> impl Future<Output = ()> + Send {
        let reporter = self.reporter.get().cloned();
        async move {
            if let Some(reporter) = reporter {
                reporter
                    .set_service_status("", ServingStatus::NotServing)
                    .await;
                tracing::debug!("Health status set to NOT_SERVING");
            }
        }
    }
}
