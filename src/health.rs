//! Liveness/readiness aggregation for `/health` and `/ready` (spec.md §2,
//! §4.4). Dropped from the distilled spec's §4 subsections but named in
//! its component table; supplemented here as a thin view over the
//! `ShutdownCoordinator`'s own state rather than a separate source of
//! truth.

use std::sync::Arc;

use serde::Serialize;

use crate::shutdown::ShutdownCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    ShuttingDown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub in_flight: usize,
}

#[derive(Clone)]
pub struct HealthSurface {
    shutdown: Arc<ShutdownCoordinator>,
}

impl HealthSurface {
    pub fn new(shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self { shutdown }
    }

    /// The underlying coordinator, so transports can track in-flight
    /// requests against the same instance this surface reports on.
    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Liveness: the process is up and able to answer at all. Always `Ok`
    /// unless the process is far enough into shutdown to refuse requests.
    pub fn liveness(&self) -> HealthReport {
        self.report()
    }

    /// Readiness: should a load balancer still route traffic here.
    pub fn readiness(&self) -> HealthReport {
        self.report()
    }

    fn report(&self) -> HealthReport {
        let status = if self.shutdown.is_shutting_down() {
            Status::ShuttingDown
        } else {
            Status::Ok
        };
        HealthReport {
            status,
            in_flight: self.shutdown.in_flight_count(),
        }
    }
}
