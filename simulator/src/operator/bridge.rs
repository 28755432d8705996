use crate::operator::status::OperatorStatus;
use followcore::diagnostics::OperatorAlert;
use followcore::supervisor::{InputPublishers, TickReport};
use log::info;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
};
use warp::{http::StatusCode, Filter};

pub fn operator_bind_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

type SharedStatus = Arc<RwLock<OperatorStatus>>;

/// HTTP endpoint for the operator: the latest follow status and the abort
/// switch polled by the control loop.
pub struct OperatorBridge {
    state: SharedStatus,
    publishers: Arc<InputPublishers>,
}

impl OperatorBridge {
    pub fn new(publishers: Arc<InputPublishers>) -> Self {
        Self {
            state: Arc::new(RwLock::new(OperatorStatus::default())),
            publishers,
        }
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let publishers = self.publishers.clone();
        let publishers_filter = warp::any().map(move || publishers.clone());

        let status_route = warp::path("status")
            .and(warp::get())
            .and(state_filter)
            .map(|state: SharedStatus| {
                let status = state.read().map(|guard| guard.clone()).unwrap_or_default();
                warp::reply::json(&status)
            });

        let abort_route = warp::path("abort")
            .and(warp::post())
            .and(publishers_filter)
            .map(|publishers: Arc<InputPublishers>| {
                publishers.raise_abort();
                info!("abort requested by operator");
                warp::reply::with_status(
                    warp::reply::json(&json!({"status": "abort requested"})),
                    StatusCode::ACCEPTED,
                )
            });

        status_route.or(abort_route)
    }

    /// Serves the routes on the current tokio runtime until it shuts down.
    pub fn spawn(&self, address: SocketAddr) {
        let routes = self.routes();
        tokio::spawn(async move {
            warp::serve(routes).run(address).await;
        });
        info!("operator bridge listening on http://{}", address);
    }

    pub fn publish(&self, report: &TickReport, alerts: Vec<OperatorAlert>) {
        if let Ok(mut guard) = self.state.write() {
            guard.update(report, alerts);
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> OperatorStatus {
        self.state
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::SimulationConfig;
    use followcore::interface::FlightMode;
    use followcore::supervisor::{channels, ManualClock, Supervisor};

    #[tokio::test]
    async fn abort_request_reaches_control_loop() {
        let (publishers, slots) = channels();
        let bridge = OperatorBridge::new(Arc::new(publishers));
        let mission = SimulationConfig::sample().unwrap().mission;
        let mut supervisor = Supervisor::new(mission, slots, ManualClock::new(0.0)).unwrap();

        let response = warp::test::request()
            .method("POST")
            .path("/abort")
            .reply(&bridge.routes())
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let report = supervisor.tick();
        assert_eq!(report.mode, FlightMode::Failsafe);
    }

    #[tokio::test]
    async fn status_serves_latest_report() {
        let (publishers, slots) = channels();
        let bridge = OperatorBridge::new(Arc::new(publishers));
        let mission = SimulationConfig::sample().unwrap().mission;
        let mut supervisor = Supervisor::new(mission, slots, ManualClock::new(0.0)).unwrap();
        let report = supervisor.tick();
        bridge.publish(&report, supervisor.log().drain_alerts());
        assert_eq!(bridge.snapshot().mode, Some(report.mode));

        let response = warp::test::request()
            .method("GET")
            .path("/status")
            .reply(&bridge.routes())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["mode"], "searching");
    }
}
