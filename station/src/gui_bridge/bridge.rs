use crate::gui_bridge::model::{LiveModel, ResultsModel};
use log::{error, info, warn};
use rmtscore::acquisition::LiveReading;
use rmtscore::processing::{FiringFile, PerformanceSummary};
use serde_json::json;
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread,
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter};

/// Largest firing file accepted by `POST /process`.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct BridgeState {
    results: ResultsModel,
    live: LiveModel,
}

pub type SharedState = Arc<RwLock<BridgeState>>;

fn read(state: &SharedState) -> RwLockReadGuard<'_, BridgeState> {
    state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(state: &SharedState) -> RwLockWriteGuard<'_, BridgeState> {
    state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `GET /results`, `GET /live` and `POST /process` over the shared state.
pub fn routes(
    state: SharedState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    let results_route = warp::path("results")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedState| warp::reply::json(&read(&state).results));

    let live_route = warp::path("live")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedState| warp::reply::json(&read(&state).live));

    let process_route = warp::path("process")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(state_filter)
        .and_then(|firing: FiringFile, state: SharedState| async move {
            let reply = match firing.process() {
                Ok(result) => {
                    let model = ResultsModel::from_result(&result, true);
                    let summary = PerformanceSummary::from_result(&result);
                    write(&state).results = model;
                    info!("[bridge] processed posted firing: {}", result.designation());
                    warp::reply::with_status(
                        warp::reply::json(&json!({"status": "ok", "summary": summary})),
                        StatusCode::OK,
                    )
                }
                Err(err) => {
                    warn!("[bridge] posted firing rejected: {}", err);
                    warp::reply::with_status(
                        warp::reply::json(&json!({"status": "error", "message": err.to_string()})),
                        StatusCode::UNPROCESSABLE_ENTITY,
                    )
                }
            };
            Ok::<_, Infallible>(reply)
        });

    results_route.or(live_route).or(process_route)
}

/// Publishes results and live readings to an HTTP presentation layer.
#[derive(Clone, Default)]
pub struct GuiBridge {
    state: SharedState,
}

impl GuiBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the routes on a background thread with its own runtime.
    pub fn serve(&self, address: SocketAddr) {
        let routes = routes(self.state.clone());
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("[bridge] failed to build runtime: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                warp::serve(routes).run(address).await;
            });
        });
        info!("[bridge] serving on http://{}", address);
    }

    pub fn publish(&self, model: ResultsModel) {
        info!(
            "[bridge] results: {} points, complete {}",
            model.time.len(),
            model.complete
        );
        write(&self.state).results = model;
    }

    pub fn publish_live(&self, reading: LiveReading) {
        write(&self.state).live.reading = Some(reading);
    }

    pub fn publish_errors(&self, messages: Vec<String>) {
        write(&self.state).live.board_errors = messages;
    }

    pub fn publish_status(&self, message: &str) {
        info!("[bridge] {}", message);
        write(&self.state).results.status = message.to_string();
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> ResultsModel {
        read(&self.state).results.clone()
    }

    #[cfg(test)]
    pub fn live_snapshot(&self) -> LiveModel {
        read(&self.state).live.clone()
    }

    #[cfg(test)]
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }
}
