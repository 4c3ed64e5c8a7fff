//! Dashboard HTTP server: the embedded page plus its JSON endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use actix_web::dev::ServerHandle;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, post, web};
use anyhow::{Context, Result};
use serde::Serialize;

use naphome_types::DemoRunResponse;

use crate::demo::DemoTrigger;
use crate::github::mock_activity;
use crate::status::StatusSources;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

pub struct AppState {
    pub status: StatusSources,
    pub demo: Arc<dyn DemoTrigger>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(DASHBOARD_HTML)
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// System, tasks, tests, sensors and audio in one document.
#[get("/api/status")]
async fn api_status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.status.snapshot())
}

#[post("/api/demo/run")]
async fn api_demo_run(state: web::Data<AppState>) -> impl Responder {
    let success = state.demo.trigger();
    let message = if success {
        "Demo started successfully"
    } else {
        "Demo already running or failed to start"
    };
    tracing::info!(success, "demo requested over http");
    HttpResponse::Ok().json(DemoRunResponse {
        success,
        message: message.to_string(),
    })
}

#[get("/api/github")]
async fn api_github() -> impl Responder {
    HttpResponse::Ok().json(mock_activity())
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(health)
        .service(api_status)
        .service(api_demo_run)
        .service(api_github);
}

/// Running dashboard server on its own actix system thread.
pub struct DashboardServer {
    handle: ServerHandle,
    join: JoinHandle<()>,
    bound: Vec<SocketAddr>,
}

impl DashboardServer {
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.bound
    }

    /// Stop accepting requests and wait for the server thread.
    pub fn stop(self) {
        actix_web::rt::System::new().block_on(self.handle.stop(true));
        if self.join.join().is_err() {
            tracing::warn!("dashboard thread panicked");
        }
    }
}

/// Bind `bind` and serve the dashboard until [`DashboardServer::stop`].
pub fn spawn_dashboard(bind: SocketAddr, state: AppState) -> Result<DashboardServer> {
    let state = web::Data::new(state);
    let (tx, rx) = crossbeam_channel::bounded(1);
    let join = std::thread::Builder::new()
        .name("http-dashboard".to_string())
        .spawn(move || {
            let system = actix_web::rt::System::new();
            system.block_on(async move {
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(state.clone())
                        .wrap(Logger::default().exclude("/api/status"))
                        .configure(routes)
                })
                .workers(2)
                .bind(bind);
                let server = match server {
                    Ok(server) => server,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };
                let bound = server.addrs();
                let server = server.run();
                let _ = tx.send(Ok((server.handle(), bound)));
                if let Err(e) = server.await {
                    tracing::error!(error = %e, "dashboard server failed");
                }
            });
        })
        .context("spawn dashboard thread")?;

    let (handle, bound) = rx
        .recv()
        .context("dashboard thread exited before binding")?
        .with_context(|| format!("bind dashboard on {bind}"))?;
    tracing::info!(addrs = ?bound, "dashboard listening");
    Ok(DashboardServer {
        handle,
        join,
        bound,
    })
}
