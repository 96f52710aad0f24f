use crate::MetricsCollector;
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use ipt_save::SaveCommand;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

struct ServerState {
    collector: MetricsCollector,
    source: SaveCommand,
    telemetry_path: String,
}

/// HTTP server for the Prometheus metrics endpoint
pub struct MetricsServer {
    state: Arc<ServerState>,
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(
        collector: MetricsCollector,
        source: SaveCommand,
        addr: SocketAddr,
        telemetry_path: impl Into<String>,
    ) -> Self {
        Self {
            state: Arc::new(ServerState {
                collector,
                source,
                telemetry_path: telemetry_path.into(),
            }),
            addr,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(landing_handler))
            .route(&self.state.telemetry_path, get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .context(format!("Failed to bind {}", self.addr))?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        let local = listener.local_addr()?;

        info!(
            "Listening on http://{}{}",
            local, self.state.telemetry_path
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down metrics server");
            })
            .await?;

        Ok(())
    }
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> Response {
    let outcome = state.collector.scrape(&state.source).await;
    match state.collector.render(&outcome) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("# Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn landing_handler(State(state): State<Arc<ServerState>>) -> Html<String> {
    Html(landing_page(&state.telemetry_path))
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>iptables exporter</title></head>\n\
         <body>\n\
         <h1>iptables exporter</h1>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        telemetry_path
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landing_page_links_telemetry_path() {
        let page = landing_page("/iptables");
        assert!(page.contains("<a href=\"/iptables\">Metrics</a>"));
    }
}
