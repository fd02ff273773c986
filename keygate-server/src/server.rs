//! HTTP/1.1 server loop for the keygate auth surface

use crate::handlers::{handle_request, AppContext};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub type BoxBody = http_body_util::Full<bytes::Bytes>;

pub struct Server {
    ctx: AppContext,
}

impl Server {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Accept connections until ctrl-c
    pub async fn serve(self, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("keygate server listening on {}", addr);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
            };
            debug!("New connection from {}", remote_addr);

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                if let Err(err) = Self::handle_connection(stream, ctx, remote_addr).await {
                    error!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        ctx: AppContext,
        remote_addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let ctx = ctx.clone();
            async move { handle_request(req, ctx, remote_addr).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            error!("HTTP connection error: {}", err);
        }

        Ok(())
    }
}

/// Build a JSON response with the given status
pub fn json_response(status: StatusCode, body: String) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(http_body_util::Full::new(bytes::Bytes::from(body)))
        .unwrap_or_else(|_| {
            let mut response = Response::new(http_body_util::Full::new(bytes::Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}
