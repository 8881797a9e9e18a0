// HTTP server wiring the router engine to hyper

use crate::controller::Controller;
use crate::engine::RouterEngine;
use crate::exception_filter::ExceptionFilter;
use crate::logging::{debug, error, info};
use crate::{Error, HttpRequest, HttpResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming as IncomingBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// A corbel application: a router engine served over HTTP/1.1.
pub struct Application {
    engine: RouterEngine,
    host: String,
}

impl Application {
    pub fn new() -> Self {
        Self::from_engine(RouterEngine::new())
    }

    pub fn from_engine(engine: RouterEngine) -> Self {
        Self {
            engine,
            host: "0.0.0.0".to_string(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn register_controller<C: Controller>(
        &mut self,
        controller: C,
        base_path: Option<&str>,
    ) -> Result<&mut Self, Error> {
        self.engine.register_controller(controller, base_path)?;
        Ok(self)
    }

    pub fn use_filter<F: ExceptionFilter>(&mut self, filter: F) -> &mut Self {
        self.engine.use_filter(filter);
        self
    }

    pub fn set_production_mode(&mut self, production: bool) -> &mut Self {
        self.engine.set_production_mode(production);
        self
    }

    pub fn engine(&self) -> &RouterEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RouterEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> RouterEngine {
        self.engine
    }

    /// Bind `host:port` and serve until the process exits.
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        let listener = TcpListener::bind((self.host.as_str(), port)).await?;
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// Connections accepted before shutdown keep running on their own tasks.
    pub async fn serve_with_shutdown<S>(self, listener: TcpListener, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        info!(%addr, routes = self.engine.router().routes().len(), "Server listening");

        let engine = Arc::new(self.engine);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!(%addr, "Server shutting down");
                    return Ok(());
                }
            };
            debug!(%peer, "Accepted connection");

            let io = TokioIo::new(stream);
            let engine = engine.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let engine = engine.clone();
                    async move { handle_request(req, engine).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(%peer, error = %err, "Error serving connection");
                }
            });
        }
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle an incoming HTTP request
async fn handle_request(
    req: Request<IncomingBody>,
    engine: Arc<RouterEngine>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = req.collect().await?.to_bytes().to_vec();
    let request = HttpRequest::from_parts(method, path, headers, body, HashMap::new(), HashMap::new());

    let response = engine.handle(request).await;
    Ok(into_hyper_response(response))
}

fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|err| {
            error!(error = %err, "Invalid response parts");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerDecl, Reply};
    use crate::metadata::MetadataStore;
    use crate::params::ParamDescriptor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct PingController;

    impl Controller for PingController {
        fn declare(d: &mut ControllerDecl<'_, Self>) {
            d.controller("/ping");
            d.get("/", "ping", |_this, args| async move {
                Ok(Reply::Json(serde_json::json!({ "echo": args.str(0) })))
            })
            .param(ParamDescriptor::query(0, "msg"));
        }
    }

    #[test]
    fn test_invalid_status_falls_back_to_500() {
        let response = into_hyper_response(HttpResponse::new(42));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let mut app = Application::from_engine(RouterEngine::with_store(Arc::new(MetadataStore::new())));
        app.register_controller(PingController, None).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(app.serve_with_shutdown(listener, async {
            let _ = rx.await;
        }));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping?msg=hi%20there HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.ends_with(r#"{"echo":"hi there"}"#));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
