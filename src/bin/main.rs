#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate chorus;

    use std::sync::Arc;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use chorus::config::ServerConfig;
    use chorus::core::db::{seed_demo_data, MemoryStore};
    use tracing::{error, info};
    use tracing_subscriber::{fmt, EnvFilter};

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request};

        pub fn actix_to_spin_request(
            req: &HttpRequest,
            body: actix_web::web::Bytes,
        ) -> anyhow::Result<Request> {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => anyhow::bail!("unsupported method {other}"),
            };

            let uri = req.uri().to_string();

            let mut builder = Request::builder();
            builder.method(method).uri(&uri);
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    builder.header(name.as_str(), val_str);
                }
            }

            Ok(builder.body(body.to_vec()).build())
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();

            let mut response = actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            );

            for name in [
                "content-type",
                "access-control-allow-origin",
                "access-control-allow-methods",
                "access-control-allow-headers",
            ] {
                if let Some(value) = spin_resp.header(name).and_then(|v| v.as_str()) {
                    response.insert_header((name, value.to_string()));
                }
            }

            response.body(spin_resp.body().to_vec())
        }
    }

    pub async fn run() -> std::io::Result<()> {
        fmt().with_env_filter(EnvFilter::from_default_env()).init();

        let config = ServerConfig::load();
        let store = Arc::new(MemoryStore::new());

        if config.seed_demo {
            if let Err(e) = seed_demo_data(store.as_ref()) {
                error!("demo seed failed: {e:#}");
            }
        }

        let address = config.address();
        info!("Server listening on http://{address}");

        let data = web::Data::from(store);
        HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::route().to(handle_all))
        })
        .bind(address)?
        .run()
        .await
    }

    async fn handle_all(
        store: web::Data<MemoryStore>,
        req: HttpRequest,
        body: web::Bytes,
    ) -> HttpResponse {
        let spin_req = match adapter::actix_to_spin_request(&req, body) {
            Ok(r) => r,
            Err(_) => {
                return HttpResponse::BadRequest()
                    .json(serde_json::json!({"success": false, "error": "validation_error", "message": "Invalid request"}))
            }
        };

        match chorus::route(store.get_ref(), spin_req) {
            Ok(spin_resp) => adapter::spin_to_actix_response(spin_resp),
            Err(e) => {
                error!("unhandled error: {e:#}");
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({"success": false, "error": "server_error", "message": "Server error"}))
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
