mod auth;
mod config;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

pub use config::Config;

use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::middleware::rate_limit::{MemoryStore, RateLimitStore, RateLimiter, RedisStore};
use crate::routes as app_routes;
use crate::service::ai::CompletionClient;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG takes precedence for per-module control, e.g.
    // RUST_LOG=info,codelab_api::routes=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    if json_format {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn ensure_rocket_secret_key() {
    let profile = std::env::var("ROCKET_PROFILE").unwrap_or_else(|_| "debug".to_string());

    if profile != "debug" && std::env::var("ROCKET_SECRET_KEY").is_err() {
        panic!(
            "ROCKET_SECRET_KEY is required for profile '{}'. Generate one with: openssl rand -base64 32",
            profile
        );
    }
}

/// CORS from the configured allow-list. The session cookie rides on
/// cross-origin requests, so credentials stay enabled and wildcard origins
/// are refused outright.
fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.iter().any(|origin| origin == "*");
    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: wildcard origins cannot be combined with credentials. \
            List the frontend origin explicitly."
        );
    }

    let allowed_origins = if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Options]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::try_on_ignite("Rate Limiter", move |rocket| async move {
        let store: Arc<dyn RateLimitStore> = match rate_limit_config.store.as_str() {
            "redis" => match RedisStore::connect(&rate_limit_config.redis_url).await {
                Ok(store) => {
                    tracing::info!("Rate limiter using shared redis store");
                    Arc::new(store)
                }
                Err(e) => {
                    tracing::error!("Failed to connect rate limit redis store: {}", e);
                    return Err(rocket);
                }
            },
            // Per-instance counter: bounds abuse per process, not globally.
            _ => Arc::new(MemoryStore::new()),
        };

        Ok(rocket.manage(RateLimiter::new(store, rate_limit_config)))
    })
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (auth_routes, auth_openapi) = app_routes::auth::routes();
    let (progress_routes, progress_openapi) = app_routes::progress::routes();
    let (ai_routes, ai_openapi) = app_routes::ai::routes();
    let (admin_routes, admin_openapi) = app_routes::admin::routes();
    let (health_routes, health_openapi) = app_routes::health::routes();

    vec![
        RouteSpec {
            path: "/auth",
            routes: auth_routes,
            openapi: auth_openapi,
        },
        RouteSpec {
            path: "/api",
            routes: progress_routes,
            openapi: progress_openapi,
        },
        RouteSpec {
            path: "/api",
            routes: ai_routes,
            openapi: ai_openapi,
        },
        RouteSpec {
            path: "/api/admin",
            routes: admin_routes,
            openapi: admin_openapi,
        },
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
    ]
}

fn mount_routes(mut rocket: Rocket<Build>, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if enable_swagger {
        let mut openapi_list = Vec::new();
        for spec in route_specs {
            rocket = rocket.mount(spec.path, spec.routes);
            openapi_list.push((spec.path, spec.openapi));
        }

        let openapi_docs = match marge_spec_list(&openapi_list) {
            Ok(docs) => docs,
            Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
        };

        let settings = rocket_okapi::settings::OpenApiSettings::default();
        rocket = rocket.mount("/", vec![get_openapi_route(openapi_docs, &settings)]);
        rocket = rocket.mount(
            "/docs",
            make_swagger_ui(&SwaggerUIConfig {
                url: "/openapi.json".to_string(),
                ..Default::default()
            }),
        );
    } else {
        for spec in route_specs {
            rocket = rocket.mount(spec.path, spec.routes);
        }
    }

    rocket
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);
    ensure_rocket_secret_key();

    let cors = build_cors(&config.cors).to_cors().expect("Failed to create CORS fairing");

    let rocket = rocket::build()
        .attach(cors)
        .attach(RequestLogger)
        .attach(stage_db(config.database.clone()))
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .manage(CompletionClient::new(config.ai.clone()))
        .manage(config.clone());

    let rocket = mount_routes(rocket, config.api.enable_swagger);

    // One set of catchers covers every mount point.
    rocket.register(
        "/",
        catchers![
            app_routes::error::bad_request,
            app_routes::error::unauthorized,
            app_routes::error::forbidden,
            app_routes::error::not_found,
            app_routes::error::conflict,
            app_routes::error::unprocessable,
            app_routes::error::internal_error,
            app_routes::error::too_many_requests,
        ],
    )
}
