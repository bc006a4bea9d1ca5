use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("Validation error: {0}")]
    InvalidPayload(#[from] ValidationErrors),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("An account with email {0} already exists")]
    EmailTaken(String),
    #[error("Too many requests, please wait before trying again")]
    RateLimited,
    #[error("Upstream service error")]
    Upstream { message: String },
    #[error("Upstream service timed out")]
    UpstreamTimeout,
    #[error("Internal server error")]
    Configuration {
        message: String,
        #[source]
        source: figment::Error,
    },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream { message: message.into() }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Configuration {
            message: "Failed to read configuration".to_string(),
            source: e,
        }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Db { .. } => Status::InternalServerError,
            AppError::InvalidPayload(_) => Status::BadRequest,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::NotFound(_) => Status::NotFound,
            AppError::EmailTaken(_) => Status::Conflict,
            AppError::RateLimited => Status::TooManyRequests,
            AppError::Upstream { .. } => Status::InternalServerError,
            AppError::UpstreamTimeout => Status::GatewayTimeout,
            AppError::Configuration { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let user_id = req
            .local_cache(|| None::<crate::auth::CurrentUser>)
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_else(|| "anonymous".to_string());

        error!(
            error = ?self,
            request_id = %request_id,
            user_id = %user_id,
            method = %req.method(),
            uri = %req.uri(),
            "request failed"
        );

        let status = Status::from(&self);
        // Uniform error body; internal detail stays in the log, never the response.
        let body = serde_json::json!({ "error": self.to_string() }).to_string();

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("429", "Too Many Requests"),
            ("500", "Internal Server Error"),
            ("504", "Gateway Timeout"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(Status::from(&AppError::InvalidPayload(ValidationErrors::new())), Status::BadRequest);
        assert_eq!(Status::from(&AppError::Unauthorized), Status::Unauthorized);
        assert_eq!(Status::from(&AppError::Forbidden), Status::Forbidden);
        assert_eq!(Status::from(&AppError::NotFound("user".into())), Status::NotFound);
        assert_eq!(Status::from(&AppError::EmailTaken("a@b.co".into())), Status::Conflict);
        assert_eq!(Status::from(&AppError::RateLimited), Status::TooManyRequests);
        assert_eq!(Status::from(&AppError::upstream("ai down")), Status::InternalServerError);
        assert_eq!(Status::from(&AppError::UpstreamTimeout), Status::GatewayTimeout);
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = AppError::db("connection refused to 10.0.0.5", sqlx::Error::PoolClosed);
        assert_eq!(err.to_string(), "Internal server error");

        let err = AppError::upstream("deepseek returned 502");
        assert_eq!(err.to_string(), "Upstream service error");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(Status::from(&err), Status::NotFound);
    }
}
