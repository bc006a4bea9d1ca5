use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::{ContentType, Header, Status};
use rocket::response::Responder;
use rocket::serde::json::Json;
use rocket::{Request, Response, catch};
use serde::Serialize;
use std::io::Cursor;

/// The one body shape every error path produces.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

fn body(message: &str) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: message.to_string(),
    })
}

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<ErrorBody> {
    body("Bad request")
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<ErrorBody> {
    body("Unauthorized")
}

#[catch(403)]
pub fn forbidden(_: &Request) -> Json<ErrorBody> {
    body("Forbidden")
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<ErrorBody> {
    body("Not found")
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<ErrorBody> {
    body("Conflict")
}

#[catch(422)]
pub fn unprocessable(_: &Request) -> Json<ErrorBody> {
    body("Malformed request body")
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<ErrorBody> {
    body("Internal server error")
}

pub struct TooManyRequests {
    retry_after: u64,
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> TooManyRequests {
    let retry_after = req
        .local_cache(|| None::<RateLimitRetryAfter>)
        .as_ref()
        .map(|r| r.0)
        .unwrap_or(60);

    TooManyRequests { retry_after }
}

impl<'r> Responder<'r, 'static> for TooManyRequests {
    fn respond_to(self, _req: &Request<'_>) -> rocket::response::Result<'static> {
        let body = serde_json::json!({ "error": "Too many requests, please wait before trying again" }).to_string();

        Response::build()
            .status(Status::TooManyRequests)
            .header(ContentType::JSON)
            .header(Header::new("Retry-After", self.retry_after.to_string()))
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::local::asynchronous::Client;
    use rocket::outcome::Outcome;
    use rocket::request::FromRequest;
    use rocket::{catchers, get, routes};

    struct AlwaysLimited;

    #[rocket::async_trait]
    impl<'r> FromRequest<'r> for AlwaysLimited {
        type Error = ();

        async fn from_request(req: &'r Request<'_>) -> rocket::request::Outcome<Self, ()> {
            req.local_cache(|| Some(RateLimitRetryAfter(60)));
            Outcome::Error((Status::TooManyRequests, ()))
        }
    }

    struct AlwaysAnonymous;

    #[rocket::async_trait]
    impl<'r> FromRequest<'r> for AlwaysAnonymous {
        type Error = ();

        async fn from_request(_req: &'r Request<'_>) -> rocket::request::Outcome<Self, ()> {
            Outcome::Error((Status::Unauthorized, ()))
        }
    }

    #[get("/limited")]
    fn limited(_guard: AlwaysLimited) -> Status {
        Status::Ok
    }

    #[get("/private")]
    fn private(_guard: AlwaysAnonymous) -> Status {
        Status::Ok
    }

    fn test_rocket() -> rocket::Rocket<rocket::Build> {
        rocket::build().mount("/", routes![limited, private]).register(
            "/",
            catchers![bad_request, unauthorized, forbidden, not_found, conflict, unprocessable, internal_error, too_many_requests],
        )
    }

    #[rocket::async_test]
    async fn rate_limited_requests_get_retry_after_and_json() {
        let client = Client::tracked(test_rocket()).await.expect("valid rocket instance");
        let response = client.get("/limited").dispatch().await;

        assert_eq!(response.status(), Status::TooManyRequests);
        assert_eq!(response.headers().get_one("Retry-After"), Some("60"));
        assert_eq!(response.content_type(), Some(ContentType::JSON));
        let body = response.into_string().await.unwrap();
        assert!(body.contains("Too many requests"));
    }

    #[rocket::async_test]
    async fn guard_failures_produce_json_unauthorized() {
        let client = Client::tracked(test_rocket()).await.expect("valid rocket instance");
        let response = client.get("/private").dispatch().await;

        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(response.content_type(), Some(ContentType::JSON));
        assert_eq!(response.into_string().await.unwrap(), r#"{"error":"Unauthorized"}"#);
    }

    #[rocket::async_test]
    async fn unknown_routes_produce_json_not_found() {
        let client = Client::tracked(test_rocket()).await.expect("valid rocket instance");
        let response = client.get("/no-such-route").dispatch().await;

        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.into_string().await.unwrap(), r#"{"error":"Not found"}"#);
    }
}
