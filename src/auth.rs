use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use rand::Rng;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::outcome::{Outcome, try_outcome};
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use sqlx::PgPool;

pub const SESSION_COOKIE: &str = "session";

/// 32 bytes from the OS CSPRNG, hex-encoded. Unguessable; no uniqueness check
/// because a collision over 256 bits is not a practical concern.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub(crate) fn is_valid_session_token(token: &str) -> bool {
    token.len() == 64 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extract the session token from the cookie jar. Anything that is not shaped
/// like a token is dropped here, before it costs a database round-trip.
pub fn session_token_from_jar(jar: &CookieJar<'_>) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| is_valid_session_token(token))
}

/// The session cookie the auth endpoints set: HttpOnly, Secure, SameSite=None
/// (the frontend lives on another origin), 30-day Max-Age matching the
/// session row's fixed lifetime.
pub fn session_cookie(token: String, ttl_days: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(rocket::time::Duration::days(ttl_days))
        .build()
}

pub fn clear_session_cookie(jar: &CookieJar<'_>) {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
}

/// The caller's identity, resolved from the `session` cookie on every request
/// that needs it. Missing, malformed and expired sessions are deliberately
/// indistinguishable: all of them fail as plain `Unauthorized`.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let Some(token) = session_token_from_jar(req.cookies()) else {
            return Outcome::Error((Status::Unauthorized, AppError::Unauthorized));
        };

        let Some(pool) = req.rocket().state::<PgPool>() else {
            return Outcome::Error((Status::InternalServerError, AppError::Unauthorized));
        };
        let repo = PostgresRepository::new(pool.clone());

        match repo.get_session_user(&token).await {
            Ok(Some(user)) => {
                let current_user = CurrentUser {
                    id: user.id,
                    email: user.email,
                    name: user.name,
                    is_admin: user.is_admin,
                };
                req.local_cache(|| Some(current_user.clone()));
                Outcome::Success(current_user)
            }
            Ok(None) => {
                // Expired rows are not actively purged; drop this one in
                // passing if that is what we just hit.
                let _ = repo.delete_session_if_expired(&token).await;
                Outcome::Error((Status::Unauthorized, AppError::Unauthorized))
            }
            Err(err) => Outcome::Error((Status::InternalServerError, err)),
        }
    }
}

/// `CurrentUser` plus the admin flag. Authorization is a single boolean
/// column; there is no privilege audit trail.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let user = try_outcome!(req.guard::<CurrentUser>().await);
        if user.is_admin {
            Outcome::Success(AdminUser(user))
        } else {
            Outcome::Error((Status::Forbidden, AppError::Forbidden))
        }
    }
}

fn session_security_scheme() -> (SecurityScheme, SecurityRequirement) {
    let scheme = SecurityScheme {
        description: Some("Cookie session. Obtain it via POST /auth/login or /auth/register.".to_string()),
        data: SecuritySchemeData::ApiKey {
            name: SESSION_COOKIE.to_string(),
            location: "cookie".to_string(),
        },
        extensions: Object::default(),
    };
    let mut requirement = SecurityRequirement::new();
    requirement.insert("cookieAuth".to_string(), Vec::new());
    (scheme, requirement)
}

fn status_response(code: &str, description: &str) -> Responses {
    use rocket_okapi::okapi::openapi3::{RefOr, Response};
    let mut responses = Responses::default();
    responses.responses.insert(
        code.to_string(),
        RefOr::Object(Response {
            description: description.to_string(),
            ..Default::default()
        }),
    );
    responses
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let (scheme, requirement) = session_security_scheme();
        Ok(RequestHeaderInput::Security("cookieAuth".to_string(), scheme, requirement))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(status_response("401", "Unauthorized - Authentication required"))
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let (scheme, requirement) = session_security_scheme();
        Ok(RequestHeaderInput::Security("cookieAuth".to_string(), scheme, requirement))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(status_response("403", "Forbidden - Admin access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_64_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_ids_do_not_repeat() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn token_shape_filter() {
        assert!(is_valid_session_token(&generate_session_id()));
        assert!(!is_valid_session_token(""));
        assert!(!is_valid_session_token("abc"));
        assert!(!is_valid_session_token(&"g".repeat(64)));
        assert!(!is_valid_session_token(&"a".repeat(63)));
        assert!(!is_valid_session_token(&"a".repeat(65)));
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("a".repeat(64), 30);
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(rocket::time::Duration::days(30)));
    }
}
