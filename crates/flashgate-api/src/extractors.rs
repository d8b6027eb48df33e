//! Request extractors
//!
//! The ordering subject comes from a trusted `X-User-Id` header set by the
//! gateway in front of the service.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use flashgate_core::AppError;
use futures::future::{ready, Ready};
use tracing::debug;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The user a request acts for
///
/// # Examples
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use flashgate_api::CurrentUser;
///
/// async fn whoami(user: CurrentUser) -> HttpResponse {
///     HttpResponse::Ok().body(user.user_id.to_string())
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: i64,
}

fn user_id_from_request(req: &HttpRequest) -> Result<i64, AppError> {
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("unreadable {} header", USER_ID_HEADER)))?;

    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::Unauthorized(format!(
            "invalid {} header: {}",
            USER_ID_HEADER, raw
        ))),
    }
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = user_id_from_request(req).map(|user_id| CurrentUser { user_id });
        if let Err(e) = &result {
            debug!("Rejecting request without a usable user id: {}", e);
        }
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_user_id_header() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "42"))
            .to_http_request();
        assert_eq!(user_id_from_request(&req).unwrap(), 42);

        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            user_id_from_request(&req),
            Err(AppError::Unauthorized(_))
        ));

        for bad in ["abc", "0", "-3"] {
            let req = TestRequest::default()
                .insert_header((USER_ID_HEADER, bad))
                .to_http_request();
            assert!(user_id_from_request(&req).is_err(), "{} accepted", bad);
        }
    }
}
