//! Request principal derived from the auth collaborator's headers.
//!
//! Authentication verification happens upstream; by the time a request
//! reaches these handlers the gateway has stamped `X-Tenant-Id`, `X-Role`
//! and, for drivers, `X-Driver-Id`. Unstamped requests fall back to the
//! development tenant with dispatcher powers.

use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};

use super::Problem;

const TENANT_HEADER: &str = "x-tenant-id";
const ROLE_HEADER: &str = "x-role";
const DRIVER_HEADER: &str = "x-driver-id";
const DEFAULT_TENANT: &str = "t_demo";

/// Caller role used by the authorization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Dispatcher,
    Driver,
    Customer,
}

impl Role {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("admin") => Self::Admin,
            Some("driver") => Self::Driver,
            Some("customer") => Self::Customer,
            _ => Self::Dispatcher,
        }
    }
}

/// Identity attached to every request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub tenant: String,
    pub role: Role,
    pub driver_id: Option<String>,
}

impl Principal {
    /// Build a principal from gateway headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
        };
        Self {
            tenant: header(TENANT_HEADER).unwrap_or(DEFAULT_TENANT).to_owned(),
            role: Role::parse(header(ROLE_HEADER)),
            driver_id: header(DRIVER_HEADER).map(str::to_owned),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Dispatch powers: planning, assignment, geofence mutation.
    pub fn can_dispatch(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Dispatcher)
    }

    pub fn require_admin(&self) -> Result<(), Problem> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Problem::forbidden("admin required"))
        }
    }

    pub fn require_dispatcher(&self) -> Result<(), Problem> {
        if self.can_dispatch() {
            Ok(())
        } else {
            Err(Problem::forbidden("dispatcher or admin required"))
        }
    }

    pub fn require_event_source(&self) -> Result<(), Problem> {
        if matches!(self.role, Role::Admin | Role::Dispatcher | Role::Driver) {
            Ok(())
        } else {
            Err(Problem::forbidden("driver, dispatcher or admin required"))
        }
    }
}

impl FromRequest for Principal {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(Principal::from_headers(req.headers())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};
    use rstest::rstest;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).expect("header name"),
                HeaderValue::from_str(value).expect("header value"),
            );
        }
        map
    }

    #[rstest]
    fn defaults_to_demo_dispatcher() {
        let principal = Principal::from_headers(&HeaderMap::new());
        assert_eq!(principal.tenant, "t_demo");
        assert_eq!(principal.role, Role::Dispatcher);
        assert!(principal.driver_id.is_none());
    }

    #[rstest]
    #[case("admin", Role::Admin)]
    #[case("driver", Role::Driver)]
    #[case("customer", Role::Customer)]
    #[case("dispatcher", Role::Dispatcher)]
    #[case("unknown", Role::Dispatcher)]
    fn parses_roles(#[case] header: &str, #[case] expected: Role) {
        let principal = Principal::from_headers(&headers(&[("x-role", header)]));
        assert_eq!(principal.role, expected);
    }

    #[rstest]
    fn admin_gate_blocks_everyone_else() {
        let admin = Principal::from_headers(&headers(&[("x-role", "admin")]));
        assert!(admin.require_admin().is_ok());
        let driver = Principal::from_headers(&headers(&[("x-role", "driver")]));
        assert!(driver.require_admin().is_err());
        assert!(driver.require_dispatcher().is_err());
        assert!(driver.require_event_source().is_ok());
    }
}
