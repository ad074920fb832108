//! Router construction
//!
//! The axum router is derived from a validated [`RouteTable`]: one method
//! router per pattern, one handler per operation. A single CORS layer wraps
//! everything, fallbacks included, so error responses carry CORS headers too.
//! Non-preflight responses also advertise the allowed methods and headers.

use std::collections::BTreeMap;

use axum::{
    extract::OriginalUri,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::Response,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{projects, remote_sources, users};
use super::routes::{axum_path, Operation, RouteTable, Verb};
use super::{ApiError, ApiState};

/// Methods allowed cross-origin
const CORS_ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
];

/// Headers browsers may send cross-origin
const CORS_ALLOWED_HEADERS: [HeaderName; 6] = [
    header::ACCEPT,
    header::ACCEPT_ENCODING,
    header::AUTHORIZATION,
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    HeaderName::from_static("x-csrf-token"),
];

/// The service's CORS policy: any origin, a fixed set of methods and headers
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(CORS_ALLOWED_METHODS)
        .allow_headers(CORS_ALLOWED_HEADERS)
}

fn joined<T: AsRef<str>>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.as_ref())
        .collect::<Vec<_>>()
        .join(",")
}

/// Add the allow-lists to responses the CORS layer did not answer itself
async fn advertise_cors_policy(mut response: Response) -> Response {
    let headers = response.headers_mut();
    if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS) {
        if let Ok(value) = HeaderValue::from_str(&joined(&CORS_ALLOWED_METHODS)) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
        }
    }
    if !headers.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS) {
        if let Ok(value) = HeaderValue::from_str(&joined(&CORS_ALLOWED_HEADERS)) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }
    }
    response
}

fn method_filter(verb: Verb) -> MethodFilter {
    match verb {
        Verb::Get => MethodFilter::GET,
        Verb::Post => MethodFilter::POST,
        Verb::Put => MethodFilter::PUT,
        Verb::Delete => MethodFilter::DELETE,
    }
}

/// Handler for an operation, registered for `filter`
fn endpoint(operation: Operation, filter: MethodFilter) -> MethodRouter<ApiState> {
    use Operation::*;
    match operation {
        GetProject => on(filter, projects::get_project),
        GetProjectByName => on(filter, projects::get_project_by_name),
        ListProjects => on(filter, projects::list_projects),
        CreateProject => on(filter, projects::create_project),
        DeleteProject => on(filter, projects::delete_project),

        GetUser => on(filter, users::get_user),
        GetUserByName => on(filter, users::get_user_by_name),
        ListUsers => on(filter, users::list_users),
        CreateUser => on(filter, users::create_user),
        DeleteUser => on(filter, users::delete_user),
        CreateUserLa => on(filter, users::create_user_la),
        UpdateUserLa => on(filter, users::update_user_la),
        DeleteUserLa => on(filter, users::delete_user_la),
        CreateUserToken => on(filter, users::create_user_token),

        GetRemoteSource => on(filter, remote_sources::get_remote_source),
        GetRemoteSourceByName => on(filter, remote_sources::get_remote_source_by_name),
        ListRemoteSources => on(filter, remote_sources::list_remote_sources),
        CreateRemoteSource => on(filter, remote_sources::create_remote_source),
        DeleteRemoteSource => on(filter, remote_sources::delete_remote_source),
    }
}

/// Build the gateway router for a validated table
///
/// Path matching is left to axum; [`RouteTable::new`] only accepts tables
/// it can mount, so this never panics on route conflicts.
pub fn router(state: ApiState, table: &RouteTable) -> Router {
    let mut by_path: BTreeMap<&'static str, MethodRouter<ApiState>> = BTreeMap::new();
    for spec in table.specs() {
        tracing::trace!(
            method = %spec.verb.as_method(),
            pattern = spec.pattern,
            operation = ?spec.operation,
            dispatch = ?spec.operation.dispatch(),
            "route"
        );
        let handler = endpoint(spec.operation, method_filter(spec.verb));
        let merged = match by_path.remove(spec.pattern) {
            Some(existing) => existing.merge(handler),
            None => handler,
        };
        by_path.insert(spec.pattern, merged);
    }

    let mut router = Router::new();
    for (pattern, methods) in by_path {
        router = router.route(&axum_path(pattern), methods.fallback(method_not_allowed));
    }
    tracing::debug!(routes = table.len(), "gateway routes registered");

    router
        .fallback(not_found)
        .layer(middleware::map_response(advertise_cors_policy))
        .layer(cors_layer())
        .with_state(state)
}

async fn method_not_allowed(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::method_not_allowed(format!("method {} not allowed on {}", method, uri.path()))
}

async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::not_found(format!("no route for {} {}", method, uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_allow_lists() {
        assert_eq!(joined(&CORS_ALLOWED_METHODS), "GET,HEAD,POST,PUT,DELETE");
        assert_eq!(
            joined(&CORS_ALLOWED_HEADERS),
            "accept,accept-encoding,authorization,content-length,content-type,x-csrf-token"
        );
    }

    #[test]
    fn test_every_verb_has_a_filter() {
        for spec in RouteTable::configstore().unwrap().specs() {
            let filter = method_filter(spec.verb);
            assert_eq!(
                MethodFilter::try_from(spec.verb.as_method()).unwrap(),
                filter
            );
        }
    }
}
