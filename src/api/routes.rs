//! Declarative route table
//!
//! Every route is a `(method, pattern, operation)` tuple known at compile
//! time. Each operation is either a command (handled by the command
//! executor) or a query (answered by the read model), never both. The table
//! is validated once when the gateway is built and is immutable afterwards.

use axum::http::Method;
use thiserror::Error;

/// Prefix every route pattern is mounted under
pub const API_PREFIX: &str = "/api/v1alpha";

/// HTTP methods a route can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_method(self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
        }
    }
}

/// Where an operation is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Mutates state through the command executor
    Command,
    /// Answered from the read model
    Query,
}

/// Everything the gateway can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetProject,
    GetProjectByName,
    ListProjects,
    CreateProject,
    DeleteProject,

    GetUser,
    GetUserByName,
    ListUsers,
    CreateUser,
    DeleteUser,
    CreateUserLa,
    UpdateUserLa,
    DeleteUserLa,
    CreateUserToken,

    GetRemoteSource,
    GetRemoteSourceByName,
    ListRemoteSources,
    CreateRemoteSource,
    DeleteRemoteSource,
}

impl Operation {
    pub fn dispatch(self) -> Dispatch {
        use Operation::*;
        match self {
            GetProject | GetProjectByName | ListProjects | GetUser | GetUserByName | ListUsers
            | GetRemoteSource | GetRemoteSourceByName | ListRemoteSources => Dispatch::Query,

            CreateProject | DeleteProject | CreateUser | DeleteUser | CreateUserLa
            | UpdateUserLa | DeleteUserLa | CreateUserToken | CreateRemoteSource
            | DeleteRemoteSource => Dispatch::Command,
        }
    }
}

/// One entry of the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub verb: Verb,
    /// Path relative to [`API_PREFIX`], `{name}` marks a parameter
    pub pattern: &'static str,
    pub operation: Operation,
}

const fn route(verb: Verb, pattern: &'static str, operation: Operation) -> RouteSpec {
    RouteSpec {
        verb,
        pattern,
        operation,
    }
}

/// The configstore API
pub static ROUTES: &[RouteSpec] = &[
    route(Verb::Get, "/project/{projectid}", Operation::GetProject),
    route(Verb::Get, "/projects", Operation::ListProjects),
    route(Verb::Put, "/projects", Operation::CreateProject),
    route(Verb::Get, "/projects/{projectname}", Operation::GetProjectByName),
    route(Verb::Delete, "/projects/{projectname}", Operation::DeleteProject),
    route(Verb::Get, "/user/{userid}", Operation::GetUser),
    route(Verb::Get, "/users", Operation::ListUsers),
    route(Verb::Put, "/users", Operation::CreateUser),
    route(Verb::Get, "/users/{username}", Operation::GetUserByName),
    route(Verb::Delete, "/users/{username}", Operation::DeleteUser),
    route(Verb::Put, "/users/{username}/linkedaccounts", Operation::CreateUserLa),
    route(Verb::Put, "/users/{username}/linkedaccounts/{laid}", Operation::UpdateUserLa),
    route(Verb::Delete, "/users/{username}/linkedaccounts/{laid}", Operation::DeleteUserLa),
    route(Verb::Put, "/users/{username}/tokens", Operation::CreateUserToken),
    route(Verb::Get, "/remotesource/{id}", Operation::GetRemoteSource),
    route(Verb::Get, "/remotesources", Operation::ListRemoteSources),
    route(Verb::Put, "/remotesources", Operation::CreateRemoteSource),
    route(Verb::Get, "/remotesources/{name}", Operation::GetRemoteSourceByName),
    route(Verb::Delete, "/remotesources/{name}", Operation::DeleteRemoteSource),
];

/// Route table construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid route pattern {0:?}")]
    InvalidPattern(String),

    #[error("duplicate route {verb:?} {pattern}")]
    Duplicate { verb: Verb, pattern: String },

    #[error("ambiguous routes {verb:?} {first} and {second}")]
    Ambiguous {
        verb: Verb,
        first: String,
        second: String,
    },

    /// Two patterns of the same shape that name their parameters differently
    #[error("routes {first} and {second} differ only in parameter names")]
    Conflict { first: String, second: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Parameter(String),
}

/// Characters the router reads as wildcards
const WILDCARDS: [char; 4] = ['{', '}', ':', '*'];

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, RouteError> {
    let invalid = || RouteError::InvalidPattern(pattern.to_string());
    let rest = pattern.strip_prefix('/').ok_or_else(invalid)?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    rest.split('/')
        .map(|segment| {
            if segment.is_empty() {
                return Err(invalid());
            }
            match segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
            {
                Some(name) if !name.is_empty() && !name.contains(WILDCARDS) => {
                    Ok(Segment::Parameter(name.to_string()))
                }
                Some(_) => Err(invalid()),
                None if segment.contains(WILDCARDS) => Err(invalid()),
                None => Ok(Segment::Literal(segment.to_string())),
            }
        })
        .collect()
}

/// Some path matches both patterns
fn overlaps(a: &[Segment], b: &[Segment]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|pair| match pair {
            (Segment::Literal(x), Segment::Literal(y)) => x == y,
            _ => true,
        })
}

/// `a` is at least as specific as `b` at every position
fn covers(a: &[Segment], b: &[Segment]) -> bool {
    a.iter()
        .zip(b)
        .all(|pair| !matches!(pair, (Segment::Parameter(_), Segment::Literal(_))))
}

/// Equal once parameter names are ignored
///
/// The router keys paths this way, whatever the method, so two distinct
/// patterns of one shape cannot both be mounted.
fn same_shape(a: &[Segment], b: &[Segment]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|pair| match pair {
            (Segment::Literal(x), Segment::Literal(y)) => x == y,
            (Segment::Parameter(_), Segment::Parameter(_)) => true,
            _ => false,
        })
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    spec: RouteSpec,
    segments: Vec<Segment>,
}

/// Validated, immutable set of routes
///
/// Every table [`RouteTable::new`] accepts can be mounted by
/// [`router`](super::router). Where patterns overlap on different methods,
/// literal segments take precedence over parameters.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Validate the routes
    ///
    /// Rejects malformed patterns, duplicates and ambiguous pairs on one
    /// method, and patterns that only differ in parameter names.
    pub fn new(specs: &[RouteSpec]) -> Result<Self, RouteError> {
        let mut routes: Vec<CompiledRoute> = Vec::with_capacity(specs.len());
        for spec in specs {
            let segments = parse_pattern(spec.pattern)?;
            for existing in &routes {
                if existing.spec.verb == spec.verb && overlaps(&existing.segments, &segments) {
                    match (
                        covers(&existing.segments, &segments),
                        covers(&segments, &existing.segments),
                    ) {
                        (true, true) => {
                            return Err(RouteError::Duplicate {
                                verb: spec.verb,
                                pattern: spec.pattern.to_string(),
                            })
                        }
                        (false, false) => {
                            return Err(RouteError::Ambiguous {
                                verb: spec.verb,
                                first: existing.spec.pattern.to_string(),
                                second: spec.pattern.to_string(),
                            })
                        }
                        _ => {}
                    }
                }
                if existing.spec.pattern != spec.pattern
                    && same_shape(&existing.segments, &segments)
                {
                    return Err(RouteError::Conflict {
                        first: existing.spec.pattern.to_string(),
                        second: spec.pattern.to_string(),
                    });
                }
            }
            routes.push(CompiledRoute {
                spec: *spec,
                segments,
            });
        }
        Ok(Self { routes })
    }

    /// The default configstore table
    pub fn configstore() -> Result<Self, RouteError> {
        Self::new(ROUTES)
    }

    pub fn specs(&self) -> impl Iterator<Item = &RouteSpec> {
        self.routes.iter().map(|r| &r.spec)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Convert `{name}` parameters to the router's `:name` syntax
pub fn axum_path(pattern: &str) -> String {
    let path = pattern
        .split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("{}{}", API_PREFIX, path)
}
