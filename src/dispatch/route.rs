//! Verb and path shape to a dispatch target.

use crate::error::ApiError;
use axum::http::Method;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Id(i64),
    Token(String),
}

impl Segment {
    /// A run of ASCII digits that fits in i64 is an id; anything else is a token.
    pub fn parse(raw: &str) -> Segment {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = raw.parse::<i64>() {
                return Segment::Id(id);
            }
        }
        Segment::Token(raw.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    List,
    Create,
    Retrieve(i64),
    Update(i64),
    Destroy(i64),
    ResourceData(String),
    ResourceAction(String),
    InstanceData(i64, String),
    InstanceAction(i64, String),
}

/// `ph1`/`ph2` are the path segments after the resource. A known shape with the wrong
/// verb is `method_not_allowed`; a token followed by anything is `not_found`. OPTIONS
/// never gets here: the CORS layer answers it.
pub fn route(method: &Method, ph1: Option<&str>, ph2: Option<&str>) -> Result<Dispatch, ApiError> {
    let target = match (ph1.map(Segment::parse), ph2) {
        (None, None) => match *method {
            Method::GET => Dispatch::List,
            Method::POST => Dispatch::Create,
            _ => return Err(ApiError::MethodNotAllowed),
        },
        (None, Some(_)) | (Some(Segment::Token(_)), Some(_)) => return Err(ApiError::NotFound),
        (Some(Segment::Token(name)), None) => match *method {
            Method::GET => Dispatch::ResourceData(name),
            Method::POST => Dispatch::ResourceAction(name),
            _ => return Err(ApiError::MethodNotAllowed),
        },
        (Some(Segment::Id(id)), None) => match *method {
            Method::GET => Dispatch::Retrieve(id),
            Method::PATCH => Dispatch::Update(id),
            Method::DELETE => Dispatch::Destroy(id),
            _ => return Err(ApiError::MethodNotAllowed),
        },
        (Some(Segment::Id(id)), Some(name)) => match *method {
            Method::GET => Dispatch::InstanceData(id, name.to_string()),
            Method::POST => Dispatch::InstanceAction(id, name.to_string()),
            _ => return Err(ApiError::MethodNotAllowed),
        },
    };
    Ok(target)
}
