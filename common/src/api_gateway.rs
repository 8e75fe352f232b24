//! API Gateway proxy events, response envelopes and handler wrappers.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, HttpError};

/// Response header names mapped to their values.
pub type Headers = BTreeMap<String, String>;

/// The subset of an API Gateway proxy event the handlers read.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayEvent {
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    /// Raw body text as delivered by the gateway. Holds the parsed JSON once
    /// the event has been through [`requires_json_payload`].
    #[serde(default)]
    pub body: Value,
}

impl ApiGatewayEvent {
    /// Replaces the raw body text with the JSON value it encodes.
    pub fn parse_json_body(&mut self) -> Result<(), HttpError> {
        let parsed = match &self.body {
            Value::String(raw) => serde_json::from_str(raw).ok(),
            _ => None,
        };
        match parsed {
            Some(value) => {
                self.body = value;
                Ok(())
            }
            None => Err(HttpError::unsupported_media_type(
                "Request payload must be formatted JSON",
            )),
        }
    }
}

/// Looks up a querystring parameter on `event`.
///
/// An absent parameter yields `default`, unless `required` is set, in which
/// case a querystring parameter error is returned.
pub fn get_querystring_parameter(
    event: &ApiGatewayEvent,
    parameter_name: &str,
    required: bool,
    default: Option<&str>,
) -> Result<Option<String>, HttpError> {
    let value = event
        .query_string_parameters
        .as_ref()
        .and_then(|params| params.get(parameter_name));
    match value {
        Some(value) => Ok(Some(value.clone())),
        None if required => Err(HttpError::querystring_parameter(format!(
            "Missing required querystring parameter: {}",
            parameter_name
        ))),
        None => Ok(default.map(String::from)),
    }
}

/// Logical response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Serialized as an empty string.
    NoContent,
    Json(Value),
}

pub const NO_CONTENT: Body = Body::NoContent;

impl Body {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Body::Json)
    }

    fn serialize(&self) -> String {
        match self {
            Body::NoContent => String::new(),
            Body::Json(value) => value.to_string(),
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

/// A JSON response in the shape API Gateway expects from a proxy integration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status_code: String,
    pub headers: Headers,
    pub body: String,
}

impl HttpResponse {
    /// Builds a response, merging `extra_headers` over the defaults.
    ///
    /// `status` may be a bare integer or an `http::StatusCode`.
    pub fn new(status: impl Into<u16>, body: Body, extra_headers: Option<Headers>) -> Self {
        let mut headers = default_headers();
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }
        HttpResponse {
            status_code: status.into().to_string(),
            headers,
            body: body.serialize(),
        }
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        HttpResponse::new(http::StatusCode::OK, NO_CONTENT, None)
    }
}

impl From<&HttpError> for HttpResponse {
    fn from(err: &HttpError) -> Self {
        let body = serde_json::json!({
            "description": err.description(),
            "error": err.message(),
        });
        HttpResponse::new(err.status_code(), Body::Json(body), None)
    }
}

fn default_headers() -> Headers {
    [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Credentials", "true"),
        ("Content-Type", "application/json"),
    ]
    .iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Wraps a handler so that any [`HttpError`] it returns becomes an error
/// response. Every other error is passed through untouched.
pub fn format_errors<E, F, Fut>(
    handler: F,
) -> impl Fn(E) -> BoxFuture<'static, Result<HttpResponse, Error>>
where
    F: Fn(E) -> Fut,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    move |event| {
        let response = handler(event);
        async move {
            match response.await {
                Err(err) => match err.downcast::<HttpError>() {
                    Ok(err) => {
                        log::info!(
                            "Issuing error response with status code {} due to {} error: {}",
                            err.status_code(),
                            err.kind(),
                            err
                        );
                        Ok(HttpResponse::from(&*err))
                    }
                    Err(other) => Err(other),
                },
                ok => ok,
            }
        }
        .boxed()
    }
}

/// Wraps a handler so that it only runs once the event body has been parsed
/// as JSON. Unparseable bodies fail with an unsupported media type error.
pub fn requires_json_payload<F, Fut, T>(
    handler: F,
) -> impl Fn(ApiGatewayEvent) -> BoxFuture<'static, Result<T, Error>>
where
    F: Fn(ApiGatewayEvent) -> Fut,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    T: Send + 'static,
{
    move |mut event: ApiGatewayEvent| match event.parse_json_body() {
        Ok(()) => handler(event).boxed(),
        Err(err) => future::ready(Err::<T, Error>(err.into())).boxed(),
    }
}
