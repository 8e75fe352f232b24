//! Shared plumbing for the API Gateway Lambda handlers: classified HTTP
//! errors, response envelopes, handler wrappers and the SSM secret cache.

pub mod api_gateway;
pub mod error;
pub mod logging;
pub mod ssm;

pub use api_gateway::{
    format_errors, get_querystring_parameter, requires_json_payload, ApiGatewayEvent, Body,
    Headers, HttpResponse, NO_CONTENT,
};
pub use error::{Error, ErrorKind, HttpError};
pub use ssm::{SecretCache, SecretError, SecretStore, SsmSecretStore};
