use common::ssm::{self, SecretCache, SecretStore, SsmSecretStore};
use common::{logging, Error};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use lambda_runtime::{service_fn, LambdaEvent};
use lazy_static::lazy_static;
use regex::Regex;
use rusoto_core::Region;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Names the SSM parameter holding the token signing secret.
const SECRET_KEY_PATH_VAR: &str = "THOR_API_SECRET_KEY__SSM_KEY";
const UNKNOWN_USER: &str = "unknown_user";
const POLICY_VERSION: &str = "2012-10-17";
const INVOKE_ACTION: &str = "execute-api:Invoke";

lazy_static! {
    static ref BEARER: Regex = Regex::new(r"^Bearer\s+(.+)").expect("invalid bearer pattern");
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Event {
    authorization_token: String,
    method_arn: String,
}

#[derive(Debug, thiserror::Error)]
enum AuthorizerError {
    #[error("authorization header is not a bearer token")]
    MalformedAuthorization,
    #[error("malformed method ARN: {0}")]
    MalformedMethodArn(String),
}

/// The API and stage a `methodArn` points into.
#[derive(Debug, PartialEq)]
struct MethodArn {
    region: String,
    account_id: String,
    api_id: String,
    stage: String,
}

impl MethodArn {
    /// Every method and path under the same API and stage.
    fn wildcard_resource(&self) -> String {
        format!(
            "arn:aws:execute-api:{}:{}:{}/{}/*",
            self.region, self.account_id, self.api_id, self.stage
        )
    }
}

impl FromStr for MethodArn {
    type Err = AuthorizerError;

    fn from_str(arn: &str) -> Result<Self, Self::Err> {
        let malformed = || AuthorizerError::MalformedMethodArn(arn.to_string());
        let parts: Vec<&str> = arn.split(':').collect();
        let [_, _, _, region, account_id, api_path] = parts.as_slice() else {
            return Err(malformed());
        };
        let mut segments = api_path.split('/');
        let (Some(api_id), Some(stage)) = (segments.next(), segments.next()) else {
            return Err(malformed());
        };
        Ok(MethodArn {
            region: region.to_string(),
            account_id: account_id.to_string(),
            api_id: api_id.to_string(),
            stage: stage.to_string(),
        })
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
enum Effect {
    Allow,
    Deny,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AuthPolicy {
    principal_id: String,
    context: BTreeMap<String, Value>,
    policy_document: PolicyDocument,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument {
    version: &'static str,
    statement: Vec<Statement>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Statement {
    action: &'static str,
    effect: Effect,
    resource: String,
}

/// `user_id` claims are issued as numbers or strings.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum UserId {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Text(id) => f.write_str(id),
            UserId::Number(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Deserialize)]
struct Claims {
    user_id: UserId,
    first_name: Value,
    last_name: Value,
}

#[derive(Deserialize)]
struct UnverifiedClaims {
    user_id: Option<UserId>,
}

struct Decision {
    effect: Effect,
    principal_id: String,
    context: BTreeMap<String, Value>,
}

impl Decision {
    fn deny(principal_id: String, message: &str) -> Self {
        Decision {
            effect: Effect::Deny,
            principal_id,
            context: BTreeMap::from([("message".to_string(), Value::from(message))]),
        }
    }
}

// Single-threaded: the cold-start SSM bootstrap writes environment variables,
// and invocations arrive one at a time anyway.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    logging::init();
    let secret_key_path = env::var(SECRET_KEY_PATH_VAR)?;
    let secrets = Arc::new(SecretCache::new(SsmSecretStore::new(Region::default())));
    ssm::load_ssm_environment_variables(&*secrets).await?;

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Event>| {
        let secrets = Arc::clone(&secrets);
        let secret_key_path = secret_key_path.clone();
        async move { authorize(event.payload, &*secrets, &secret_key_path).await }
    }))
    .await
}

fn bearer_token(authorization: &str) -> Result<&str, AuthorizerError> {
    BEARER
        .captures(authorization)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
        .ok_or(AuthorizerError::MalformedAuthorization)
}

/// Produces an access policy for the whole API stage from the requester's
/// bearer token.
///
/// Access is allowed when the token is signed with the shared secret and has
/// not expired. Token problems never fail the invocation; they become a deny
/// policy. A header or ARN that is not shaped as API Gateway promises is an
/// error.
async fn authorize<S: SecretStore>(
    event: Event,
    secrets: &SecretCache<S>,
    secret_key_path: &str,
) -> Result<AuthPolicy, Error> {
    let token = bearer_token(&event.authorization_token)?;
    let method_arn: MethodArn = event.method_arn.parse()?;
    let secret_key = secrets.get(secret_key_path, true).await?;

    let decision = decide(token, &secret_key);
    log::info!(
        "{:?} {} access to {}",
        decision.effect,
        decision.principal_id,
        method_arn.wildcard_resource()
    );

    Ok(AuthPolicy {
        principal_id: decision.principal_id,
        context: decision.context,
        policy_document: PolicyDocument {
            version: POLICY_VERSION,
            statement: vec![Statement {
                action: INVOKE_ACTION,
                effect: decision.effect,
                resource: method_arn.wildcard_resource(),
            }],
        },
    })
}

fn decide(token: &str, secret_key: &str) -> Decision {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.required_spec_claims.clear();

    let verified = decode::<Value>(
        token,
        &DecodingKey::from_secret(secret_key.as_bytes()),
        &validation,
    );
    match verified {
        Ok(data) => match serde_json::from_value::<Claims>(data.claims) {
            Ok(claims) => Decision {
                effect: Effect::Allow,
                principal_id: claims.user_id.to_string(),
                context: BTreeMap::from([
                    ("first_name".to_string(), claims.first_name),
                    ("last_name".to_string(), claims.last_name),
                ]),
            },
            Err(err) => {
                log::warn!("token is missing a required claim: {}", err);
                Decision::deny(UNKNOWN_USER.to_string(), "Invalid token")
            }
        },
        Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
            let principal_id = unverified_user_id(token).unwrap_or_else(|| UNKNOWN_USER.to_string());
            Decision::deny(principal_id, "Expired token")
        }
        Err(err) => {
            log::debug!("rejecting token: {}", err);
            Decision::deny(UNKNOWN_USER.to_string(), "Invalid token")
        }
    }
}

/// Reads `user_id` without checking the signature or expiry. Only used to
/// label the deny policy of a token whose signature already checked out.
fn unverified_user_id(token: &str) -> Option<String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<UnverifiedClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()?
        .claims
        .user_id
        .map(|id| id.to_string())
}
