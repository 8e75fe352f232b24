use common::ssm::{self, SecretCache, SsmSecretStore};
use common::{
    format_errors, get_querystring_parameter, logging, ApiGatewayEvent, Body, Error, HttpError,
    HttpResponse,
};
use lambda_runtime::{service_fn, LambdaEvent};
use rusoto_core::Region;
use serde::Serialize;

mod numeric;

#[derive(Serialize, Debug, PartialEq)]
struct Greeting {
    phrase: String,
    is_personalized: bool,
}

impl Default for Greeting {
    fn default() -> Self {
        Greeting {
            phrase: "Hello!".to_string(),
            is_personalized: false,
        }
    }
}

// Single-threaded: the cold-start SSM bootstrap writes environment variables,
// and invocations arrive one at a time anyway.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    logging::init();
    let secrets = SecretCache::new(SsmSecretStore::new(Region::default()));
    ssm::load_ssm_environment_variables(&secrets).await?;

    let handler = format_errors(get_greeting);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<ApiGatewayEvent>| {
        handler(event.payload)
    }))
    .await
}

/// Responds with a greeting, tailored to the `person` querystring parameter
/// when one is given. Numbers cannot be greeted.
async fn get_greeting(event: ApiGatewayEvent) -> Result<HttpResponse, Error> {
    let mut greeting = Greeting::default();

    let person = get_querystring_parameter(&event, "person", false, None)?;
    if let Some(person) = person.filter(|person| !person.is_empty()) {
        if numeric::is_numeric(&person) {
            return Err(HttpError::querystring_parameter("A number cannot be greeted").into());
        }
        log::info!("greeting {}", person);
        greeting = Greeting {
            phrase: format!("Hello, {}!", person),
            is_personalized: true,
        };
    }

    Ok(HttpResponse::new(200u16, Body::json(&greeting)?, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn event(person: Option<&str>) -> ApiGatewayEvent {
        ApiGatewayEvent {
            query_string_parameters: person
                .map(|person| HashMap::from([("person".to_string(), person.to_string())])),
            ..ApiGatewayEvent::default()
        }
    }

    async fn respond(event: ApiGatewayEvent) -> (String, Value) {
        let response = format_errors(get_greeting)(event)
            .await
            .expect("greeting handler failed");
        let body = serde_json::from_str(&response.body).expect("body is not JSON");
        (response.status_code, body)
    }

    #[test]
    fn deserialize_anonymous_event() {
        let event = serde_json::from_str::<ApiGatewayEvent>(include_str!(
            "../tests/data/anonymous.json"
        ))
        .expect("failed to deserialize anonymous event");
        assert_eq!(event.query_string_parameters, None);
    }

    #[test]
    fn deserialize_personalized_event() {
        let event = serde_json::from_str::<ApiGatewayEvent>(include_str!(
            "../tests/data/personalized.json"
        ))
        .expect("failed to deserialize personalized event");
        assert_eq!(event, self::event(Some("Joe")));
    }

    #[tokio::test]
    async fn greets_everyone_without_a_person() {
        assert_eq!(
            respond(event(None)).await,
            (
                "200".to_string(),
                json!({"phrase": "Hello!", "is_personalized": false})
            )
        );
    }

    #[tokio::test]
    async fn greets_named_person() {
        assert_eq!(
            respond(event(Some("Joe"))).await,
            (
                "200".to_string(),
                json!({"phrase": "Hello, Joe!", "is_personalized": true})
            )
        );
    }

    #[tokio::test]
    async fn empty_person_gets_the_generic_greeting() {
        assert_eq!(
            respond(event(Some(""))).await.1,
            json!({"phrase": "Hello!", "is_personalized": false})
        );
    }

    #[tokio::test]
    async fn refuses_to_greet_numbers() {
        assert_eq!(
            respond(event(Some("11"))).await,
            (
                "400".to_string(),
                json!({
                    "description": "Bad request due to missing or malformed parameters",
                    "error": "A number cannot be greeted",
                })
            )
        );
    }

    #[tokio::test]
    async fn refuses_to_greet_numeral_ideographs() {
        for person in ["三", "⅕"] {
            let (status, body) = respond(event(Some(person))).await;
            assert_eq!(status, "400");
            assert_eq!(body["error"], "A number cannot be greeted");
        }
    }

    #[tokio::test]
    async fn unwrapped_handler_reports_classified_error() {
        let err = get_greeting(event(Some("11")))
            .await
            .expect_err("numbers should be rejected")
            .downcast::<HttpError>()
            .expect("rejection should be classified");
        assert!(err.kind().is_bad_request());
    }

    #[tokio::test]
    async fn fixture_events_round_trip_through_handler() {
        let event = serde_json::from_str::<ApiGatewayEvent>(include_str!(
            "../tests/data/personalized.json"
        ))
        .unwrap();
        let (status, body) = respond(event).await;
        assert_eq!(status, "200");
        assert_eq!(body["phrase"], "Hello, Joe!");
    }
}
