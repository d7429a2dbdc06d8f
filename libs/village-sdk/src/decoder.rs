use serde::Deserialize;
use serde::de::DeserializeOwned;
use village_http::TransportResponse;

use crate::error::ApiError;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    explanation: Option<Explanation>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct Explanation {
    #[serde(rename = "ReasonText")]
    reason_text: Option<String>,
}

/// Turns a [`TransportResponse`] into a typed payload or an [`ApiError`].
///
/// Success bodies are plain JSON. Failure bodies may carry
/// `{"error": {"explanation": {"ReasonText": ..}, "description": ..}}`;
/// `ReasonText` wins over `description`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDecoder;

impl ResponseDecoder {
    /// # Errors
    /// `ApiError::Api`/`ApiUnknown` for non-2xx statuses, `ApiError::Decode`
    /// when a 2xx body does not deserialize into `R`.
    pub fn decode<R: DeserializeOwned>(response: &TransportResponse) -> Result<R, ApiError> {
        if !response.is_success() {
            return Err(Self::error_for(response));
        }
        // Empty bodies (204 and friends) decode as JSON null
        let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &response.body
        };
        serde_json::from_slice(body).map_err(ApiError::Decode)
    }

    /// Error for a non-2xx response.
    #[must_use]
    pub fn error_for(response: &TransportResponse) -> ApiError {
        match Self::error_message(&response.body) {
            Some(message) => ApiError::Api {
                status: response.status,
                message,
            },
            None => ApiError::ApiUnknown {
                status: response.status,
            },
        }
    }

    /// The most specific non-empty message in an error envelope.
    #[must_use]
    pub fn error_message(body: &[u8]) -> Option<String> {
        let error = serde_json::from_slice::<ErrorEnvelope>(body).ok()?.error?;
        let reason = error.explanation.and_then(|e| e.reason_text);
        [reason, error.description]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::{Value, json};

    fn response(status: StatusCode, body: &Value) -> TransportResponse {
        TransportResponse::from_status(status, serde_json::to_vec(body).unwrap())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        id: u64,
        name: String,
    }

    #[test]
    fn decodes_success_payload() {
        let person: Person =
            ResponseDecoder::decode(&response(StatusCode::OK, &json!({"id": 1, "name": "Ada"})))
                .unwrap();
        assert_eq!(
            person,
            Person {
                id: 1,
                name: "Ada".to_owned()
            }
        );
    }

    #[test]
    fn empty_success_body_is_null() {
        let resp = TransportResponse::from_status(StatusCode::NO_CONTENT, "");
        let value: Value = ResponseDecoder::decode(&resp).unwrap();
        assert!(value.is_null());
        let unit: Option<Person> = ResponseDecoder::decode(&resp).unwrap();
        assert!(unit.is_none());
    }

    #[test]
    fn mismatched_payload_is_decode_error() {
        let err = ResponseDecoder::decode::<Person>(&response(StatusCode::OK, &json!([1, 2])))
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn reason_text_wins_over_description() {
        let body = json!({"error": {
            "explanation": {"ReasonText": "You cannot post to this group"},
            "description": "Forbidden"
        }});
        let err = ResponseDecoder::decode::<Value>(&response(StatusCode::BAD_REQUEST, &body))
            .unwrap_err();
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "You cannot post to this group");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn description_used_when_no_reason_text() {
        let body = json!({"error": {"explanation": {}, "description": "Notice not found"}});
        assert_eq!(
            ResponseDecoder::error_message(&serde_json::to_vec(&body).unwrap()).as_deref(),
            Some("Notice not found")
        );

        let body = json!({"error": {"explanation": {"ReasonText": " "}, "description": "Gone"}});
        assert_eq!(
            ResponseDecoder::error_message(&serde_json::to_vec(&body).unwrap()).as_deref(),
            Some("Gone")
        );
    }

    #[test]
    fn unreadable_error_is_unknown() {
        let resp = TransportResponse::from_status(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(matches!(
            ResponseDecoder::decode::<Value>(&resp),
            Err(ApiError::ApiUnknown {
                status: StatusCode::BAD_GATEWAY
            })
        ));

        let resp = response(StatusCode::INTERNAL_SERVER_ERROR, &json!({"error": {}}));
        assert!(matches!(
            ResponseDecoder::decode::<Value>(&resp),
            Err(ApiError::ApiUnknown { .. })
        ));
    }
}
