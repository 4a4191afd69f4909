//! The `{seq, type, ...}` envelope wrapping every wire message.
//!
//! Parsing is field-by-field over a decoded [`Value`] tree rather than a
//! derived deserializer: routing needs the `command`/`event` name before the
//! payload type is known, and each missing field gets its own protocol-error
//! message.

use crate::value::{Map, Value};

/// A parsed message envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A request expecting a correlated response.
    Request {
        seq: i64,
        command: String,
        arguments: Option<Value>,
    },
    /// A response to an earlier request.
    Response {
        seq: i64,
        request_seq: i64,
        command: Option<String>,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    },
    /// A fire-and-forget event.
    Event {
        seq: i64,
        event: String,
        body: Option<Value>,
    },
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Envelope::Request {
            seq,
            command: command.into(),
            arguments,
        }
    }

    /// Build a successful response envelope. The request's `command` is
    /// echoed alongside the correlation sequence.
    pub fn response_success(
        seq: i64,
        request_seq: i64,
        command: impl Into<String>,
        body: Value,
    ) -> Self {
        Envelope::Response {
            seq,
            request_seq,
            command: Some(command.into()),
            success: true,
            message: None,
            body: Some(body),
        }
    }

    /// Build a failed response envelope carrying an error message.
    pub fn response_error(
        seq: i64,
        request_seq: i64,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Envelope::Response {
            seq,
            request_seq,
            command: Some(command.into()),
            success: false,
            message: Some(message.into()),
            body: None,
        }
    }

    /// Build an event envelope.
    pub fn event(seq: i64, event: impl Into<String>, body: Option<Value>) -> Self {
        Envelope::Event {
            seq,
            event: event.into(),
            body,
        }
    }

    /// Parse an envelope from a decoded value tree.
    ///
    /// The error string names the first missing or mis-typed field; callers
    /// surface it through the session error handler.
    pub fn parse(value: &Value) -> Result<Envelope, String> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or("message missing string 'type' field")?;
        let seq = value
            .get("seq")
            .and_then(Value::as_i64)
            .ok_or("message missing integer 'seq' field")?;

        match kind {
            "request" => {
                let command = value
                    .get("command")
                    .and_then(Value::as_str)
                    .ok_or("request missing string 'command' field")?
                    .to_owned();
                Ok(Envelope::Request {
                    seq,
                    command,
                    arguments: present(value.get("arguments")),
                })
            }
            "response" => {
                let request_seq = value
                    .get("request_seq")
                    .and_then(Value::as_i64)
                    .ok_or("response missing integer 'request_seq' field")?;
                let success = value
                    .get("success")
                    .and_then(Value::as_bool)
                    .ok_or("response missing boolean 'success' field")?;
                Ok(Envelope::Response {
                    seq,
                    request_seq,
                    command: value
                        .get("command")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    success,
                    message: value
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    body: present(value.get("body")),
                })
            }
            "event" => {
                let event = value
                    .get("event")
                    .and_then(Value::as_str)
                    .ok_or("event missing string 'event' field")?
                    .to_owned();
                Ok(Envelope::Event {
                    seq,
                    event,
                    body: present(value.get("body")),
                })
            }
            other => Err(format!("unknown message type '{other}'")),
        }
    }

    /// Build the value tree this envelope encodes to.
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        match self {
            Envelope::Request {
                seq,
                command,
                arguments,
            } => {
                map.insert("seq".to_owned(), Value::Int(seq));
                map.insert("type".to_owned(), Value::Str("request".to_owned()));
                map.insert("command".to_owned(), Value::Str(command));
                if let Some(arguments) = arguments {
                    map.insert("arguments".to_owned(), arguments);
                }
            }
            Envelope::Response {
                seq,
                request_seq,
                command,
                success,
                message,
                body,
            } => {
                map.insert("seq".to_owned(), Value::Int(seq));
                map.insert("type".to_owned(), Value::Str("response".to_owned()));
                map.insert("request_seq".to_owned(), Value::Int(request_seq));
                map.insert("success".to_owned(), Value::Bool(success));
                if let Some(command) = command {
                    map.insert("command".to_owned(), Value::Str(command));
                }
                if success {
                    if let Some(body) = body {
                        map.insert("body".to_owned(), body);
                    }
                } else if let Some(message) = message {
                    map.insert("message".to_owned(), Value::Str(message));
                }
            }
            Envelope::Event { seq, event, body } => {
                map.insert("seq".to_owned(), Value::Int(seq));
                map.insert("type".to_owned(), Value::Str("event".to_owned()));
                map.insert("event".to_owned(), Value::Str(event));
                if let Some(body) = body {
                    map.insert("body".to_owned(), body);
                }
            }
        }
        Value::Object(map)
    }
}

/// Treat an explicit `null` the same as an absent field.
fn present(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::to_value;

    #[test]
    fn test_request_round_trip() {
        let args = to_value(&vec![1i64, 2]).unwrap();
        let envelope = Envelope::request(7, "launch", Some(args));
        let value = envelope.clone().into_value();

        assert_eq!(value.get("type").unwrap().as_str(), Some("request"));
        assert_eq!(value.get("seq").unwrap().as_i64(), Some(7));
        assert_eq!(value.get("command").unwrap().as_str(), Some("launch"));

        assert_eq!(Envelope::parse(&value).unwrap(), envelope);
    }

    #[test]
    fn test_success_response_round_trip() {
        let body = Value::Str("ok".to_owned());
        let envelope = Envelope::response_success(2, 1, "launch", body);
        let value = envelope.clone().into_value();

        assert_eq!(value.get("success").unwrap().as_bool(), Some(true));
        assert_eq!(value.get("request_seq").unwrap().as_i64(), Some(1));
        assert!(value.get("message").is_none());
        assert_eq!(Envelope::parse(&value).unwrap(), envelope);
    }

    #[test]
    fn test_error_response_carries_message_not_body() {
        let envelope = Envelope::response_error(2, 1, "launch", "Oh noes!");
        let value = envelope.clone().into_value();

        assert_eq!(value.get("success").unwrap().as_bool(), Some(false));
        assert_eq!(value.get("message").unwrap().as_str(), Some("Oh noes!"));
        assert!(value.get("body").is_none());
        assert_eq!(Envelope::parse(&value).unwrap(), envelope);
    }

    #[test]
    fn test_event_without_body() {
        let envelope = Envelope::event(3, "terminated", None);
        let value = envelope.clone().into_value();

        assert!(value.get("body").is_none());
        assert_eq!(Envelope::parse(&value).unwrap(), envelope);
    }

    #[test]
    fn test_parse_missing_type() {
        let mut map = Map::new();
        map.insert("seq".to_owned(), Value::Int(1));
        let err = Envelope::parse(&Value::Object(map)).unwrap_err();
        assert_eq!(err, "message missing string 'type' field");
    }

    #[test]
    fn test_parse_missing_seq() {
        let mut map = Map::new();
        map.insert("type".to_owned(), Value::Str("request".to_owned()));
        let err = Envelope::parse(&Value::Object(map)).unwrap_err();
        assert_eq!(err, "message missing integer 'seq' field");
    }

    #[test]
    fn test_parse_unknown_type() {
        let mut map = Map::new();
        map.insert("type".to_owned(), Value::Str("banana".to_owned()));
        map.insert("seq".to_owned(), Value::Int(1));
        let err = Envelope::parse(&Value::Object(map)).unwrap_err();
        assert_eq!(err, "unknown message type 'banana'");
    }

    #[test]
    fn test_parse_request_missing_command() {
        let mut map = Map::new();
        map.insert("type".to_owned(), Value::Str("request".to_owned()));
        map.insert("seq".to_owned(), Value::Int(1));
        let err = Envelope::parse(&Value::Object(map)).unwrap_err();
        assert_eq!(err, "request missing string 'command' field");
    }

    #[test]
    fn test_parse_null_arguments_treated_absent() {
        let mut map = Map::new();
        map.insert("type".to_owned(), Value::Str("request".to_owned()));
        map.insert("seq".to_owned(), Value::Int(1));
        map.insert("command".to_owned(), Value::Str("x".to_owned()));
        map.insert("arguments".to_owned(), Value::Null);

        match Envelope::parse(&Value::Object(map)).unwrap() {
            Envelope::Request { arguments, .. } => assert!(arguments.is_none()),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }
}
