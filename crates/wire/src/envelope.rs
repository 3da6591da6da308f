use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::error::CodecError;
use crate::value::Value;

/// One entry in a schema-validation error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// The four wire envelope shapes, plus the duplex-only `setup` shape used to
/// (re)assign a connection's client identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Method {
        uuid: String,
        method: String,
        params: Option<Value>,
        void: bool,
    },
    Result {
        uuid: String,
        method: String,
        result: Value,
    },
    Event {
        uuid: String,
        event: String,
        channel: Option<String>,
        params: Option<Value>,
    },
    Error {
        uuid: Option<String>,
        code: Option<String>,
        message: String,
        stack: Option<String>,
        method: Option<String>,
        errors: Option<Vec<FieldError>>,
    },
    Setup {
        uuid: String,
    },
}

fn fresh_uuid() -> String {
    Uuid::new_v4().to_string()
}

impl Envelope {
    pub fn new_method(method: impl Into<String>, params: Option<Value>, void: bool) -> Self {
        Envelope::Method {
            uuid: fresh_uuid(),
            method: method.into(),
            params,
            void,
        }
    }

    pub fn new_result(uuid: impl Into<String>, method: impl Into<String>, result: Value) -> Self {
        Envelope::Result {
            uuid: uuid.into(),
            method: method.into(),
            result,
        }
    }

    pub fn new_event(event: impl Into<String>, channel: Option<String>, params: Option<Value>) -> Self {
        Envelope::Event {
            uuid: fresh_uuid(),
            event: event.into(),
            channel,
            params,
        }
    }

    pub fn new_error(
        uuid: Option<String>,
        code: Option<String>,
        message: impl Into<String>,
        method: Option<String>,
    ) -> Self {
        Envelope::Error {
            uuid,
            code,
            message: message.into(),
            stack: None,
            method,
            errors: None,
        }
    }

    pub fn new_setup(uuid: impl Into<String>) -> Self {
        Envelope::Setup { uuid: uuid.into() }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Envelope::Method { uuid, .. }
            | Envelope::Result { uuid, .. }
            | Envelope::Event { uuid, .. }
            | Envelope::Setup { uuid } => Some(uuid.as_str()),
            Envelope::Error { uuid, .. } => uuid.as_deref(),
        }
    }

    pub fn to_json(&self) -> Result<Json, CodecError> {
        let mut obj = Map::new();
        match self {
            Envelope::Method {
                uuid,
                method,
                params,
                void,
            } => {
                obj.insert("type".into(), Json::String("method".into()));
                obj.insert("uuid".into(), Json::String(uuid.clone()));
                obj.insert("method".into(), Json::String(method.clone()));
                if let Some(p) = params {
                    obj.insert("params".into(), p.to_json()?);
                }
                if *void {
                    obj.insert("void".into(), Json::Bool(true));
                }
            }
            Envelope::Result { uuid, method, result } => {
                obj.insert("type".into(), Json::String("result".into()));
                obj.insert("uuid".into(), Json::String(uuid.clone()));
                obj.insert("method".into(), Json::String(method.clone()));
                obj.insert("result".into(), result.to_json()?);
            }
            Envelope::Event {
                uuid,
                event,
                channel,
                params,
            } => {
                obj.insert("type".into(), Json::String("event".into()));
                obj.insert("uuid".into(), Json::String(uuid.clone()));
                obj.insert("event".into(), Json::String(event.clone()));
                if let Some(c) = channel {
                    obj.insert("channel".into(), Json::String(c.clone()));
                }
                if let Some(p) = params {
                    obj.insert("params".into(), p.to_json()?);
                }
            }
            Envelope::Error {
                uuid,
                code,
                message,
                stack,
                method,
                errors,
            } => {
                obj.insert("type".into(), Json::String("error".into()));
                if let Some(u) = uuid {
                    obj.insert("uuid".into(), Json::String(u.clone()));
                }
                if let Some(c) = code {
                    obj.insert("code".into(), Json::String(c.clone()));
                }
                obj.insert("message".into(), Json::String(message.clone()));
                if let Some(s) = stack {
                    obj.insert("stack".into(), Json::String(s.clone()));
                }
                if let Some(m) = method {
                    obj.insert("method".into(), Json::String(m.clone()));
                }
                if let Some(errs) = errors {
                    obj.insert(
                        "errors".into(),
                        serde_json::to_value(errs).map_err(CodecError::from)?,
                    );
                }
            }
            Envelope::Setup { uuid } => {
                obj.insert("type".into(), Json::String("setup".into()));
                obj.insert("uuid".into(), Json::String(uuid.clone()));
            }
        }
        Ok(Json::Object(obj))
    }

    pub fn from_json(json: &Json) -> Result<Envelope, CodecError> {
        let obj = json
            .as_object()
            .ok_or_else(|| CodecError::Parse("envelope must be a JSON object".into()))?;
        let ty = obj
            .get("type")
            .and_then(Json::as_str)
            .ok_or(CodecError::UnknownEnvelopeType)?;
        let uuid_str = |key: &str| -> Option<String> {
            obj.get(key).and_then(Json::as_str).map(str::to_owned)
        };
        let required_str = |key: &str| -> Result<String, CodecError> {
            obj.get(key)
                .and_then(Json::as_str)
                .map(str::to_owned)
                .ok_or_else(|| CodecError::Parse(format!("missing `{key}` field")))
        };
        match ty {
            "method" => Ok(Envelope::Method {
                uuid: required_str("uuid")?,
                method: required_str("method")?,
                params: obj.get("params").map(Value::from_json).transpose()?,
                void: obj.get("void").and_then(Json::as_bool).unwrap_or(false),
            }),
            "result" => Ok(Envelope::Result {
                uuid: required_str("uuid")?,
                method: required_str("method")?,
                result: obj
                    .get("result")
                    .map(Value::from_json)
                    .transpose()?
                    .unwrap_or(Value::Null),
            }),
            "event" => Ok(Envelope::Event {
                uuid: required_str("uuid")?,
                event: required_str("event")?,
                channel: uuid_str("channel"),
                params: obj.get("params").map(Value::from_json).transpose()?,
            }),
            "error" => Ok(Envelope::Error {
                uuid: uuid_str("uuid"),
                code: uuid_str("code"),
                message: required_str("message")?,
                stack: uuid_str("stack"),
                method: uuid_str("method"),
                errors: obj
                    .get("errors")
                    .map(|v| serde_json::from_value::<Vec<FieldError>>(v.clone()))
                    .transpose()
                    .map_err(CodecError::from)?,
            }),
            "setup" => Ok(Envelope::Setup {
                uuid: required_str("uuid")?,
            }),
            _ => Err(CodecError::UnknownEnvelopeType),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&self.to_json()?).map_err(CodecError::from)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
        let json: Json = serde_json::from_slice(bytes).map_err(CodecError::from)?;
        Envelope::from_json(&json)
    }
}
