//! Line-delimited JSON transport.
//!
//! Each request is one line `{"id": 1, "method": "getTip", "params": {...}}`
//! and is answered by one line carrying either `result` or `error`. Method
//! names and parameter names follow the editor interface in camelCase;
//! columns are 0-based as everywhere on that interface.

use crate::{Broker, BrokerError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// The line was not valid JSON or not a request object.
pub const PARSE_ERROR: i64 = -32700;
/// No method with that name.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// The parameters do not match the method.
pub const INVALID_PARAMS: i64 = -32602;
/// Any other failure.
pub const INTERNAL_ERROR: i64 = -32603;

/// An incoming request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
    /// Echoed back in the response.
    #[serde(default)]
    pub id: u64,
    /// Broker method name.
    pub method: String,
    /// Method parameters; absent for methods without any.
    #[serde(default)]
    pub params: Value,
}

/// An outgoing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered.
    pub id: u64,
    /// The answer on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The failure otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

/// Error member of a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}

impl Response {
    /// A successful response.
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// A failed response.
    pub fn err(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
            }),
        }
    }
}

impl From<BrokerError> for ResponseError {
    fn from(err: BrokerError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Method parameters
// ============================================================================

/// Parameters of `configureProject`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigureProjectParams {
    /// Any file of the project.
    pub filename: String,
    /// Import directories.
    pub imports: String,
    /// String import directories.
    pub string_imports: String,
    /// Version identifiers.
    pub version_ids: String,
    /// Debug identifiers.
    pub debug_ids: String,
    /// Extra compiler command line.
    pub cmdline: String,
    /// Environment flag bits.
    pub flags: u32,
}

/// Parameters of `updateModule`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModuleParams {
    /// File being edited.
    pub filename: String,
    /// Full buffer text.
    pub text: String,
    /// Update flags.
    #[serde(default)]
    pub flags: u32,
}

/// Parameters of `configureCommentTasks`.
#[derive(Debug, Deserialize)]
pub struct CommentTasksParams {
    /// Task tokens, one per line.
    pub tasks: String,
}

/// Parameters naming only a file.
#[derive(Debug, Deserialize)]
pub struct FileParams {
    /// The file queried.
    pub filename: String,
}

/// Parameters carrying a range.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    /// The file queried.
    pub filename: String,
    /// First line.
    pub start_line: u32,
    /// 0-based start column.
    pub start_index: u32,
    /// Last line.
    pub end_line: u32,
    /// 0-based end column.
    pub end_index: u32,
    /// Query flags.
    #[serde(default)]
    pub flags: u32,
}

/// Parameters of `getSemanticExpansions` and `getReferences`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionParams {
    /// The file queried.
    pub filename: String,
    /// Identifier text at the position.
    #[serde(default)]
    pub tok: String,
    /// Line.
    pub line: u32,
    /// 0-based column.
    pub idx: u32,
    /// Restrict references to the queried module.
    #[serde(default)]
    pub module_only: bool,
}

/// Parameters of `getIdentifierTypes`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRangeParams {
    /// The file queried.
    pub filename: String,
    /// First line.
    pub start_line: u32,
    /// Last line; 0 for the end of the file.
    pub end_line: u32,
    /// Flag bit 1 requests occurrence positions.
    #[serde(default)]
    pub flags: u32,
}

// ============================================================================
// Dispatch
// ============================================================================

type Outcome = Result<Value, ResponseError>;

/// Parse one request line and answer it.
pub fn handle_line(broker: &Broker, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => handle_request(broker, request),
        Err(err) => {
            warn!(error = %err, "invalid request line");
            Response::err(0, PARSE_ERROR, format!("invalid request: {err}"))
        }
    }
}

/// Answer one request.
pub fn handle_request(broker: &Broker, request: Request) -> Response {
    let Request { id, method, params } = request;
    debug!(id, %method, "request");

    let outcome = dispatch(broker, &method, params);
    match outcome {
        Ok(value) => Response::ok(id, value),
        Err(error) => {
            debug!(id, %method, code = error.code, message = %error.message, "request failed");
            Response {
                id,
                result: None,
                error: Some(error),
            }
        }
    }
}

fn dispatch(broker: &Broker, method: &str, params: Value) -> Outcome {
    match method {
        "configureProject" => {
            let p: ConfigureProjectParams = parse(params)?;
            broker.configure_project(
                &p.filename,
                &p.imports,
                &p.string_imports,
                &p.version_ids,
                &p.debug_ids,
                &p.cmdline,
                p.flags,
            );
            Ok(Value::Null)
        }
        "clearProject" => {
            broker.clear_project();
            Ok(Value::Null)
        }
        "updateModule" => {
            let p: UpdateModuleParams = parse(params)?;
            broker.update_module(&p.filename, &p.text, p.flags);
            Ok(Value::Null)
        }
        "configureCommentTasks" => {
            let p: CommentTasksParams = parse(params)?;
            broker.configure_comment_tasks(&p.tasks);
            Ok(Value::Null)
        }
        "getParseErrors" => {
            let p: FileParams = parse(params)?;
            Ok(Value::String(broker.parse_errors(&p.filename)?))
        }
        "getCommentTasks" => {
            let p: FileParams = parse(params)?;
            Ok(Value::String(broker.comment_tasks(&p.filename)?))
        }
        "isBinaryOperator" => {
            let p: RangeParams = parse(params)?;
            let is_op = broker.is_binary_operator(
                &p.filename,
                p.start_line,
                p.start_index,
                p.end_line,
                p.end_index,
            )?;
            Ok(Value::Bool(is_op))
        }
        "getBinaryIsInLocations" => {
            let p: FileParams = parse(params)?;
            to_value(broker.binary_is_in_locations(&p.filename)?)
        }
        "getParameterStorageLocs" => {
            let p: FileParams = parse(params)?;
            to_value(broker.parameter_storage_locs(&p.filename)?)
        }
        "getDocumentOutline" => {
            let p: FileParams = parse(params)?;
            Ok(Value::String(broker.document_outline(&p.filename)))
        }
        "getLastMessage" => Ok(Value::String(broker.last_message().to_string())),
        "getTip" => {
            let p: RangeParams = parse(params)?;
            broker.get_tip(
                &p.filename,
                p.start_line,
                p.start_index,
                p.end_line,
                p.end_index,
                p.flags,
            );
            Ok(Value::Null)
        }
        "getTipResult" => to_value(broker.tip_result()),
        "getSemanticExpansions" => {
            let p: PositionParams = parse(params)?;
            broker.get_semantic_expansions(&p.filename, &p.tok, p.line, p.idx);
            Ok(Value::Null)
        }
        "getSemanticExpansionsResult" => Ok(Value::String(broker.semantic_expansions_result())),
        "getDefinition" => {
            let p: RangeParams = parse(params)?;
            broker.get_definition(
                &p.filename,
                p.start_line,
                p.start_index,
                p.end_line,
                p.end_index,
            );
            Ok(Value::Null)
        }
        "getDefinitionResult" => to_value(broker.definition_result()),
        "getReferences" => {
            let p: PositionParams = parse(params)?;
            broker.get_references(&p.filename, p.line, p.idx, p.module_only);
            Ok(Value::Null)
        }
        "getReferencesResult" => Ok(Value::String(broker.references_result())),
        "getIdentifierTypes" => {
            let p: LineRangeParams = parse(params)?;
            broker.get_identifier_types(&p.filename, p.start_line, p.end_line, p.flags);
            Ok(Value::Null)
        }
        "getIdentifierTypesResult" => Ok(Value::String(broker.identifier_types_result())),
        _ => {
            warn!(method, "unknown method");
            Err(ResponseError {
                code: METHOD_NOT_FOUND,
                message: format!("unknown method: {method}"),
            })
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, ResponseError> {
    serde_json::from_value(params).map_err(|err| ResponseError {
        code: INVALID_PARAMS,
        message: format!("invalid params: {err}"),
    })
}

fn to_value<T: Serialize>(value: T) -> Outcome {
    serde_json::to_value(value).map_err(|err| ResponseError {
        code: INTERNAL_ERROR,
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrokerConfig;
    use serde_json::json;

    fn broker() -> Broker {
        Broker::with_d_engine(&BrokerConfig {
            worker_threads: 1,
            ..BrokerConfig::default()
        })
        .unwrap()
    }

    fn call(broker: &Broker, method: &str, params: Value) -> Response {
        handle_request(
            broker,
            Request {
                id: 7,
                method: method.to_string(),
                params,
            },
        )
    }

    #[test]
    fn test_invalid_json_line() {
        let response = handle_line(&broker(), "{not json");
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
    }

    #[test]
    fn test_unknown_method() {
        let response = call(&broker(), "frobnicate", Value::Null);
        assert_eq!(response.id, 7);
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn test_invalid_params() {
        let response = call(&broker(), "getParseErrors", json!({"file": "a.d"}));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_module_not_found_uses_code_one() {
        let response = call(&broker(), "getParseErrors", json!({"filename": "a.d"}));
        let error = response.error.unwrap();
        assert_eq!(error.code, 1);
        assert_eq!(error.message, "module not found: a.d");
    }

    #[test]
    fn test_update_then_parse_errors() {
        let broker = broker();
        let update = call(
            &broker,
            "updateModule",
            json!({"filename": "a.d", "text": "void f(){}"}),
        );
        assert_eq!(update.result, Some(Value::Null));

        let errors = call(&broker, "getParseErrors", json!({"filename": "a.d"}));
        assert_eq!(errors.result, Some(json!("")));
    }

    #[test]
    fn test_not_implemented_is_internal_error() {
        let response = call(&broker(), "getParameterStorageLocs", json!({"filename": "a.d"}));
        assert_eq!(response.error.unwrap().code, INTERNAL_ERROR);
    }

    #[test]
    fn test_fixed_answers() {
        let broker = broker();
        assert_eq!(
            call(&broker, "getLastMessage", Value::Null).result,
            Some(json!("__no_message__"))
        );
        assert_eq!(
            call(&broker, "getDocumentOutline", json!({"filename": "a.d"})).result,
            Some(json!(""))
        );
        assert_eq!(
            call(&broker, "getTipResult", Value::Null).result,
            Some(json!({
                "startLine": 0,
                "startColumn": 0,
                "endLine": 0,
                "endColumn": 0,
                "text": "__pending__"
            }))
        );
    }

    #[test]
    fn test_response_serialization_omits_absent_members() {
        let text = serde_json::to_string(&Response::ok(3, json!("x"))).unwrap();
        assert_eq!(text, r#"{"id":3,"result":"x"}"#);
        let text = serde_json::to_string(&Response::err(4, 1, "module not found: a.d")).unwrap();
        assert_eq!(
            text,
            r#"{"id":4,"error":{"code":1,"message":"module not found: a.d"}}"#
        );
    }
}
