//! 全局异常处理
//!
//! 路由的失败边界把所有 [`Fault`] 交给 [`ExceptionHandler::render`]，它的输出就是本次触发的响应。
//!
//! 默认实现 [`ExceptionHandlerRegistry`] 依次询问按优先级排序的
//! [`GlobalExceptionHandler`]，都不处理时生成标准 JSON 错误响应：
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T10:00:00+00:00",
//!   "status": 404,
//!   "error": "Not Found",
//!   "message": "No Widget found where id = '42'",
//!   "path": "/api/widgets/42"
//! }
//! ```

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Fault;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// 异常到响应的翻译器，自身不允许失败
pub trait ExceptionHandler: Send + Sync {
    fn render(&self, request: &Request, fault: &Fault) -> Response;
}

/// 全局异常处理器
///
/// # 示例
///
/// ```ignore
/// struct MissingWidgetHandler;
///
/// impl GlobalExceptionHandler for MissingWidgetHandler {
///     fn name(&self) -> &str {
///         "MissingWidgetHandler"
///     }
///
///     fn can_handle(&self, fault: &Fault) -> bool {
///         fault.is_entity_not_found()
///     }
///
///     fn handle(&self, fault: &Fault, request: &Request) -> Option<ErrorResponse> {
///         Some(ErrorResponse::new(StatusCode::GONE, "Gone", fault.to_string(), request.path()))
///     }
/// }
/// ```
pub trait GlobalExceptionHandler: Send + Sync {
    fn name(&self) -> &str;

    /// 优先级，数字越小优先级越高
    fn priority(&self) -> i32 {
        100
    }

    fn can_handle(&self, fault: &Fault) -> bool;

    /// 返回 `Some(ErrorResponse)` 表示已处理，返回 `None` 表示交给下一个处理器
    fn handle(&self, fault: &Fault, request: &Request) -> Option<ErrorResponse>;
}

/// 标准错误响应格式
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(
        status: StatusCode,
        error: impl Into<String>,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: status.as_u16(),
            error: error.into(),
            message: message.into(),
            path: path.into(),
            trace: None,
            details: None,
        }
    }

    pub fn with_trace(mut self, trace: String) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match serde_json::to_value(&self) {
            Ok(body) => Response::json(status, body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize error response");
                Response::text(status, self.message)
            }
        }
    }
}

/// 异常处理器注册表
pub struct ExceptionHandlerRegistry {
    handlers: Vec<Arc<dyn GlobalExceptionHandler>>,
    debug: bool,
}

impl ExceptionHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            debug: false,
        }
    }

    /// 调试模式下 5xx 响应包含内部错误信息
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn register<H: GlobalExceptionHandler + 'static>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn GlobalExceptionHandler>) {
        self.handlers.push(handler);
        // 按优先级排序
        self.handlers.sort_by_key(|h| h.priority());
    }

    pub fn register_boxed(&mut self, handler: Box<dyn GlobalExceptionHandler>) {
        self.register_arc(Arc::from(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 处理异常，返回标准化的错误响应
    ///
    /// 依次尝试注册的处理器，都不处理时使用默认响应。
    pub fn handle(&self, fault: &Fault, request: &Request) -> ErrorResponse {
        for handler in &self.handlers {
            if !handler.can_handle(fault) {
                continue;
            }
            if let Some(response) = handler.handle(fault, request) {
                tracing::debug!(
                    handler = handler.name(),
                    error = %fault,
                    "Error handled by custom handler"
                );
                return response;
            }
        }

        self.default_error_response(fault, request)
    }

    fn default_error_response(&self, fault: &Fault, request: &Request) -> ErrorResponse {
        let status = fault.status();
        let error = status.canonical_reason().unwrap_or("Unknown Error");

        let message = if status.is_server_error() && !self.debug {
            error.to_string()
        } else {
            fault.to_string()
        };

        let mut response = ErrorResponse::new(status, error, message, request.path());
        if let Fault::EntityNotFound {
            entity,
            field,
            value,
        } = fault
        {
            response = response.with_details(json!({
                "entity": entity,
                "field": field,
                "value": value,
            }));
        }
        if self.debug {
            response = response.with_trace(format!("{:?}", fault));
        }
        response
    }
}

impl Default for ExceptionHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionHandler for ExceptionHandlerRegistry {
    fn render(&self, request: &Request, fault: &Fault) -> Response {
        self.handle(fault, request).into_response()
    }
}

impl std::fmt::Debug for ExceptionHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionHandlerRegistry")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name().to_string()).collect::<Vec<_>>(),
            )
            .field("debug", &self.debug)
            .finish()
    }
}

// ============================================================================
// 编译时注册
// ============================================================================

/// 异常处理器注册信息
pub struct ExceptionHandlerRegistration {
    pub name: &'static str,
    pub create: fn() -> Box<dyn GlobalExceptionHandler>,
}

impl ExceptionHandlerRegistration {
    pub const fn new(name: &'static str, create: fn() -> Box<dyn GlobalExceptionHandler>) -> Self {
        Self { name, create }
    }
}

inventory::collect!(ExceptionHandlerRegistration);

/// 构建异常处理器注册表，包含所有编译时登记的处理器
pub fn build_exception_handler_registry_from_inventory(debug: bool) -> ExceptionHandlerRegistry {
    let mut registry = ExceptionHandlerRegistry::new().with_debug(debug);

    for registration in inventory::iter::<ExceptionHandlerRegistration> {
        registry.register_boxed((registration.create)());
        tracing::debug!(handler = registration.name, "Exception handler registered");
    }

    tracing::info!(
        handlers = registry.len(),
        "Exception handler discovery completed"
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Gone;

    impl GlobalExceptionHandler for Gone {
        fn name(&self) -> &str {
            "Gone"
        }

        fn can_handle(&self, fault: &Fault) -> bool {
            fault.is_entity_not_found()
        }

        fn handle(&self, fault: &Fault, request: &Request) -> Option<ErrorResponse> {
            Some(ErrorResponse::new(StatusCode::GONE, "Gone", fault.to_string(), request.path()))
        }
    }

    fn missing_widget() -> Fault {
        Fault::EntityNotFound {
            entity: "Widget".into(),
            field: "id".into(),
            value: "9".into(),
        }
    }

    #[test]
    fn test_default_response_for_missing_entity() {
        let registry = ExceptionHandlerRegistry::new();
        let response = registry.render(&Request::get("/api/widgets/9"), &missing_widget());

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.json_body().unwrap();
        assert_eq!(body["message"], "No Widget found where id = '9'");
        assert_eq!(body["path"], "/api/widgets/9");
        assert_eq!(body["details"]["field"], "id");
        assert!(body.get("trace").is_none());
    }

    #[test]
    fn test_server_errors_hidden_unless_debug() {
        let fault = Fault::from(anyhow::anyhow!("password=hunter2"));
        let request = Request::get("/api/login");

        let quiet = ExceptionHandlerRegistry::new().render(&request, &fault);
        assert_eq!(quiet.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(quiet.json_body().unwrap()["message"], "Internal Server Error");

        let loud = ExceptionHandlerRegistry::new()
            .with_debug(true)
            .render(&request, &fault);
        assert_eq!(loud.json_body().unwrap()["message"], "password=hunter2");
    }

    #[test]
    fn test_custom_handler_takes_precedence() {
        let mut registry = ExceptionHandlerRegistry::new();
        registry.register(Gone);
        assert_eq!(registry.len(), 1);

        let request = Request::get("/api/widgets/9");
        assert_eq!(
            registry.render(&request, &missing_widget()).status(),
            StatusCode::GONE
        );
        assert_eq!(
            registry.render(&request, &Fault::bad_request("nope")).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
