//! Web 层常量定义
//!
//! 定义钩子名、容器键和配置键

// ==================== 钩子名 ====================

/// REST 初始化事件，资源式路由在此事件中注册
pub const REST_API_INIT: &str = "rest_api_init";

/// 已登录用户的动作钩子前缀
pub const AJAX_HOOK_PREFIX: &str = "ajax_";

/// 未登录用户的动作钩子前缀
pub const AJAX_NOPRIV_HOOK_PREFIX: &str = "ajax_nopriv_";

// ==================== 容器键 ====================

/// 绑定替换阶段
pub const BINDINGS_STAGE: &str = "bindings";

/// 请求日志阶段
pub const REQUEST_LOG_STAGE: &str = "request.log";

/// 请求 ID 阶段
pub const REQUEST_ID_STAGE: &str = "request.id";

/// 异常翻译器
pub const EXCEPTION_HANDLER: &str = "exception.handler";

/// 外部触发机制（`Arc<dyn Platform>`）
pub const PLATFORM: &str = "platform";

/// 进程内触发机制（`LocalPlatform`）
pub const LOCAL_PLATFORM: &str = "platform.local";

// ==================== 配置键 ====================

/// REST 路由的默认命名空间
pub const ROUTING_REST_NAMESPACE: &str = "routing.rest_namespace";

/// 所有路由共用的中间件
pub const ROUTING_MIDDLEWARE: &str = "routing.middleware";

/// 是否在错误响应中暴露内部错误信息
pub const APP_DEBUG: &str = "app.debug";

// ==================== 其他 ====================

pub const DEFAULT_REST_NAMESPACE: &str = "api";

pub const REQUEST_ID_HEADER: &str = "x-request-id";
