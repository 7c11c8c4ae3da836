//! 请求模型
//!
//! 请求携带方法、路径、请求头、输入数据，以及路由捕获的路径参数。
//! 路径参数最初是原始字符串，绑定替换阶段会把实体参数原地替换为解析出的实体。

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::{Map, Value};

use crate::route::Route;

/// 替换后的实体
#[derive(Clone)]
pub struct EntityValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl EntityValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value: Arc::new(value),
        }
    }

    /// 实体的类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }
}

impl std::fmt::Debug for EntityValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EntityValue").field(&self.type_name).finish()
    }
}

/// 路径参数值
#[derive(Debug, Clone)]
pub enum RouteValue {
    /// 捕获到的原始字符串
    Raw(String),
    /// 绑定替换后的实体
    Entity(EntityValue),
}

impl RouteValue {
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            RouteValue::Raw(raw) => Some(raw),
            RouteValue::Entity(_) => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, RouteValue::Entity(_))
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            RouteValue::Entity(entity) => entity.downcast::<T>(),
            RouteValue::Raw(_) => None,
        }
    }
}

impl From<&str> for RouteValue {
    fn from(raw: &str) -> Self {
        RouteValue::Raw(raw.to_string())
    }
}

impl From<String> for RouteValue {
    fn from(raw: String) -> Self {
        RouteValue::Raw(raw)
    }
}

/// 请求
#[derive(Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: HeaderMap,
    input: Map<String, Value>,
    params: BTreeMap<String, RouteValue>,
    args: Vec<Value>,
    route: Option<Arc<Route>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            input: Map::new(),
            params: BTreeMap::new(),
            args: Vec::new(),
            route: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// 添加请求头
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// 添加输入数据
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    /// 添加原始路径参数
    pub fn with_param(mut self, name: impl Into<String>, raw: impl Into<String>) -> Self {
        self.params.insert(name.into(), RouteValue::Raw(raw.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// 单个输入值
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.input.get(key)
    }

    pub fn all_input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// 原始路径参数（已替换为实体的参数返回 None）
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(RouteValue::as_raw)
    }

    pub fn route_param(&self, name: &str) -> Option<&RouteValue> {
        self.params.get(name)
    }

    pub fn route_params(&self) -> &BTreeMap<String, RouteValue> {
        &self.params
    }

    /// 设置（或替换）一个路径参数
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<RouteValue>) {
        self.params.insert(name.into(), value.into());
    }

    /// 合并一组原始路径参数，同名参数被覆盖
    pub fn merge_parameters<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, raw) in params {
            self.params.insert(name.into(), RouteValue::Raw(raw.into()));
        }
    }

    /// 合并平台送来的请求：方法和路径以入站请求为准，请求头和输入叠加
    pub fn merge_from(&mut self, inbound: &Request) {
        self.method = inbound.method.clone();
        self.path = inbound.path.clone();
        for (name, value) in inbound.headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        for (key, value) in &inbound.input {
            self.input.insert(key.clone(), value.clone());
        }
        for (name, value) in &inbound.params {
            self.params.insert(name.clone(), value.clone());
        }
    }

    /// 按类型取出替换后的实体
    pub fn entity<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.params.get(name).and_then(RouteValue::downcast::<T>)
    }

    /// 触发机制附带的额外参数
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn push_args(&mut self, args: impl IntoIterator<Item = Value>) {
        self.args.extend(args);
    }

    /// 当前匹配的路由
    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn set_route(&mut self, route: Arc<Route>) {
        self.route = Some(route);
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("route", &self.route.as_ref().map(|route| route.uri().to_string()))
            .finish()
    }
}
