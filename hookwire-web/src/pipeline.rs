//! 中间件管道
//!
//! 把一组有序的阶段右折叠到终点上，得到一个“洋葱”形状的调用链：
//! 列表中的第一个阶段在最外层，最先执行。每个阶段拿到载荷和 `next`，
//! 可以先改写载荷再调用 `next`，也可以根本不调用 `next` 直接返回自己的结果，
//! 还可以在 `next` 返回之后再加工结果。
//!
//! 管道本身不捕获任何失败，失败边界由调用方（路由）负责。

use std::any::type_name;
use std::sync::Arc;

use hookwire_core::{Container, ContainerError};

use crate::error::{Fault, StageResult};

/// 调用链的剩余部分
pub struct Next<'a, P, T> {
    inner: Box<dyn FnOnce(P) -> StageResult<T> + 'a>,
}

impl<'a, P, T> Next<'a, P, T> {
    pub fn new(f: impl FnOnce(P) -> StageResult<T> + 'a) -> Self {
        Self { inner: Box::new(f) }
    }

    /// 继续执行剩余的调用链
    pub fn run(self, payload: P) -> StageResult<T> {
        (self.inner)(payload)
    }
}

/// 管道阶段
pub trait Stage<P, T>: Send + Sync {
    fn handle(&self, payload: P, next: Next<'_, P, T>) -> StageResult<T>;
}

/// 以闭包形式提供的阶段
pub struct StageFn<P, T> {
    f: Arc<dyn for<'a> Fn(P, Next<'a, P, T>) -> StageResult<T> + Send + Sync>,
}

impl<P, T> StageFn<P, T> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(P, Next<'a, P, T>) -> StageResult<T> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl<P, T> Clone for StageFn<P, T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<P, T> Stage<P, T> for StageFn<P, T> {
    fn handle(&self, payload: P, next: Next<'_, P, T>) -> StageResult<T> {
        (self.f)(payload, next)
    }
}

/// 管道中的一个阶段描述
pub enum Pipe<P, T> {
    /// 直接提供的阶段
    Stage(Arc<dyn Stage<P, T>>),
    /// 通过容器按键解析的阶段
    Named(String),
}

impl<P: 'static, T: 'static> Pipe<P, T> {
    pub fn stage(stage: impl Stage<P, T> + 'static) -> Self {
        Pipe::Stage(Arc::new(stage))
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: for<'a> Fn(P, Next<'a, P, T>) -> StageResult<T> + Send + Sync + 'static,
    {
        Pipe::Stage(Arc::new(StageFn::new(f)))
    }

    pub fn named(key: impl Into<String>) -> Self {
        Pipe::Named(key.into())
    }

    /// 解析为可执行的阶段
    ///
    /// 容器中的值可以是 `Arc<dyn Stage>`（调用其 `handle`），
    /// 也可以是 [`StageFn`]（直接调用）。
    pub fn resolve(&self, container: &Container) -> StageResult<Arc<dyn Stage<P, T>>> {
        let key = match self {
            Pipe::Stage(stage) => return Ok(Arc::clone(stage)),
            Pipe::Named(key) => key,
        };

        let instance = container.get(key)?;
        let instance = match instance.downcast::<Arc<dyn Stage<P, T>>>() {
            Ok(stage) => return Ok(Arc::clone(&*stage)),
            Err(instance) => instance,
        };
        match instance.downcast::<StageFn<P, T>>() {
            Ok(callable) => Ok(Arc::new(StageFn::clone(&callable))),
            Err(_) => Err(Fault::Container(ContainerError::TypeMismatch {
                key: key.clone(),
                expected: type_name::<Arc<dyn Stage<P, T>>>(),
            })),
        }
    }

    fn describe(&self) -> &str {
        match self {
            Pipe::Stage(_) => "<inline>",
            Pipe::Named(key) => key,
        }
    }
}

impl<P: 'static, T: 'static> From<&str> for Pipe<P, T> {
    fn from(key: &str) -> Self {
        Pipe::named(key)
    }
}

impl<P: 'static, T: 'static> From<String> for Pipe<P, T> {
    fn from(key: String) -> Self {
        Pipe::named(key)
    }
}

/// 管道
pub struct Pipeline<P, T> {
    container: Arc<Container>,
    passable: Option<P>,
    pipes: Vec<Pipe<P, T>>,
}

impl<P: 'static, T: 'static> Pipeline<P, T> {
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            container,
            passable: None,
            pipes: Vec::new(),
        }
    }

    /// 设置载荷
    pub fn send(mut self, payload: P) -> Self {
        self.passable = Some(payload);
        self
    }

    /// 设置阶段列表（替换之前的列表）
    pub fn through<I>(mut self, pipes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Pipe<P, T>>,
    {
        self.pipes = pipes.into_iter().map(Into::into).collect();
        self
    }

    /// 追加一个阶段
    pub fn pipe(mut self, pipe: impl Into<Pipe<P, T>>) -> Self {
        self.pipes.push(pipe.into());
        self
    }

    /// 组装调用链并立即执行
    ///
    /// 阶段在轮到它时才通过容器解析。
    pub fn then<F>(self, destination: F) -> StageResult<T>
    where
        F: FnOnce(P) -> StageResult<T>,
    {
        let Pipeline {
            container,
            passable,
            pipes,
        } = self;

        let payload = passable
            .ok_or_else(|| Fault::Action(anyhow::anyhow!("Pipeline payload was not set")))?;
        let container = container.as_ref();

        let chain = pipes
            .iter()
            .rev()
            .fold(Next::new(destination), |next, pipe| {
                Next::new(move |payload| {
                    tracing::trace!(stage = pipe.describe(), "Entering stage");
                    let stage = pipe.resolve(container)?;
                    stage.handle(payload, next)
                })
            });

        chain.run(payload)
    }
}

impl<P, T> std::fmt::Debug for Pipeline<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("pipes", &self.pipes.len())
            .field("has_payload", &self.passable.is_some())
            .finish()
    }
}
