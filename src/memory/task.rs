//! # Task bodies and the function-backed implementation.
//!
//! [`Task`] is a named, async body that takes JSON arguments and returns a JSON
//! result. [`TaskFn`] wraps a closure `F: Fn(Value) -> Fut`, producing a fresh
//! future per invocation. The common handle type is [`TaskRef`].
//!
//! ## Example
//! ```rust
//! use serde_json::{Value, json};
//! use taskpulse::{TaskError, TaskFn, TaskRef};
//!
//! let t: TaskRef = TaskFn::arc("multiply", |args: Value| async move {
//!     let a = args[0].as_i64().ok_or_else(|| TaskError::fail("a"))?;
//!     let b = args[1].as_i64().ok_or_else(|| TaskError::fail("b"))?;
//!     Ok(json!(a * b))
//! });
//!
//! assert_eq!(t.name(), "multiply");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::TaskError;

/// Boxed future returned by [`Task::spawn`].
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<Value, TaskError>> + Send + 'static>>;

/// Shared handle to a task body.
pub type TaskRef = Arc<dyn Task>;

/// A registered task body.
pub trait Task: Send + Sync + 'static {
    /// Name the task is registered and sent under.
    fn name(&self) -> &str;

    /// Creates the future for one invocation.
    fn spawn(&self, args: Value) -> BoxTaskFuture;
}

/// Function-backed task implementation.
///
/// Each invocation creates a **new** future owning its state; share state across
/// invocations explicitly with `Arc<...>` inside the closure.
#[derive(Debug)]
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the task and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, args: Value) -> BoxTaskFuture {
        Box::pin((self.f)(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn each_spawn_is_a_fresh_invocation() {
        let t: TaskRef = TaskFn::arc("echo", |args: Value| async move { Ok(args) });
        assert_eq!(t.spawn(json!(1)).await.unwrap(), json!(1));
        assert_eq!(t.spawn(json!("two")).await.unwrap(), json!("two"));
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let t: TaskRef = TaskFn::arc("fail", |_args: Value| async move {
            Err::<Value, _>(TaskError::fail("nope"))
        });
        assert_eq!(t.spawn(Value::Null).await, Err(TaskError::fail("nope")));
    }
}
