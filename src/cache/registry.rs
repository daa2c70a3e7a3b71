//! Operation registry: binds operation names to executors and tag functions.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::traits::{Tag, TagSet};
use crate::error::{Error, Result};

/// A boxed future that returns a JSON result
pub type ExecutorFuture = BoxFuture<'static, Result<Value>>;

type ExecutorFn = Box<dyn Fn(Value) -> ExecutorFuture + Send + Sync>;

type ProvidesFn = Box<dyn Fn(&Value, &Value) -> TagSet + Send + Sync>;

type InvalidatesFn = Box<dyn Fn(Option<&Value>, &Value, Option<&Error>) -> TagSet + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
  Query,
  Mutation,
}

impl fmt::Display for OperationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OperationKind::Query => f.write_str("query"),
      OperationKind::Mutation => f.write_str("mutation"),
    }
  }
}

/// A registered query or mutation.
///
/// Tag functions must only look at their arguments: the cache may call them
/// after the request that produced the result has finished.
pub struct OperationDef {
  name: String,
  kind: OperationKind,
  executor: ExecutorFn,
  provides: Option<ProvidesFn>,
  invalidates: Option<InvalidatesFn>,
}

impl OperationDef {
  fn new<F, Fut>(name: &str, kind: OperationKind, executor: F) -> Self
  where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    Self {
      name: name.to_string(),
      kind,
      executor: Box::new(move |args| executor(args).boxed()),
      provides: None,
      invalidates: None,
    }
  }

  /// Define a read operation.
  pub fn query<F, Fut>(name: &str, executor: F) -> Self
  where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    Self::new(name, OperationKind::Query, executor)
  }

  /// Define a write operation.
  pub fn mutation<F, Fut>(name: &str, executor: F) -> Self
  where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    Self::new(name, OperationKind::Mutation, executor)
  }

  /// Compute the tags a query result provides from the result and args.
  pub fn provides_tags<F>(mut self, f: F) -> Self
  where
    F: Fn(&Value, &Value) -> TagSet + Send + Sync + 'static,
  {
    self.provides = Some(Box::new(f));
    self
  }

  /// Provide a fixed set of tags regardless of result.
  pub fn provides(self, tags: impl IntoIterator<Item = Tag>) -> Self {
    let tags: TagSet = tags.into_iter().collect();
    self.provides_tags(move |_, _| tags.clone())
  }

  /// Compute the tags a mutation invalidates. Called with the result on
  /// success and with the error on failure.
  pub fn invalidates_tags<F>(mut self, f: F) -> Self
  where
    F: Fn(Option<&Value>, &Value, Option<&Error>) -> TagSet + Send + Sync + 'static,
  {
    self.invalidates = Some(Box::new(f));
    self
  }

  /// Invalidate a fixed set of tags whether the mutation succeeds or fails.
  pub fn invalidates(self, tags: impl IntoIterator<Item = Tag>) -> Self {
    let tags: TagSet = tags.into_iter().collect();
    self.invalidates_tags(move |_, _, _| tags.clone())
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> OperationKind {
    self.kind
  }

  pub(crate) fn execute(&self, args: Value) -> ExecutorFuture {
    (self.executor)(args)
  }

  /// Tags for a successful query result. Without a `provides` function the
  /// result is tagged with the operation name.
  pub(crate) fn provided_tags(&self, result: &Value, args: &Value) -> TagSet {
    match &self.provides {
      Some(f) => f(result, args),
      None => TagSet::from([Tag::kind(self.name.clone())]),
    }
  }

  pub(crate) fn invalidated_tags(
    &self,
    result: Option<&Value>,
    args: &Value,
    error: Option<&Error>,
  ) -> TagSet {
    match &self.invalidates {
      Some(f) => f(result, args, error),
      None => TagSet::new(),
    }
  }
}

impl fmt::Debug for OperationDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OperationDef")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("provides", &self.provides.is_some())
      .field("invalidates", &self.invalidates.is_some())
      .finish_non_exhaustive()
  }
}

/// Adapt a typed async function into a JSON executor.
///
/// Arguments that fail to decode are reported as `InvalidArguments` without
/// calling `f`.
pub fn typed<A, R, F, Fut>(f: F) -> impl Fn(Value) -> ExecutorFuture + Send + Sync + 'static
where
  A: DeserializeOwned,
  R: Serialize,
  F: Fn(A) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<R>> + Send + 'static,
{
  move |args: Value| {
    let call = serde_json::from_value::<A>(args)
      .map(&f)
      .map_err(|e| Error::InvalidArguments(e.to_string()));

    async move {
      let result = call?.await?;
      serde_json::to_value(result).map_err(|e| Error::Decode(e.to_string()))
    }
    .boxed()
  }
}

/// Name-to-definition mapping consulted by the cache.
#[derive(Debug, Default)]
pub struct OperationRegistry {
  operations: HashMap<String, Arc<OperationDef>>,
}

impl OperationRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, def: OperationDef) -> Result<()> {
    if self.operations.contains_key(def.name()) {
      return Err(Error::DuplicateOperation(def.name().to_string()));
    }
    self.operations.insert(def.name().to_string(), Arc::new(def));
    Ok(())
  }

  pub fn resolve(&self, name: &str) -> Result<Arc<OperationDef>> {
    self
      .operations
      .get(name)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("operation `{}`", name)))
  }

  /// Registered operation names, sorted.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn echo(name: &str) -> OperationDef {
    OperationDef::query(name, |args| async move { Ok(args) })
  }

  #[test]
  fn test_register_and_resolve() {
    let mut registry = OperationRegistry::new();
    registry.register(echo("getProjects")).unwrap();

    let op = registry.resolve("getProjects").unwrap();
    assert_eq!(op.name(), "getProjects");
    assert_eq!(op.kind(), OperationKind::Query);
    assert_eq!(registry.names(), vec!["getProjects"]);
  }

  #[test]
  fn test_duplicate_registration_fails() {
    let mut registry = OperationRegistry::new();
    registry.register(echo("getProjects")).unwrap();

    let err = registry.register(echo("getProjects")).unwrap_err();
    assert_eq!(err, Error::DuplicateOperation("getProjects".to_string()));
  }

  #[test]
  fn test_resolve_unknown_is_not_found() {
    let registry = OperationRegistry::new();
    assert!(matches!(registry.resolve("nope"), Err(Error::NotFound(_))));
  }

  #[test]
  fn test_default_provided_tag_is_operation_name() {
    let op = echo("getAuthUser");
    let tags = op.provided_tags(&json!(null), &json!(null));
    assert_eq!(tags, TagSet::from([Tag::kind("getAuthUser")]));
  }

  #[test]
  fn test_invalidates_sees_error() {
    let op = OperationDef::mutation("update", |_| async { Err(Error::NotFound("x".into())) })
      .invalidates_tags(|result, _, error| {
        if result.is_none() && error.is_some() {
          TagSet::from([Tag::kind("Failed")])
        } else {
          TagSet::new()
        }
      });

    let err = Error::NotFound("x".into());
    assert_eq!(
      op.invalidated_tags(None, &json!({}), Some(&err)),
      TagSet::from([Tag::kind("Failed")])
    );
    assert!(op.invalidated_tags(Some(&json!(1)), &json!({}), None).is_empty());
  }

  #[tokio::test]
  async fn test_typed_executor_decodes_args() {
    let op = OperationDef::query(
      "double",
      typed(|n: u64| async move { Ok::<_, Error>(n * 2) }),
    );

    assert_eq!(op.execute(json!(21)).await.unwrap(), json!(42));

    let err = op.execute(json!("nope")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(_)));
  }
}
