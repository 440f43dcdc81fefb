//! Procedure router: maps contract paths to async handlers
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use kdx_core::{ErrorCode, FromRich, IntoRich, OperationKind, Procedure, RichValue, RpcError};

type Handler = Arc<dyn Fn(RichValue) -> BoxFuture<'static, Result<RichValue, RpcError>> + Send + Sync>;

#[derive(Clone)]
struct Registered {
    kind: OperationKind,
    handler: Handler,
}

#[derive(Clone, Default)]
pub struct ProcedureRouter {
    procedures: HashMap<&'static str, Registered>,
}

impl ProcedureRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `handler` for procedure `P`. The marker value only selects `P`.
    pub fn procedure<P, F, Fut>(mut self, _procedure: P, handler: F) -> Self
    where
        P: Procedure,
        F: Fn(P::Input) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P::Output, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Handler = Arc::new(
            move |input: RichValue| -> BoxFuture<'static, Result<RichValue, RpcError>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let input = P::Input::from_rich(input)
                        .map_err(|e| RpcError::bad_request(format!("invalid input: {}", e)))?;
                    let output = handler.as_ref()(input).await?;
                    output
                        .into_rich()
                        .map_err(|e| RpcError::internal(format!("unencodable output: {}", e)))
                })
            },
        );

        let registered = Registered {
            kind: P::KIND,
            handler: erased,
        };
        if self.procedures.insert(P::PATH, registered).is_some() {
            tracing::warn!(path = P::PATH, "procedure mounted twice, keeping the last handler");
        }
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.procedures.contains_key(path)
    }

    pub fn paths(&self) -> Vec<&'static str> {
        let mut paths: Vec<_> = self.procedures.keys().copied().collect();
        paths.sort_unstable();
        paths
    }

    pub async fn call(
        &self,
        kind: OperationKind,
        path: &str,
        input: RichValue,
    ) -> Result<RichValue, RpcError> {
        let registered = self.procedures.get(path).ok_or_else(|| {
            RpcError::not_found(format!("no procedure on path \"{}\"", path)).with_path(path)
        })?;
        if registered.kind != kind {
            return Err(RpcError::new(
                ErrorCode::MethodNotSupported,
                format!("{} is a {}, called as a {}", path, registered.kind, kind),
            )
            .with_path(path));
        }

        (registered.handler)(input).await.map_err(|err| match err.path {
            Some(_) => err,
            None => err.with_path(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Add;

    impl Procedure for Add {
        const PATH: &'static str = "math.add";
        const KIND: OperationKind = OperationKind::Query;
        type Input = Vec<f64>;
        type Output = f64;
    }

    struct Reset;

    impl Procedure for Reset {
        const PATH: &'static str = "math.reset";
        const KIND: OperationKind = OperationKind::Mutation;
        type Input = ();
        type Output = bool;
    }

    fn router() -> ProcedureRouter {
        ProcedureRouter::new()
            .procedure(Add, |numbers: Vec<f64>| async move { Ok(numbers.iter().sum::<f64>()) })
            .procedure(Reset, |_| async move { Err(RpcError::internal("reset unavailable")) })
    }

    #[tokio::test]
    async fn test_dispatch() {
        let input = RichValue::Array(vec![RichValue::Number(1.0), RichValue::Number(2.5)]);
        let out = router().call(OperationKind::Query, "math.add", input).await.unwrap();
        assert_eq!(out, RichValue::Number(3.5));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let err = router()
            .call(OperationKind::Query, "math.sub", RichValue::Undefined)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.path.as_deref(), Some("math.sub"));
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let err = router()
            .call(OperationKind::Query, "math.reset", RichValue::Undefined)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MethodNotSupported);
    }

    #[tokio::test]
    async fn test_bad_input_and_handler_errors() {
        let err = router()
            .call(OperationKind::Query, "math.add", RichValue::string("1,2"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);

        let err = router()
            .call(OperationKind::Mutation, "math.reset", RichValue::Undefined)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalServerError);
        assert_eq!(err.path.as_deref(), Some("math.reset"));
    }

    #[test]
    fn test_paths_are_sorted() {
        assert_eq!(router().paths(), vec!["math.add", "math.reset"]);
        assert!(router().contains("math.add"));
    }
}
