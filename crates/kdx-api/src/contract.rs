//! The application's procedure contract.
//!
//! Marker types and their payloads live here so the server mounts them and
//! clients call them through the very same definitions.
use chrono::{DateTime, Utc};
use kdx_core::{
    take_field, FromRich, IntoRich, KdxError, OperationKind, Procedure, RichValue, RpcError,
    KDX_VERSION,
};

use crate::router::ProcedureRouter;

pub mod greeting {
    use super::*;

    /// `greeting.hello`: greets `text` (default "world")
    pub struct Hello;

    impl Procedure for Hello {
        const PATH: &'static str = "greeting.hello";
        const KIND: OperationKind = OperationKind::Query;
        type Input = HelloInput;
        type Output = Greeting;
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct HelloInput {
        pub text: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Greeting {
        pub greeting: String,
        pub at: DateTime<Utc>,
    }

    impl IntoRich for HelloInput {
        fn into_rich(self) -> Result<RichValue, KdxError> {
            Ok(RichValue::object().field("text", self.text.into_rich()?))
        }
    }

    impl FromRich for HelloInput {
        fn from_rich(value: RichValue) -> Result<Self, KdxError> {
            if value.is_nullish() {
                return Ok(Self::default());
            }
            let mut fields = value.into_object()?;
            Ok(Self {
                text: FromRich::from_rich(take_field(&mut fields, "text"))?,
            })
        }
    }

    impl IntoRich for Greeting {
        fn into_rich(self) -> Result<RichValue, KdxError> {
            Ok(RichValue::object()
                .field("greeting", self.greeting)
                .field("at", self.at))
        }
    }

    impl FromRich for Greeting {
        fn from_rich(value: RichValue) -> Result<Self, KdxError> {
            let mut fields = value.into_object()?;
            Ok(Self {
                greeting: FromRich::from_rich(take_field(&mut fields, "greeting"))?,
                at: FromRich::from_rich(take_field(&mut fields, "at"))?,
            })
        }
    }
}

pub mod health {
    use super::*;

    /// `health.check`
    pub struct Check;

    impl Procedure for Check {
        const PATH: &'static str = "health.check";
        const KIND: OperationKind = OperationKind::Query;
        type Input = ();
        type Output = HealthStatus;
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct HealthStatus {
        pub status: String,
        pub version: String,
        pub time: DateTime<Utc>,
    }

    impl IntoRich for HealthStatus {
        fn into_rich(self) -> Result<RichValue, KdxError> {
            Ok(RichValue::object()
                .field("status", self.status)
                .field("version", self.version)
                .field("time", self.time))
        }
    }

    impl FromRich for HealthStatus {
        fn from_rich(value: RichValue) -> Result<Self, KdxError> {
            let mut fields = value.into_object()?;
            Ok(Self {
                status: FromRich::from_rich(take_field(&mut fields, "status"))?,
                version: FromRich::from_rich(take_field(&mut fields, "version"))?,
                time: FromRich::from_rich(take_field(&mut fields, "time"))?,
            })
        }
    }
}

pub mod echo {
    use super::*;

    /// `echo.value`: returns its input as received
    pub struct Echo;

    impl Procedure for Echo {
        const PATH: &'static str = "echo.value";
        const KIND: OperationKind = OperationKind::Mutation;
        type Input = RichValue;
        type Output = RichValue;
    }

    /// `echo.reject`: always fails with BAD_REQUEST carrying the input
    pub struct Reject;

    impl Procedure for Reject {
        const PATH: &'static str = "echo.reject";
        const KIND: OperationKind = OperationKind::Mutation;
        type Input = String;
        type Output = ();
    }
}

/// Every procedure of the application, mounted.
pub fn app_router() -> ProcedureRouter {
    ProcedureRouter::new()
        .procedure(greeting::Hello, |input: greeting::HelloInput| async move {
            let text = input.text.unwrap_or_else(|| "world".to_string());
            if text.trim().is_empty() {
                return Err(RpcError::bad_request("text must not be blank"));
            }
            Ok(greeting::Greeting {
                greeting: format!("Hello {}", text),
                at: Utc::now(),
            })
        })
        .procedure(health::Check, |()| async move {
            Ok(health::HealthStatus {
                status: "ok".to_string(),
                version: KDX_VERSION.to_string(),
                time: Utc::now(),
            })
        })
        .procedure(echo::Echo, |value: RichValue| async move { Ok(value) })
        .procedure(echo::Reject, |message: String| async move {
            Err::<(), _>(RpcError::bad_request(message))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_procedure_is_mounted() {
        assert_eq!(
            app_router().paths(),
            vec!["echo.reject", "echo.value", "greeting.hello", "health.check"]
        );
    }

    #[test]
    fn test_hello_input_defaults_when_absent() {
        assert_eq!(
            greeting::HelloInput::from_rich(RichValue::Undefined).unwrap(),
            greeting::HelloInput::default()
        );
        let input = greeting::HelloInput { text: Some("kodix".to_string()) };
        assert_eq!(greeting::HelloInput::from_rich(input.clone().into_rich().unwrap()).unwrap(), input);
    }

    #[tokio::test]
    async fn test_blank_greeting_is_bad_request() {
        let input = greeting::HelloInput { text: Some("  ".to_string()) }.into_rich().unwrap();
        let err = app_router()
            .call(OperationKind::Query, "greeting.hello", input)
            .await
            .unwrap_err();
        assert_eq!(err.code, kdx_core::ErrorCode::BadRequest);
    }
}
