//! Logger link: reports each call on its way up and its result on the way
//! down. Purely observational.
use async_trait::async_trait;
use std::time::{Duration, Instant};

use kdx_core::{Link, Mode, Next, Operation, OperationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Before the call is forwarded
    Up,
    /// After the result came back
    Down,
}

pub struct LogEvent<'a> {
    pub direction: Direction,
    pub op: &'a Operation,
    /// Present on `Down` only
    pub result: Option<&'a OperationResult>,
    pub elapsed: Option<Duration>,
}

impl LogEvent<'_> {
    pub fn is_error(&self) -> bool {
        matches!(self.result, Some(Err(_)))
    }
}

type Enabled = Box<dyn Fn(&LogEvent<'_>) -> bool + Send + Sync>;

pub struct LoggerLink {
    enabled: Enabled,
}

impl LoggerLink {
    pub fn new<F>(enabled: F) -> Self
    where
        F: Fn(&LogEvent<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            enabled: Box::new(enabled),
        }
    }

    /// Everything in development; elsewhere only failed results.
    pub fn for_mode(mode: Mode) -> Self {
        Self::new(move |event| default_enabled(mode, event))
    }

    fn emit(&self, event: &LogEvent<'_>) {
        if !(self.enabled)(event) {
            return;
        }
        let op = event.op;
        match (event.direction, event.result) {
            (Direction::Up, _) => {
                tracing::info!(
                    id = op.id,
                    kind = %op.kind,
                    path = %op.path,
                    ">> {} #{} {}",
                    op.kind,
                    op.id,
                    op.path
                );
            }
            (Direction::Down, Some(Err(err))) => {
                tracing::error!(
                    id = op.id,
                    kind = %op.kind,
                    path = %op.path,
                    elapsed_ms = event.elapsed.map(|d| d.as_millis() as u64),
                    error = %err,
                    "<< {} #{} {}",
                    op.kind,
                    op.id,
                    op.path
                );
            }
            (Direction::Down, _) => {
                tracing::info!(
                    id = op.id,
                    kind = %op.kind,
                    path = %op.path,
                    elapsed_ms = event.elapsed.map(|d| d.as_millis() as u64),
                    "<< {} #{} {}",
                    op.kind,
                    op.id,
                    op.path
                );
            }
        }
    }
}

pub fn default_enabled(mode: Mode, event: &LogEvent<'_>) -> bool {
    mode.is_development() || (event.direction == Direction::Down && event.is_error())
}

#[async_trait]
impl Link for LoggerLink {
    fn id(&self) -> &'static str {
        "logger"
    }

    async fn handle(&self, op: Operation, next: Next<'_>) -> OperationResult {
        self.emit(&LogEvent {
            direction: Direction::Up,
            op: &op,
            result: None,
            elapsed: None,
        });

        let start = Instant::now();
        let result = next.run(op.clone()).await;

        self.emit(&LogEvent {
            direction: Direction::Down,
            op: &op,
            result: Some(&result),
            elapsed: Some(start.elapsed()),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdx_core::{KdxError, LinkChain, OperationKind, RichValue};
    use std::sync::{Arc, Mutex};

    struct Fixed(OperationResult);

    #[async_trait]
    impl Link for Fixed {
        fn id(&self) -> &'static str {
            "fixed"
        }

        fn terminating(&self) -> bool {
            true
        }

        async fn handle(&self, _op: Operation, _next: Next<'_>) -> OperationResult {
            self.0.clone()
        }
    }

    fn op() -> Operation {
        Operation::new(3, OperationKind::Mutation, "echo.value", RichValue::Null)
    }

    fn event<'a>(direction: Direction, op: &'a Operation, result: Option<&'a OperationResult>) -> LogEvent<'a> {
        LogEvent { direction, op, result, elapsed: None }
    }

    #[test]
    fn test_development_logs_everything() {
        let op = op();
        let ok: OperationResult = Ok(RichValue::Null);
        assert!(default_enabled(Mode::Development, &event(Direction::Up, &op, None)));
        assert!(default_enabled(Mode::Development, &event(Direction::Down, &op, Some(&ok))));
    }

    #[test]
    fn test_production_logs_only_failed_results() {
        let op = op();
        let ok: OperationResult = Ok(RichValue::Null);
        let failed: OperationResult = Err(KdxError::Transport("connection refused".to_string()));
        assert!(!default_enabled(Mode::Production, &event(Direction::Up, &op, None)));
        assert!(!default_enabled(Mode::Production, &event(Direction::Down, &op, Some(&ok))));
        assert!(default_enabled(Mode::Production, &event(Direction::Down, &op, Some(&failed))));
        assert!(default_enabled(Mode::Test, &event(Direction::Down, &op, Some(&failed))));
    }

    #[tokio::test]
    async fn test_logger_observes_without_altering() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let logger = LoggerLink::new(move |e| {
            recorder.lock().unwrap().push((e.direction, e.is_error()));
            true
        });

        let failure = KdxError::Http { status: 500, message: "boom".to_string() };
        let links: Vec<Arc<dyn Link>> = vec![Arc::new(logger), Arc::new(Fixed(Err(failure.clone())))];
        let chain = LinkChain::new(links).unwrap();

        let result = chain.execute(op()).await;
        assert_eq!(result, Err(failure));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Direction::Up, false), (Direction::Down, true)]
        );
    }
}
