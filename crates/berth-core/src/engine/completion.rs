use tokio::sync::oneshot;

use crate::domain::errors::BerthError;

/// Outcome of a submitted operation. Close operations resolve before
/// `submit` returns; open operations resolve when the spawned task
/// finishes.
#[derive(Debug)]
pub struct Completion {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Ready(Result<(), BerthError>),
    Pending(oneshot::Receiver<Result<(), BerthError>>),
}

impl Completion {
    pub fn resolved(result: Result<(), BerthError>) -> Self {
        Self {
            inner: Inner::Ready(result),
        }
    }

    pub fn ok() -> Self {
        Self::resolved(Ok(()))
    }

    pub(crate) fn pending(rx: oneshot::Receiver<Result<(), BerthError>>) -> Self {
        Self {
            inner: Inner::Pending(rx),
        }
    }

    /// Returns the result without waiting if it is already available.
    pub fn now(self) -> Option<Result<(), BerthError>> {
        match self.inner {
            Inner::Ready(result) => Some(result),
            Inner::Pending(_) => None,
        }
    }

    pub async fn wait(self) -> Result<(), BerthError> {
        match self.inner {
            Inner::Ready(result) => result,
            Inner::Pending(rx) => rx.await.unwrap_or_else(|_| {
                Err(BerthError::Other(
                    "scheduled task dropped before completing".into(),
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_completion_resolves_immediately() {
        assert!(Completion::ok().wait().await.is_ok());
        let failed = Completion::resolved(Err(BerthError::Other("boom".into())));
        assert!(failed.wait().await.is_err());
    }

    #[tokio::test]
    async fn pending_completion_resolves_when_sender_fires() {
        let (tx, rx) = oneshot::channel();
        let completion = Completion::pending(rx);
        tx.send(Ok(())).unwrap();
        assert!(completion.wait().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_sender_surfaces_an_error() {
        let (tx, rx) = oneshot::channel::<Result<(), BerthError>>();
        drop(tx);
        assert!(Completion::pending(rx).wait().await.is_err());
    }

    #[test]
    fn now_only_reports_ready_results() {
        assert!(Completion::ok().now().is_some());
        let (_tx, rx) = oneshot::channel();
        assert!(Completion::pending(rx).now().is_none());
    }
}
