use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::address::{Address, Context};

/// A remote address lookup service.
///
/// Implementations should stop work promptly once `signal` fires and
/// report [`ProviderError::Cancelled`]. [`Signal::guard`] does both.
pub trait Provider: Send + Sync + 'static {
    /// Short name recorded on every [`Address`] this provider returns.
    fn name(&self) -> &str;

    /// Look up candidates for `query`.
    fn search(
        &self,
        query: String,
        context: Context,
        signal: Signal,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Address>, ProviderError>> + Send + '_>>;
}

/// Errors returned by a [`Provider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The call was aborted through its [`Signal`].
    Cancelled,
    Network(String),
    Status { status: u16, body: String },
    Parse(String),
}

impl ProviderError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("request cancelled"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Status { status, body } if body.is_empty() => {
                write!(f, "service returned status {status}")
            }
            Self::Status { status, body } => write!(f, "service returned status {status}: {body}"),
            Self::Parse(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Create a linked [`Abort`] and [`Signal`].
#[must_use]
pub fn abort() -> (Abort, Signal) {
    // Nothing is ever sent: closing the channel is the event.
    let (tx, rx) = async_channel::bounded::<()>(1);
    (Abort { tx }, Signal { rx })
}

/// Fires the paired [`Signal`]. Dropping it fires as well.
#[derive(Debug)]
pub struct Abort {
    tx: async_channel::Sender<()>,
}

impl Abort {
    pub fn abort(&self) {
        self.tx.close();
    }
}

/// Cooperative cancellation handed to [`Provider::search`].
#[derive(Debug, Clone)]
pub struct Signal {
    rx: async_channel::Receiver<()>,
}

impl Signal {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.rx.is_closed()
    }

    /// Completes once the paired [`Abort`] fires.
    pub async fn aborted(&self) {
        while self.rx.recv().await.is_ok() {}
    }

    /// Run `fut` until it finishes or the signal fires, whichever is first.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        futures_lite::future::or(
            async {
                self.aborted().await;
                Err(ProviderError::Cancelled)
            },
            fut,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn abort_fires_signal() {
        let (abort, signal) = abort();
        assert!(!signal.is_aborted());
        abort.abort();
        assert!(signal.is_aborted());
        futures_lite::future::block_on(signal.aborted());
    }

    #[test]
    fn dropping_abort_fires_signal() {
        let (abort, signal) = abort();
        drop(abort);
        assert!(signal.is_aborted());
    }

    #[test]
    fn guard_passes_through_result() {
        let (_abort, signal) = abort();
        let out = futures_lite::future::block_on(signal.guard(async { Ok(7) }));
        assert_eq!(out, Ok(7));
    }

    #[test]
    fn guard_cancels_pending_work() {
        let (abort, signal) = abort();
        let out = async_io::block_on(async {
            futures_lite::future::zip(
                signal.guard(async {
                    async_io::Timer::after(Duration::from_secs(10)).await;
                    Ok(())
                }),
                async {
                    async_io::Timer::after(Duration::from_millis(10)).await;
                    abort.abort();
                },
            )
            .await
        });
        assert_eq!(out.0, Err(ProviderError::Cancelled));
    }

    #[test]
    fn display() {
        assert_eq!(ProviderError::Cancelled.to_string(), "request cancelled");
        assert_eq!(
            ProviderError::Status {
                status: 503,
                body: String::new()
            }
            .to_string(),
            "service returned status 503"
        );
    }
}
