//! The receive loop around bound broker sessions, and the reconnect policy
//! that keeps binding new ones

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::pipeline::MessagePipeline;
use crate::mqtt::{Backoff, BrokerConnector, ConnectError, Connected, Disconnected, Message};

/// Anything that yields messages until its session ends
#[async_trait]
pub trait MessageSource: Send {
    async fn next_message(&mut self) -> Result<Message, ConnectError>;
}

#[async_trait]
impl MessageSource for BrokerConnector<Connected> {
    async fn next_message(&mut self) -> Result<Message, ConnectError> {
        self.recv().await
    }
}

/// The unbound side of a connector: binding consumes it and yields a
/// session, releasing the session gives it back.
#[async_trait]
pub trait SessionLink: Sized + Send {
    type Bound: MessageSource;

    async fn bind(self) -> Result<Self::Bound, ConnectError>;

    fn release(bound: Self::Bound) -> Self;
}

#[async_trait]
impl SessionLink for BrokerConnector<Disconnected> {
    type Bound = BrokerConnector<Connected>;

    async fn bind(self) -> Result<Self::Bound, ConnectError> {
        self.connect().await
    }

    fn release(bound: Self::Bound) -> Self {
        bound.disconnect()
    }
}

/// Why [`run_session`] returned
#[derive(Debug)]
pub enum SessionEnd {
    Shutdown,
    Lost(ConnectError),
}

/// Feeds messages through the pipeline one at a time until the session is
/// lost or shutdown is requested. Reconnecting is left to the caller.
pub async fn run_session<S: MessageSource>(
    source: &mut S,
    pipeline: &mut MessagePipeline,
    shutdown: &CancellationToken,
) -> SessionEnd {
    let mut processed: u64 = 0;
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => None,
            next = source.next_message() => Some(next),
        };

        match next {
            None => {
                info!("Shutdown requested after {} message(s)", processed);
                return SessionEnd::Shutdown;
            }
            Some(Ok(message)) => {
                pipeline.process(&message).await;
                processed += 1;
            }
            Some(Err(e)) => {
                warn!("Session ended after {} message(s): {}", processed, e);
                return SessionEnd::Lost(e);
            }
        }
    }
}

/// Binds, runs the session, backs off and binds again until shutdown.
///
/// A successful bind resets `backoff`. Failing to bind any candidate is
/// returned as an error, whether it happens at startup or after a lost
/// session.
pub async fn supervise<L: SessionLink>(
    mut link: L,
    pipeline: &mut MessagePipeline,
    backoff: &mut Backoff,
    shutdown: &CancellationToken,
) -> Result<(), ConnectError> {
    loop {
        let mut bound = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            result = link.bind() => result?,
        };
        backoff.reset();

        let end = run_session(&mut bound, pipeline, shutdown).await;
        link = L::release(bound);

        match end {
            SessionEnd::Shutdown => return Ok(()),
            SessionEnd::Lost(e) => {
                let delay = backoff.next_delay();
                warn!("Lost broker session ({}), reconnecting in {:?}", e, delay);
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
