// ── Replaying multicast streams ──
//
// One primitive backs every stream the driver hands out: reference
// events, session state and command outcomes. A `Replay<T>` remembers
// the most recent value (not the history) plus a terminal signal, and
// fans live values out to one unbounded queue per subscriber. A
// subscriber first sees the remembered value, then every live value in
// order, then the terminal signal. Nothing published after a subscriber
// attached is ever dropped for it.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::error::DriverError;

#[derive(Debug, Clone)]
enum Signal<T> {
    Next(T),
    Failed(DriverError),
    Completed,
}

#[derive(Debug, Clone)]
enum Terminal {
    Completed,
    Failed(DriverError),
}

struct State<T> {
    last: Option<T>,
    terminal: Option<Terminal>,
    subscribers: Vec<mpsc::UnboundedSender<Signal<T>>>,
}

/// Shared hub behind a replaying stream.
///
/// Publishing and subscribing both happen under the state lock, so a new
/// subscriber never misses a value published between its replay snapshot
/// and its live queue.
pub(crate) struct Replay<T> {
    state: Mutex<State<T>>,
}

impl<T: Clone + Send + 'static> Replay<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                last: None,
                terminal: None,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Publish a value. Ignored once the stream has terminated.
    pub(crate) fn push(&self, value: T) {
        let mut state = self.state.lock().expect("replay lock poisoned");
        if state.terminal.is_some() {
            return;
        }
        // Dropped subscribers are pruned here.
        state
            .subscribers
            .retain(|tx| tx.send(Signal::Next(value.clone())).is_ok());
        state.last = Some(value);
    }

    /// Terminate with an error. Returns `false` if already terminated.
    pub(crate) fn fail(&self, error: DriverError) -> bool {
        self.terminate(Terminal::Failed(error))
    }

    /// Terminate normally. Returns `false` if already terminated.
    pub(crate) fn complete(&self) -> bool {
        self.terminate(Terminal::Completed)
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        let mut state = self.state.lock().expect("replay lock poisoned");
        if state.terminal.is_some() {
            return false;
        }
        let signal = match &terminal {
            Terminal::Completed => Signal::Completed,
            Terminal::Failed(e) => Signal::Failed(e.clone()),
        };
        for tx in state.subscribers.drain(..) {
            let _ = tx.send(signal.clone());
        }
        state.terminal = Some(terminal);
        true
    }

    pub(crate) fn latest(&self) -> Option<T> {
        self.state
            .lock()
            .expect("replay lock poisoned")
            .last
            .clone()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.state
            .lock()
            .expect("replay lock poisoned")
            .terminal
            .is_some()
    }

    /// Live subscriber count, not counting ones dropped since the last push.
    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .expect("replay lock poisoned")
            .subscribers
            .len()
    }

    /// Attach a subscriber: replayed value first, then live signals.
    pub(crate) fn subscribe(&self) -> ReplayStream<T> {
        let mut state = self.state.lock().expect("replay lock poisoned");
        let mut replayed = VecDeque::with_capacity(2);
        if let Some(last) = &state.last {
            replayed.push_back(Signal::Next(last.clone()));
        }
        let live = match &state.terminal {
            Some(Terminal::Completed) => {
                replayed.push_back(Signal::Completed);
                None
            }
            Some(Terminal::Failed(e)) => {
                replayed.push_back(Signal::Failed(e.clone()));
                None
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                state.subscribers.push(tx);
                Some(rx)
            }
        };
        ReplayStream {
            replayed,
            live,
            finished: false,
        }
    }
}

// ── ReplayStream ─────────────────────────────────────────────────────

/// Subscriber side of a replaying stream.
///
/// Yields `Ok` values until the stream completes (end of stream) or fails
/// (one `Err`, then end of stream). Values queue up for a slow
/// subscriber rather than being skipped.
pub struct ReplayStream<T> {
    replayed: VecDeque<Signal<T>>,
    live: Option<mpsc::UnboundedReceiver<Signal<T>>>,
    finished: bool,
}

impl<T: Clone + Send + Unpin + 'static> Stream for ReplayStream<T> {
    type Item = Result<T, DriverError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        let signal = if let Some(signal) = this.replayed.pop_front() {
            signal
        } else {
            let Some(live) = this.live.as_mut() else {
                this.finished = true;
                return Poll::Ready(None);
            };
            match live.poll_recv(cx) {
                Poll::Ready(Some(signal)) => signal,
                Poll::Ready(None) => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        };
        Poll::Ready(match signal {
            Signal::Next(value) => Some(Ok(value)),
            Signal::Failed(error) => {
                this.finished = true;
                this.live = None;
                Some(Err(error))
            }
            Signal::Completed => {
                this.finished = true;
                this.live = None;
                None
            }
        })
    }
}

// ── Outcome ──────────────────────────────────────────────────────────

/// Single-outcome replaying stream: exactly one value or one error.
///
/// The producing future is spawned immediately, so the work happens
/// whether or not anybody subscribes. Every subscriber, including ones
/// attaching after settlement, observes the same outcome.
pub struct Outcome<T> {
    replay: Arc<Replay<T>>,
}

impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        Self {
            replay: Arc::clone(&self.replay),
        }
    }
}

impl<T: Clone + Send + Sync + Unpin + 'static> Outcome<T> {
    /// Settle from `pending` on a background task. Must be called from
    /// within a tokio runtime.
    pub(crate) fn spawn<F>(pending: F) -> Self
    where
        F: Future<Output = Result<T, DriverError>> + Send + 'static,
    {
        let replay = Arc::new(Replay::new());
        let settle = Arc::clone(&replay);
        tokio::spawn(async move {
            match pending.await {
                Ok(value) => {
                    settle.push(value);
                    settle.complete();
                }
                Err(error) => {
                    settle.fail(error);
                }
            }
        });
        Self { replay }
    }

    pub fn subscribe(&self) -> ReplayStream<T> {
        self.replay.subscribe()
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> Result<T, DriverError> {
        self.subscribe()
            .next()
            .await
            .unwrap_or(Err(DriverError::Closed))
    }

    pub fn is_settled(&self) -> bool {
        self.replay.is_terminated()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn late_subscriber_sees_last_value_only() {
        let replay = Replay::new();
        replay.push(1);
        replay.push(2);

        let mut sub = replay.subscribe();
        replay.push(3);

        assert_eq!(sub.next().await, Some(Ok(2)));
        assert_eq!(sub.next().await, Some(Ok(3)));
    }

    #[tokio::test]
    async fn failure_ends_every_subscriber() {
        let replay = Replay::new();
        let mut early = replay.subscribe();
        replay.push("a");
        assert!(replay.fail(DriverError::Closed));
        assert!(!replay.complete());

        assert_eq!(early.next().await, Some(Ok("a")));
        assert_eq!(early.next().await, Some(Err(DriverError::Closed)));
        assert_eq!(early.next().await, None);

        let mut late = replay.subscribe();
        assert_eq!(late.next().await, Some(Ok("a")));
        assert_eq!(late.next().await, Some(Err(DriverError::Closed)));
        assert_eq!(late.next().await, None);
    }

    #[tokio::test]
    async fn pushes_after_termination_are_ignored() {
        let replay = Replay::new();
        replay.push(1);
        replay.complete();
        replay.push(2);

        let values: Vec<_> = replay.subscribe().collect().await;
        assert_eq!(values, vec![Ok(1)]);
        assert_eq!(replay.latest(), Some(1));
    }

    #[tokio::test]
    async fn outcome_replays_after_settlement() {
        let outcome = Outcome::spawn(async { Ok::<_, DriverError>("done") });
        assert_eq!(outcome.wait().await, Ok("done"));
        assert!(outcome.is_settled());

        // Subscribing strictly after settlement still yields the value.
        let values: Vec<_> = outcome.subscribe().collect().await;
        assert_eq!(values, vec![Ok("done")]);
    }

    #[tokio::test]
    async fn outcome_carries_errors() {
        let outcome: Outcome<u8> = Outcome::spawn(async {
            Err(DriverError::UnknownCommand { tag: "Nope".into() })
        });
        assert_eq!(
            outcome.wait().await,
            Err(DriverError::UnknownCommand { tag: "Nope".into() })
        );
    }

    #[test]
    fn pending_subscriber_is_woken_by_push() {
        let replay = Replay::<u32>::new();
        let mut sub = replay.subscribe();
        let mut next = tokio_test::task::spawn(sub.next());
        tokio_test::assert_pending!(next.poll());

        replay.push(7);
        assert!(next.is_woken());
        assert_eq!(tokio_test::assert_ready!(next.poll()), Some(Ok(7)));
    }

    #[tokio::test]
    async fn slow_subscriber_receives_every_value() {
        let replay = Replay::new();
        let sub = replay.subscribe();
        for n in 0..1_000 {
            replay.push(n);
        }
        replay.complete();

        let values: Vec<_> = sub.map(Result::unwrap).collect().await;
        assert_eq!(values, (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn dropped_subscribers_are_pruned_on_push() {
        let replay = Replay::new();
        let kept = replay.subscribe();
        drop(replay.subscribe());
        assert_eq!(replay.subscriber_count(), 2);

        replay.push(1);
        assert_eq!(replay.subscriber_count(), 1);
        drop(kept);
    }
}
