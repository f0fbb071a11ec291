// ── Result streams ──
//
// Each dispatched command gets its own `ResultStream`: a single-outcome
// replaying stream that also exposes the command it came from. The
// `ResultMultiplexer` consumes the command stream in order on one task
// and hands every `ResultStream` to each open selection through that
// selection's own unbounded queue; a selection filters by category.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::{Command, CommandOutput};
use crate::error::DriverError;
use crate::replay::{Outcome, ReplayStream};
use crate::router::ActionRouter;

// ── ResultStream ─────────────────────────────────────────────────────

/// Outcome of one dispatched command.
///
/// Cheaply cloneable; all clones share the same outcome. The backend call
/// was issued when the stream was created, whether or not anybody ever
/// subscribes.
#[derive(Clone)]
pub struct ResultStream {
    command: Arc<Command>,
    outcome: Outcome<CommandOutput>,
}

impl ResultStream {
    /// Issue `command` through `router` and start settling its outcome.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(router: &ActionRouter, command: Command) -> Self {
        let pending = router.dispatch(&command);
        Self {
            command: Arc::new(command),
            outcome: Outcome::spawn(pending),
        }
    }

    /// The command this stream reports on.
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn category(&self) -> Option<&str> {
        self.command.category()
    }

    /// Subscribe: yields exactly one `Ok` or one `Err`, then ends.
    pub fn subscribe(&self) -> ReplayStream<CommandOutput> {
        self.outcome.subscribe()
    }

    /// Wait for the outcome.
    pub async fn outcome(&self) -> Result<CommandOutput, DriverError> {
        self.outcome.wait().await
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_settled()
    }
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("command", &self.command.tag())
            .field("category", &self.command.category())
            .field("settled", &self.is_settled())
            .finish()
    }
}

// ── ResultMultiplexer ────────────────────────────────────────────────

/// Fans dispatched commands' Result Streams out to selections.
///
/// Every selection's sender is dropped when the command stream ends,
/// which ends each selection once it has drained.
#[derive(Clone)]
pub struct ResultMultiplexer {
    selections: Arc<Mutex<Fanout>>,
    drained: CancellationToken,
}

#[derive(Default)]
struct Fanout {
    senders: Vec<mpsc::UnboundedSender<ResultStream>>,
    closed: bool,
}

impl ResultMultiplexer {
    /// Start consuming `commands` on a background task. Each command is
    /// dispatched in arrival order. Must be called from within a tokio
    /// runtime.
    pub fn attach<S>(router: ActionRouter, commands: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Command> + Send + 'static,
    {
        let mux = Self {
            selections: Arc::new(Mutex::new(Fanout::default())),
            drained: CancellationToken::new(),
        };
        tokio::spawn(dispatch_task(mux.clone(), router, commands, cancel));
        mux
    }

    /// Result Streams published from now on; `None` selects all of them,
    /// `Some(category)` only those whose command carries that category.
    pub fn select(&self, category: Option<&str>) -> Selection {
        let mut fanout = self.fanout();
        let live = if fanout.closed {
            None
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            fanout.senders.push(tx);
            Some(rx)
        };
        Selection {
            category: category.map(str::to_owned),
            live,
        }
    }

    /// Resolves once the command stream has ended (or was cancelled) and
    /// every command in it has been dispatched.
    pub async fn dispatched(&self) {
        self.drained.cancelled().await;
    }

    /// Number of selections still attached.
    pub fn selection_count(&self) -> usize {
        let mut fanout = self.fanout();
        fanout.senders.retain(|tx| !tx.is_closed());
        fanout.senders.len()
    }

    fn publish(&self, result: &ResultStream) {
        // Dropped selections are pruned; with none left the command still ran.
        self.fanout()
            .senders
            .retain(|tx| tx.send(result.clone()).is_ok());
    }

    fn close(&self) {
        let mut fanout = self.fanout();
        fanout.closed = true;
        fanout.senders.clear();
        drop(fanout);
        self.drained.cancel();
    }

    fn fanout(&self) -> std::sync::MutexGuard<'_, Fanout> {
        self.selections.lock().expect("selection list lock poisoned")
    }
}

async fn dispatch_task<S>(
    mux: ResultMultiplexer,
    router: ActionRouter,
    commands: S,
    cancel: CancellationToken,
) where
    S: Stream<Item = Command> + Send + 'static,
{
    let mut commands = std::pin::pin!(commands);
    let mut count: u64 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = commands.next() => {
                let Some(command) = next else { break };
                count += 1;
                mux.publish(&ResultStream::dispatch(&router, command));
            }
        }
    }

    debug!(dispatched = count, "command stream finished");
    mux.close();
}

// ── Selection ────────────────────────────────────────────────────────

/// Stream of Result Streams, optionally filtered by category.
///
/// Commands without a category never match a named selection.
pub struct Selection {
    category: Option<String>,
    live: Option<mpsc::UnboundedReceiver<ResultStream>>,
}

impl Selection {
    fn matches(&self, result: &ResultStream) -> bool {
        match &self.category {
            None => true,
            Some(category) => result.category() == Some(category.as_str()),
        }
    }
}

impl Stream for Selection {
    type Item = ResultStream;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(live) = this.live.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(live.poll_recv(cx)) {
                Some(result) => {
                    if this.matches(&result) {
                        return Poll::Ready(Some(result));
                    }
                }
                None => {
                    this.live = None;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use blaze_backend::MemoryBackend;
    use futures_util::stream;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    use super::*;
    use crate::command::factory;

    fn router() -> (MemoryBackend, ActionRouter) {
        let memory = MemoryBackend::new();
        (memory.clone(), ActionRouter::new(Arc::new(memory)))
    }

    #[tokio::test]
    async fn late_subscriber_gets_the_outcome() {
        let (_memory, router) = router();
        let result = ResultStream::dispatch(&router, factory::set("a", json!(1)));
        assert_eq!(result.outcome().await, Ok(CommandOutput::Done));

        let replayed: Vec<_> = result.subscribe().collect().await;
        assert_eq!(replayed, vec![Ok(CommandOutput::Done)]);
    }

    #[tokio::test]
    async fn unsubscribed_commands_still_run() {
        let (memory, router) = router();
        let (tx, rx) = mpsc::channel(8);
        let mux = ResultMultiplexer::attach(router, ReceiverStream::new(rx), CancellationToken::new());

        tx.send(factory::set("a", json!(1))).await.unwrap();
        drop(tx);
        mux.dispatched().await;

        assert_eq!(memory.calls("set").len(), 1);
    }

    #[tokio::test]
    async fn selection_filters_by_category() {
        let (_memory, router) = router();
        let (tx, rx) = mpsc::channel(8);
        let mux = ResultMultiplexer::attach(router, ReceiverStream::new(rx), CancellationToken::new());
        let login = mux.select(Some("login"));
        let all = mux.select(None);

        tx.send(factory::sign_in_anonymously().with_category("login")).await.unwrap();
        tx.send(factory::set("a", json!(1))).await.unwrap();
        tx.send(factory::sign_out().with_category("logout")).await.unwrap();
        drop(tx);

        let login: Vec<_> = login.collect().await;
        let all: Vec<_> = all.collect().await;
        assert_eq!(login.len(), 1);
        assert_eq!(login[0].command().tag(), "SignInAnonymously");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let (memory, router) = router();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let commands = stream::iter(vec![factory::go_offline()]);
        let mux = ResultMultiplexer::attach(router, commands, cancel);

        mux.dispatched().await;
        assert!(memory.journal().is_empty());
        assert!(mux.select(None).next().await.is_none());
    }

    #[tokio::test]
    async fn selection_keeps_every_result_beyond_any_buffer() {
        let (memory, router) = router();
        let (tx, rx) = mpsc::channel(16);
        let mux = ResultMultiplexer::attach(router, ReceiverStream::new(rx), CancellationToken::new());
        let all = mux.select(None);

        for n in 0..300 {
            tx.send(factory::set(format!("items/{n}"), json!(n))).await.unwrap();
        }
        drop(tx);
        mux.dispatched().await;

        let results: Vec<_> = all.collect().await;
        assert_eq!(results.len(), 300);
        assert_eq!(memory.calls("set").len(), 300);
    }

    #[tokio::test]
    async fn dropped_selections_are_pruned() {
        let (_memory, router) = router();
        let (tx, rx) = mpsc::channel(8);
        let mux = ResultMultiplexer::attach(router, ReceiverStream::new(rx), CancellationToken::new());
        let kept = mux.select(None);
        drop(mux.select(Some("login")));
        assert_eq!(mux.selection_count(), 1);

        tx.send(factory::sign_out()).await.unwrap();
        drop(tx);
        let results: Vec<_> = kept.collect().await;
        assert_eq!(results.len(), 1);
    }
}
