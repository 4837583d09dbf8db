//! Typing-effect scheduler.
//!
//! Throttles the visual release of already-received text instead of
//! flashing it in bulk: chunks are split into tokens (whitespace runs kept
//! as their own tokens) and queued, and a single self-rescheduling release
//! task emits one token per delay tick. `clear` cancels the pending timer
//! synchronously; tokens scheduled before a clear never land after it.

use super::clock::{Clock, TokioClock};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Delay for tokens that are pure whitespace. Overrides every other rule.
const WHITESPACE_DELAY_MS: u64 = 20;
/// Base delay range, sampled uniformly per token.
const BASE_DELAY_MIN_MS: u64 = 80;
const BASE_DELAY_MAX_MS: u64 = 120;
/// Extra delay for long tokens and tokens containing brackets.
const LONG_TOKEN_DELAY_MS: u64 = 50;
/// Extra delay for tokens consisting solely of punctuation.
const PUNCTUATION_DELAY_MS: u64 = 200;
/// Extra delay for tokens carrying a fenced-code marker.
const CODE_FENCE_DELAY_MS: u64 = 100;
/// Token length above which the long-token delay applies.
const LONG_TOKEN_CHARS: usize = 8;

/// Callback receiving each released token.
///
/// Must not call back into the scheduler; release happens while the
/// scheduler holds its internal lock.
pub type TypingSink = Arc<dyn Fn(String) + Send + Sync>;

/// Splits a chunk on whitespace boundaries, keeping whitespace runs as
/// their own tokens so spacing is replayed faithfully.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_whitespace = None;

    for ch in text.chars() {
        let whitespace = ch.is_whitespace();
        if in_whitespace != Some(whitespace) && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        in_whitespace = Some(whitespace);
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Computes the release delay for one token.
///
/// Pure whitespace is fast-tracked; otherwise a uniform base delay is
/// extended for long/bracketed tokens, punctuation-only tokens, and
/// fenced-code markers.
pub fn release_delay<R: Rng>(token: &str, rng: &mut R) -> Duration {
    if token.chars().all(char::is_whitespace) {
        return Duration::from_millis(WHITESPACE_DELAY_MS);
    }

    let mut millis = rng.gen_range(BASE_DELAY_MIN_MS..BASE_DELAY_MAX_MS);
    if token.chars().count() > LONG_TOKEN_CHARS || token.contains(['(', ')', '[', ']', '{', '}'])
    {
        millis += LONG_TOKEN_DELAY_MS;
    }
    if token.chars().all(|c| c.is_ascii_punctuation()) {
        millis += PUNCTUATION_DELAY_MS;
    }
    if token.contains("```") {
        millis += CODE_FENCE_DELAY_MS;
    }
    Duration::from_millis(millis)
}

struct SchedulerState {
    queue: VecDeque<String>,
    /// True while a release task owns the queue (including the token it
    /// has popped but not yet emitted).
    releasing: bool,
    cancel: CancellationToken,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    /// Bumped on every `clear`; a release task only acts while the epoch
    /// it was spawned under is still current.
    epoch: AtomicU64,
    settled: Notify,
    clock: Arc<dyn Clock>,
    sink: TypingSink,
}

/// Paces release of decoded text at a human-typing cadence.
///
/// One scheduler serves one active stream. Dropping the scheduler cancels
/// any pending timer; an uncancelled timer could mutate a transcript for
/// a view that no longer exists.
pub struct TypingScheduler {
    inner: Arc<SchedulerInner>,
}

impl TypingScheduler {
    /// Creates a scheduler on the tokio timer.
    pub fn new(sink: TypingSink) -> Self {
        Self::with_clock(sink, Arc::new(TokioClock))
    }

    /// Creates a scheduler with an injected clock.
    pub fn with_clock(sink: TypingSink, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState {
                    queue: VecDeque::new(),
                    releasing: false,
                    cancel: CancellationToken::new(),
                }),
                epoch: AtomicU64::new(0),
                settled: Notify::new(),
                clock,
                sink,
            }),
        }
    }

    /// Queues a text chunk for word-level release.
    pub fn push_chunk(&self, text: &str) {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }

        let spawn = {
            let mut state = self.inner.state.lock().expect("typing scheduler lock");
            state.queue.extend(tokens);
            if state.releasing {
                None
            } else {
                state.releasing = true;
                Some((state.cancel.clone(), self.inner.epoch.load(Ordering::SeqCst)))
            }
        };

        if let Some((cancel, epoch)) = spawn {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(run_release_task(inner, cancel, epoch));
        }
    }

    /// Empties the queue and cancels the pending timer synchronously.
    ///
    /// No token scheduled before the clear is released after it.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock().expect("typing scheduler lock");
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.queue.clear();
        state.releasing = false;
        drop(state);
        self.inner.settled.notify_waiters();
    }

    /// Number of tokens still waiting for release.
    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().expect("typing scheduler lock").queue.len()
    }

    /// True when the queue is empty and no token release is in flight.
    pub fn is_settled(&self) -> bool {
        let state = self.inner.state.lock().expect("typing scheduler lock");
        state.queue.is_empty() && !state.releasing
    }

    /// Waits until the visible output has caught up with everything
    /// queued. Finalizing a transcript before this resolves would truncate
    /// what the user sees being typed.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for TypingScheduler {
    fn drop(&mut self) {
        self.clear();
    }
}

/// The single release task: pops one token, sleeps its delay, emits it,
/// reschedules itself for the next token. Exits when the queue drains or
/// the epoch it was spawned under is cleared away.
async fn run_release_task(inner: Arc<SchedulerInner>, cancel: CancellationToken, epoch: u64) {
    loop {
        let token = {
            let mut state = inner.state.lock().expect("typing scheduler lock");
            if inner.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            match state.queue.pop_front() {
                Some(token) => token,
                None => {
                    state.releasing = false;
                    drop(state);
                    inner.settled.notify_waiters();
                    return;
                }
            }
        };

        let delay = release_delay(&token, &mut rand::thread_rng());
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = inner.clock.sleep(delay) => {}
        }

        {
            // Emit under the lock so a concurrent clear either lands
            // before the epoch check or waits until the token is out.
            let state = inner.state.lock().expect("typing scheduler lock");
            if inner.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            (inner.sink)(token);
            drop(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::{mpsc, oneshot};

    /// Hand-cranked clock: every sleep parks until the test releases it.
    struct ManualClock {
        sleepers: Mutex<VecDeque<oneshot::Sender<()>>>,
        arrived: Notify,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sleepers: Mutex::new(VecDeque::new()),
                arrived: Notify::new(),
            })
        }

        async fn wait_for_sleeper(&self) {
            loop {
                let notified = self.arrived.notified();
                if !self.sleepers.lock().unwrap().is_empty() {
                    return;
                }
                notified.await;
            }
        }

        fn release_next(&self) {
            if let Some(tx) = self.sleepers.lock().unwrap().pop_front() {
                let _ = tx.send(());
            }
        }
    }

    impl Clock for ManualClock {
        fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
            let (tx, rx) = oneshot::channel();
            self.sleepers.lock().unwrap().push_back(tx);
            self.arrived.notify_one();
            Box::pin(async move {
                let _ = rx.await;
            })
        }
    }

    fn channel_sink() -> (TypingSink, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: TypingSink = Arc::new(move |token| {
            let _ = tx.send(token);
        });
        (sink, rx)
    }

    #[test]
    fn test_tokenize_keeps_whitespace_runs() {
        assert_eq!(
            tokenize("a bb ccccccccc!"),
            vec!["a", " ", "bb", " ", "ccccccccc!"]
        );
        assert_eq!(tokenize("one\n\n  two"), vec!["one", "\n\n  ", "two"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_release_delay_whitespace_overrides_everything() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            release_delay("  \n ", &mut rng),
            Duration::from_millis(WHITESPACE_DELAY_MS)
        );
    }

    #[test]
    fn test_release_delay_punctuation_only() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = release_delay("!", &mut rng).as_millis() as u64;
        assert!(delay >= BASE_DELAY_MIN_MS + PUNCTUATION_DELAY_MS);
        assert!(delay < BASE_DELAY_MAX_MS + PUNCTUATION_DELAY_MS);
    }

    #[test]
    fn test_release_delay_long_and_bracketed_tokens() {
        let mut rng = StdRng::seed_from_u64(7);
        let long = release_delay("ccccccccc", &mut rng).as_millis() as u64;
        assert!(long >= BASE_DELAY_MIN_MS + LONG_TOKEN_DELAY_MS);

        let bracketed = release_delay("f(x)", &mut rng).as_millis() as u64;
        assert!(bracketed >= BASE_DELAY_MIN_MS + LONG_TOKEN_DELAY_MS);

        let fence = release_delay("```rust", &mut rng).as_millis() as u64;
        assert!(fence >= BASE_DELAY_MIN_MS + CODE_FENCE_DELAY_MS);
    }

    #[test]
    fn test_release_delay_plain_word_stays_in_base_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let delay = release_delay("word", &mut rng).as_millis() as u64;
            assert!((BASE_DELAY_MIN_MS..BASE_DELAY_MAX_MS).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_tokens_released_in_order() {
        let clock = ManualClock::new();
        let (sink, mut rx) = channel_sink();
        let scheduler = TypingScheduler::with_clock(sink, clock.clone());

        scheduler.push_chunk("a bb ccccccccc!");
        assert!(!scheduler.is_settled());

        for expected in ["a", " ", "bb", " ", "ccccccccc!"] {
            clock.wait_for_sleeper().await;
            clock.release_next();
            assert_eq!(rx.recv().await.as_deref(), Some(expected));
        }

        scheduler.settled().await;
        assert_eq!(scheduler.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_timer() {
        let clock = ManualClock::new();
        let (sink, mut rx) = channel_sink();
        let scheduler = TypingScheduler::with_clock(sink, clock.clone());

        scheduler.push_chunk("never shown");
        clock.wait_for_sleeper().await;

        scheduler.clear();
        assert_eq!(scheduler.queue_len(), 0);
        assert!(scheduler.is_settled());

        // Fire the timer that predates the clear; its token must not land.
        clock.release_next();
        let outcome =
            tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(outcome.is_err(), "token released after clear");
    }

    #[tokio::test]
    async fn test_push_after_clear_starts_fresh() {
        let clock = ManualClock::new();
        let (sink, mut rx) = channel_sink();
        let scheduler = TypingScheduler::with_clock(sink, clock.clone());

        scheduler.push_chunk("old");
        clock.wait_for_sleeper().await;
        scheduler.clear();

        scheduler.push_chunk("new");
        clock.wait_for_sleeper().await;
        clock.release_next();

        // Only the post-clear token comes out.
        assert_eq!(rx.recv().await.as_deref(), Some("new"));
        scheduler.settled().await;
    }

    #[tokio::test]
    async fn test_settled_waits_for_in_flight_release() {
        let clock = ManualClock::new();
        let (sink, mut rx) = channel_sink();
        let scheduler = TypingScheduler::with_clock(sink, clock.clone());

        scheduler.push_chunk("x");
        clock.wait_for_sleeper().await;
        // Queue is empty but the release is in flight.
        assert_eq!(scheduler.queue_len(), 0);
        assert!(!scheduler.is_settled());

        clock.release_next();
        assert_eq!(rx.recv().await.as_deref(), Some("x"));
        scheduler.settled().await;
        assert!(scheduler.is_settled());
    }
}
