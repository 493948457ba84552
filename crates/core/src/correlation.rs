//! Request/response correlation for callback-driven brokerage APIs.
//!
//! Requests are tagged with sequential integer ids. Responses arrive later as
//! events on a channel and are folded into the matching record until every
//! record reports itself complete, or the poll gives up.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A record that knows whether its callback-filled fields have all arrived.
pub trait Completion {
    fn is_complete(&self) -> bool;
}

/// Request id → record, in issue order.
#[derive(Debug, Clone)]
pub struct RequestTable<R> {
    next_id: i32,
    records: BTreeMap<i32, R>,
}

impl<R> RequestTable<R> {
    /// Creates an empty table handing out ids starting at `first_id`.
    #[must_use]
    pub fn new(first_id: i32) -> Self {
        Self {
            next_id: first_id,
            records: BTreeMap::new(),
        }
    }

    /// Stores `record` under the next free id and returns that id.
    pub fn issue(&mut self, record: R) -> i32 {
        let id = self.next_id;
        self.records.insert(id, record);
        self.next_id += 1;
        id
    }

    /// The id the next call to [`RequestTable::issue`] will return.
    pub fn peek_id(&self) -> i32 {
        self.next_id
    }

    pub fn get(&self, id: i32) -> Option<&R> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut R> {
        self.records.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &R)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (i32, &mut R)> {
        self.records.iter_mut().map(|(id, r)| (*id, r))
    }

    /// Consumes the table, yielding records in id order.
    pub fn into_records(self) -> Vec<(i32, R)> {
        self.records.into_iter().collect()
    }
}

impl<R: Completion> RequestTable<R> {
    /// Number of records still waiting for data.
    pub fn missing(&self) -> usize {
        self.records.values().filter(|r| !r.is_complete()).count()
    }
}

/// When a convergence poll is allowed to stop before every record is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Keep polling until nothing is missing (bounded by `max_wait`).
    AllFilled,
    /// Also stop once the missing count is unchanged between two polls.
    Stagnation,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
    pub termination: Termination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Complete,
    Stagnated { missing: usize },
    TimedOut { missing: usize },
    /// The event channel closed, no more data can arrive.
    Disconnected { missing: usize },
}

impl PollOutcome {
    pub fn missing(&self) -> usize {
        match self {
            Self::Complete => 0,
            Self::Stagnated { missing }
            | Self::TimedOut { missing }
            | Self::Disconnected { missing } => *missing,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Folds pending events into `table` every `settings.interval` until the
/// table converges or the termination rule fires.
pub async fn poll_until_converged<R, E, F>(
    table: &mut RequestTable<R>,
    events: &mut UnboundedReceiver<E>,
    settings: &PollSettings,
    mut apply: F,
) -> PollOutcome
where
    R: Completion,
    F: FnMut(&mut RequestTable<R>, E),
{
    let started = Instant::now();
    let mut previous: Option<usize> = None;

    loop {
        let open = drain(table, events, &mut apply);
        let missing = table.missing();
        info!(missing, total = table.len(), "{} instruments of {} missing", missing, table.len());

        if missing == 0 {
            return PollOutcome::Complete;
        }
        if !open {
            warn!(missing, "Event channel closed before all data arrived");
            return PollOutcome::Disconnected { missing };
        }
        if settings.termination == Termination::Stagnation && previous == Some(missing) {
            debug!(missing, "Missing count unchanged since last poll");
            return PollOutcome::Stagnated { missing };
        }
        if started.elapsed() >= settings.max_wait {
            warn!(missing, waited_secs = settings.max_wait.as_secs(), "Gave up waiting for data");
            return PollOutcome::TimedOut { missing };
        }

        previous = Some(missing);
        tokio::time::sleep(settings.interval).await;
    }
}

/// Returns false once the sender side is gone.
fn drain<R, E, F>(table: &mut RequestTable<R>, events: &mut UnboundedReceiver<E>, apply: &mut F) -> bool
where
    F: FnMut(&mut RequestTable<R>, E),
{
    loop {
        match events.try_recv() {
            Ok(event) => apply(table, event),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Finished,
    TimedOut,
    Disconnected,
}

/// Feeds events to `handle` until it returns `true` (an end marker was seen),
/// `timeout` elapses or the channel closes.
pub async fn recv_until<E, F>(
    events: &mut UnboundedReceiver<E>,
    timeout: Duration,
    mut handle: F,
) -> WaitOutcome
where
    F: FnMut(E) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => {
                if handle(event) {
                    return WaitOutcome::Finished;
                }
            }
            Ok(None) => return WaitOutcome::Disconnected,
            Err(_) => return WaitOutcome::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[derive(Debug, Default)]
    struct Leg {
        con_id: Option<i64>,
    }

    impl Completion for Leg {
        fn is_complete(&self) -> bool {
            self.con_id.is_some()
        }
    }

    fn settings(termination: Termination) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(5),
            max_wait: Duration::from_millis(200),
            termination,
        }
    }

    fn fill(table: &mut RequestTable<Leg>, (id, con_id): (i32, i64)) {
        if let Some(leg) = table.get_mut(id) {
            leg.con_id = Some(con_id);
        }
    }

    #[test]
    fn ids_are_sequential_from_base() {
        let mut table = RequestTable::new(100);
        assert_eq!(table.issue(Leg::default()), 100);
        assert_eq!(table.issue(Leg::default()), 101);
        assert_eq!(table.peek_id(), 102);
        assert_eq!(table.missing(), 2);
    }

    #[tokio::test]
    async fn completes_when_all_records_filled() {
        let mut table = RequestTable::new(1);
        let a = table.issue(Leg::default());
        let b = table.issue(Leg::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send((a, 11)).unwrap();
        tx.send((b, 12)).unwrap();

        let outcome = poll_until_converged(&mut table, &mut rx, &settings(Termination::AllFilled), fill).await;

        assert_eq!(outcome, PollOutcome::Complete);
        assert_eq!(table.get(b).unwrap().con_id, Some(12));
    }

    #[tokio::test]
    async fn stagnation_stops_after_two_equal_polls() {
        let mut table = RequestTable::new(1);
        let a = table.issue(Leg::default());
        table.issue(Leg::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send((a, 11)).unwrap();

        let outcome = poll_until_converged(&mut table, &mut rx, &settings(Termination::Stagnation), fill).await;

        assert_eq!(outcome, PollOutcome::Stagnated { missing: 1 });
        drop(tx);
    }

    #[tokio::test]
    async fn all_filled_times_out() {
        let mut table = RequestTable::new(1);
        table.issue(Leg::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<(i32, i64)>();

        let outcome = poll_until_converged(&mut table, &mut rx, &settings(Termination::AllFilled), fill).await;

        assert_eq!(outcome, PollOutcome::TimedOut { missing: 1 });
        drop(tx);
    }

    #[tokio::test]
    async fn closed_channel_ends_the_poll() {
        let mut table = RequestTable::new(1);
        table.issue(Leg::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<(i32, i64)>();
        drop(tx);

        let outcome = poll_until_converged(&mut table, &mut rx, &settings(Termination::AllFilled), fill).await;

        assert_eq!(outcome, PollOutcome::Disconnected { missing: 1 });
    }

    #[tokio::test]
    async fn unknown_ids_are_ignored() {
        let mut table = RequestTable::new(1);
        let a = table.issue(Leg::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send((999, 1)).unwrap();
        tx.send((a, 2)).unwrap();

        let outcome = poll_until_converged(&mut table, &mut rx, &settings(Termination::AllFilled), fill).await;

        assert!(outcome.is_complete());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn recv_until_stops_on_end_marker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for v in [1, 2, 3, 0, 4] {
            tx.send(v).unwrap();
        }
        let mut seen = Vec::new();

        let outcome = recv_until(&mut rx, Duration::from_millis(100), |v| {
            seen.push(v);
            v == 0
        })
        .await;

        assert_eq!(outcome, WaitOutcome::Finished);
        assert_eq!(seen, vec![1, 2, 3, 0]);
    }

    #[tokio::test]
    async fn recv_until_times_out() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<i32>();
        let outcome = recv_until(&mut rx, Duration::from_millis(10), |_| false).await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }
}
