//! This module provides required fan-out/fan-in task features.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, Stream};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

/// Errors observed while collecting task results.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// A task completed with its own error.
    #[error(transparent)]
    Task(E),
    /// A task panicked.
    #[error(transparent)]
    Join(#[from] JoinError),
    /// The deadline elapsed before every task produced its item.
    #[error("{pending} of {expected} tasks still pending after deadline")]
    Deadline { expected: usize, pending: usize },
    /// Every task ended but some items were never produced.
    #[error("{pending} task results lost")]
    Lost { pending: usize },
}

/// A structured group of producer tasks funnelling their results into a single consumer.
///
/// Each spawned task produces exactly one item on success, pushed through a shared _multi-producer single-consumer_
/// channel. Items are then dequeued in the order tasks complete, not in the order they were spawned.
///
/// The channel is sized upfront so that no producer ever waits on a full channel, as long as no more tasks than
/// the given capacity are spawned. Tasks are all joined within the group: a failed or panicked task is reported
/// to the consumer as soon as it is observed, and dropping the group aborts every task still running.
///
/// # Example
/// ```
/// # tokio_test::block_on(async {
/// # use rewrap::task::FanIn;
/// let mut fan_in = FanIn::with_capacity(3);
///
/// for i in 0..3 {
///     fan_in.spawn(async move { Ok::<_, std::io::Error>(i * 10) });
/// }
///
/// let mut sum = 0;
///
/// while let Some(item) = fan_in.next().await? {
///     sum += item;
/// }
///
/// assert_eq!(sum, 30);
/// # Ok::<_, rewrap::task::Error<std::io::Error>>(())
/// # }).unwrap()
/// ```
#[derive(Debug)]
pub struct FanIn<T, E> {
    /// The group of producer tasks.
    tasks: JoinSet<Result<(), E>>,
    /// The sending part of the channel, cloned for each task.
    ///
    /// It is released as soon as collection starts, so that the channel gets closed once the last task ends.
    sender: Option<mpsc::Sender<T>>,
    /// The receiving part of the channel.
    receiver: mpsc::Receiver<T>,
    /// Number of spawned tasks.
    expected: usize,
    /// Number of dequeued items.
    received: usize,
    deadline: Option<Duration>,
    expires_at: Option<Instant>,
}

impl<T, E> FanIn<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create an empty group whose channel holds up to `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        Self {
            tasks: JoinSet::new(),
            sender: Some(sender),
            receiver,
            expected: 0,
            received: 0,
            deadline: None,
            expires_at: None,
        }
    }

    /// Build a group failing when all of its items have not been collected within `deadline`.
    ///
    /// The deadline starts when collection starts, ie. on the first call to [`FanIn::next()`].
    #[inline]
    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    /// Number of spawned tasks.
    #[inline]
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of items still to be collected.
    #[inline]
    pub fn pending(&self) -> usize {
        self.expected - self.received
    }

    /// Spawn a task in the group.
    ///
    /// The item resulting from `future` is pushed to the channel on success, otherwise the error is reported to the
    /// consumer and nothing is pushed.
    ///
    /// # Panics
    /// This method panics if collection has already started.
    pub fn spawn(&mut self, future: impl Future<Output = Result<T, E>> + Send + 'static) {
        let sender = self.sender.clone().expect("collection already started");

        self.expected += 1;

        self.tasks.spawn(async move {
            let item = future.await?;

            // the consumer is only gone when the group is dropped, in which case this task is being aborted anyway
            let _ = sender.send(item).await;

            Ok::<_, E>(())
        });
    }

    /// Dequeue the next item produced, in completion order.
    ///
    /// Returns `Ok(None)` once every spawned task has produced its item.
    pub async fn next(&mut self) -> Result<Option<T>, Error<E>> {
        if self.sender.take().is_some() {
            self.expires_at = self.deadline.map(|deadline| Instant::now() + deadline);
        }

        while self.received < self.expected {
            let expires_at = self.expires_at;

            tokio::select! {
                biased;

                Some(item) = self.receiver.recv() => {
                    self.received += 1;

                    return Ok(Some(item));
                }
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => return Err(Error::Task(err)),
                    Err(err) => return Err(Error::Join(err)),
                },
                _ = tokio::time::sleep_until(expires_at.unwrap_or_else(Instant::now)), if expires_at.is_some() => {
                    tracing::debug!("Deadline elapsed with {} pending tasks", self.pending());

                    return Err(Error::Deadline {
                        expected: self.expected,
                        pending: self.pending(),
                    });
                }
                else => return Err(Error::Lost { pending: self.pending() }),
            }
        }

        Ok(None)
    }

    /// Turn the group into a stream of items in completion order, ending after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, Error<E>>> {
        stream::unfold(Some(self), |fan_in| async move {
            let mut fan_in = fan_in?;

            match fan_in.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(fan_in))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}
