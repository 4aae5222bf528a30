// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Mutex, MutexGuard},
    task::{Context, Poll, Waker},
};

use crate::errors::{ErrorKind, Result, ZkError};

/// One parked caller of a blocking queue operation. Waiters are granted
/// strictly in FIFO order per direction; only the head of its list may take
/// the next grant.
#[derive(Debug)]
struct Waiter {
    id: u64,
    waker: Option<Waker>,
}

/// Counting semaphore with a movable upper bound.
///
/// `value` counts the items currently held by the container; `max_value` is
/// the capacity still accounted for. A removal that skips its commit lowers
/// `max_value` together with `value`, keeping the slot reserved until
/// `increase_max_value` hands it back. Closing fails every parked waiter
/// with the given error kind.
///
/// All methods run under the owning queue's lock, so a grant and the
/// matching container mutation form one critical section.
#[derive(Debug)]
struct Semaphore {
    min_value: isize,
    max_value: isize,
    value: isize,
    closed: Option<ErrorKind>,
    // Bumped on reopen; a waiter parked before a close observes its own
    // staleness on the next poll and fails with the close kind instead of
    // leaking into the reopened instance.
    generation: u64,
    last_close_kind: Option<ErrorKind>,
    next_waiter_id: u64,
    down_waiters: VecDeque<Waiter>,
    up_waiters: VecDeque<Waiter>,
}

/// A waiter handle: the generation it registered under plus its FIFO id.
type WaiterSlot = Option<(u64, u64)>;

impl Semaphore {
    fn new(min_value: isize, max_value: isize, value: isize) -> Self {
        debug_assert!(min_value <= value && value <= max_value);
        Self {
            min_value,
            max_value,
            value,
            closed: None,
            generation: 0,
            last_close_kind: None,
            next_waiter_id: 0,
            down_waiters: VecDeque::new(),
            up_waiters: VecDeque::new(),
        }
    }

    fn try_down(&mut self, decrease_max_value: bool) -> bool {
        if self.closed.is_some() || self.value == self.min_value {
            return false;
        }

        self.value -= 1;
        if decrease_max_value {
            self.max_value -= 1;
        }
        self.wake_heads();
        true
    }

    fn try_up(&mut self) -> bool {
        if self.closed.is_some() || self.value == self.max_value {
            return false;
        }

        self.value += 1;
        self.wake_heads();
        true
    }

    /// Fails a waiter left over from before a close/reopen cycle.
    fn check_stale(&mut self, slot: &mut WaiterSlot) -> Option<ErrorKind> {
        if let Some((generation, _)) = *slot
            && generation != self.generation
        {
            *slot = None;
            return Some(self.last_close_kind.unwrap_or(ErrorKind::ConnectionLoss));
        }
        None
    }

    fn poll_down(
        &mut self,
        slot: &mut WaiterSlot,
        cx: &mut Context<'_>,
        decrease_max_value: bool,
    ) -> Poll<std::result::Result<(), ErrorKind>> {
        if let Some(kind) = self.check_stale(slot) {
            return Poll::Ready(Err(kind));
        }

        if let Some(kind) = self.closed {
            if let Some((_, id)) = slot.take() {
                remove_waiter(&mut self.down_waiters, id);
            }
            return Poll::Ready(Err(kind));
        }

        let at_head = match slot {
            Some((_, id)) => self.down_waiters.front().map(|w| w.id) == Some(*id),
            None => self.down_waiters.is_empty(),
        };

        if at_head && self.value > self.min_value {
            if slot.take().is_some() {
                self.down_waiters.pop_front();
            }
            self.value -= 1;
            if decrease_max_value {
                self.max_value -= 1;
            }
            self.wake_heads();
            return Poll::Ready(Ok(()));
        }

        self.park(slot, cx, Direction::Down);
        Poll::Pending
    }

    fn poll_up(
        &mut self,
        slot: &mut WaiterSlot,
        cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), ErrorKind>> {
        if let Some(kind) = self.check_stale(slot) {
            return Poll::Ready(Err(kind));
        }

        if let Some(kind) = self.closed {
            if let Some((_, id)) = slot.take() {
                remove_waiter(&mut self.up_waiters, id);
            }
            return Poll::Ready(Err(kind));
        }

        let at_head = match slot {
            Some((_, id)) => self.up_waiters.front().map(|w| w.id) == Some(*id),
            None => self.up_waiters.is_empty(),
        };

        if at_head && self.value < self.max_value {
            if slot.take().is_some() {
                self.up_waiters.pop_front();
            }
            self.value += 1;
            self.wake_heads();
            return Poll::Ready(Ok(()));
        }

        self.park(slot, cx, Direction::Up);
        Poll::Pending
    }

    fn park(&mut self, slot: &mut WaiterSlot, cx: &mut Context<'_>, dir: Direction) {
        let generation = self.generation;
        let next_waiter_id = &mut self.next_waiter_id;
        let waiters = match dir {
            Direction::Down => &mut self.down_waiters,
            Direction::Up => &mut self.up_waiters,
        };

        match slot {
            Some((_, id)) => {
                if let Some(waiter) = waiters.iter_mut().find(|w| w.id == *id) {
                    waiter.waker = Some(cx.waker().clone());
                }
            },
            None => {
                let id = *next_waiter_id;
                *next_waiter_id += 1;
                waiters.push_back(Waiter {
                    id,
                    waker: Some(cx.waker().clone()),
                });
                *slot = Some((generation, id));
            },
        }
    }

    /// Removes a cancelled waiter and passes any pending grant on to the new
    /// head of its list.
    fn cancel(&mut self, id: u64, dir: Direction) {
        let waiters = match dir {
            Direction::Down => &mut self.down_waiters,
            Direction::Up => &mut self.up_waiters,
        };
        remove_waiter(waiters, id);

        if self.closed.is_none() {
            self.wake_heads();
        }
    }

    fn increase_max_value(&mut self, max_value_increment: isize) {
        debug_assert!(max_value_increment >= 0);
        self.max_value += max_value_increment;
        self.wake_heads();
    }

    fn close(&mut self, kind: ErrorKind) {
        self.closed = Some(kind);
        self.last_close_kind = Some(kind);

        for waiter in self
            .down_waiters
            .drain(..)
            .chain(self.up_waiters.drain(..))
        {
            if let Some(waker) = waiter.waker {
                waker.wake();
            }
        }
    }

    /// Reopens a closed instance with a fresh capacity; surviving waiters
    /// become stale via the generation bump.
    fn reopen(&mut self, max_value: isize) {
        debug_assert!(self.closed.is_some());
        self.generation += 1;
        self.min_value = 0;
        self.max_value = max_value;
        self.value = 0;
        self.closed = None;
        self.down_waiters.clear();
        self.up_waiters.clear();
    }

    fn wake_heads(&mut self) {
        if self.value > self.min_value
            && let Some(waiter) = self.down_waiters.front_mut()
            && let Some(waker) = waiter.waker.take()
        {
            waker.wake();
        }

        if self.value < self.max_value
            && let Some(waiter) = self.up_waiters.front_mut()
            && let Some(waker) = waiter.waker.take()
        {
            waker.wake();
        }
    }
}

fn remove_waiter(waiters: &mut VecDeque<Waiter>, id: u64) {
    if let Some(position) = waiters.iter().position(|w| w.id == id) {
        waiters.remove(position);
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Down,
    Up,
}

#[derive(Debug)]
struct DequeState<T> {
    semaphore: Semaphore,
    items: VecDeque<T>,
}

/// Pending-item deque with a hard capacity and a two-phase removal protocol.
///
/// `remove_*` with `commit_item_removal = false` hands out an item while
/// keeping its capacity slot reserved; the slot is released only by a later
/// [`Deque::commit_item_removals`]. This is how the session engine bounds
/// pending plus in-flight operations with one counter: a slot stays taken
/// from submission until the matching reply is consumed.
#[derive(Debug)]
pub struct Deque<T> {
    state: Mutex<DequeState<T>>,
}

impl<T> Deque<T> {
    pub fn new(max_length: usize) -> Self {
        Self {
            state: Mutex::new(DequeState {
                semaphore: Semaphore::new(0, max_length as isize, 0),
                items: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DequeState<T>> {
        self.state.lock().expect("deque lock poisoned")
    }

    pub fn insert_tail(&self, item: T) -> Insert<'_, T> {
        Insert {
            deque: self,
            item: Some(item),
            at_head: false,
            slot: None,
        }
    }

    pub fn insert_head(&self, item: T) -> Insert<'_, T> {
        Insert {
            deque: self,
            item: Some(item),
            at_head: true,
            slot: None,
        }
    }

    pub fn try_insert_tail(&self, item: T) -> bool {
        let mut state = self.lock();
        if !state.semaphore.try_up() {
            return false;
        }
        state.items.push_back(item);
        true
    }

    pub fn try_insert_head(&self, item: T) -> bool {
        let mut state = self.lock();
        if !state.semaphore.try_up() {
            return false;
        }
        state.items.push_front(item);
        true
    }

    pub fn remove_head(&self, commit_item_removal: bool) -> Remove<'_, T> {
        Remove {
            deque: self,
            at_head: true,
            commit_item_removal,
            slot: None,
        }
    }

    pub fn remove_tail(&self, commit_item_removal: bool) -> Remove<'_, T> {
        Remove {
            deque: self,
            at_head: false,
            commit_item_removal,
            slot: None,
        }
    }

    pub fn try_remove_head(&self, commit_item_removal: bool) -> Option<T> {
        let mut state = self.lock();
        if !state.semaphore.try_down(!commit_item_removal) {
            return None;
        }
        state.items.pop_front()
    }

    pub fn try_remove_tail(&self, commit_item_removal: bool) -> Option<T> {
        let mut state = self.lock();
        if !state.semaphore.try_down(!commit_item_removal) {
            return None;
        }
        state.items.pop_back()
    }

    /// Detaches a queued item matched by `predicate`, if any; used to cancel
    /// an operation that has not been handed to the wire yet.
    pub fn try_remove_item(
        &self,
        mut predicate: impl FnMut(&T) -> bool,
        commit_item_removal: bool,
    ) -> Option<T> {
        let mut state = self.lock();
        let position = state.items.iter().position(|item| predicate(item))?;
        let item = state.items.remove(position);
        state.semaphore.try_down(!commit_item_removal);
        item
    }

    /// Releases `number_of_item_removals` reserved capacity slots.
    pub fn commit_item_removals(&self, number_of_item_removals: usize) {
        if number_of_item_removals == 0 {
            return;
        }
        self.lock()
            .semaphore
            .increase_max_value(number_of_item_removals as isize);
    }

    /// Atomically releases reserved slots and re-queues items at the tail.
    /// The engine's reconnect path needs both in one critical section so a
    /// racing producer cannot consume the released capacity before the
    /// retryable in-flight operations are back in the queue.
    pub fn commit_and_reinsert(
        &self,
        number_of_item_removals: usize,
        items: impl IntoIterator<Item = T>,
    ) {
        let mut state = self.lock();
        state
            .semaphore
            .increase_max_value(number_of_item_removals as isize);

        for item in items {
            if state.semaphore.try_up() {
                state.items.push_back(item);
            }
        }
    }

    /// Fails all parked waiters with `kind` and empties the container.
    pub fn close(&self, kind: ErrorKind) {
        let mut state = self.lock();
        state.semaphore.close(kind);
        state.items.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().semaphore.closed.is_some()
    }

    /// Reopens a closed queue with a fresh capacity.
    pub fn reset(&self, max_length: usize) {
        let mut state = self.lock();
        debug_assert!(state.items.is_empty());
        state.semaphore.reopen(max_length as isize);
        state.items.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

pub struct Insert<'a, T> {
    deque: &'a Deque<T>,
    item: Option<T>,
    at_head: bool,
    slot: WaiterSlot,
}

impl<T> Unpin for Insert<'_, T> {}

impl<T> Future for Insert<'_, T> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.deque.lock();

        match state.semaphore.poll_up(&mut this.slot, cx) {
            Poll::Ready(Ok(())) => {
                if let Some(item) = this.item.take() {
                    if this.at_head {
                        state.items.push_front(item);
                    } else {
                        state.items.push_back(item);
                    }
                }
                Poll::Ready(Ok(()))
            },
            Poll::Ready(Err(kind)) => {
                Poll::Ready(Err(ZkError::new(kind, "operation queue is closed")))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Insert<'_, T> {
    fn drop(&mut self) {
        if let Some((_, id)) = self.slot.take() {
            self.deque.lock().semaphore.cancel(id, Direction::Up);
        }
    }
}

pub struct Remove<'a, T> {
    deque: &'a Deque<T>,
    at_head: bool,
    commit_item_removal: bool,
    slot: WaiterSlot,
}

impl<T> Unpin for Remove<'_, T> {}

impl<T> Future for Remove<'_, T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.deque.lock();

        match state
            .semaphore
            .poll_down(&mut this.slot, cx, !this.commit_item_removal)
        {
            Poll::Ready(Ok(())) => {
                let item = if this.at_head {
                    state.items.pop_front()
                } else {
                    state.items.pop_back()
                };
                match item {
                    Some(item) => Poll::Ready(Ok(item)),
                    // The semaphore grant and the container mutation share
                    // one lock; an empty pop here is a bug.
                    None => Poll::Ready(Err(ZkError::marshalling(
                        "operation queue lost an item",
                    ))),
                }
            },
            Poll::Ready(Err(kind)) => {
                Poll::Ready(Err(ZkError::new(kind, "operation queue is closed")))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Remove<'_, T> {
    fn drop(&mut self) {
        if let Some((_, id)) = self.slot.take() {
            self.deque.lock().semaphore.cancel(id, Direction::Down);
        }
    }
}
