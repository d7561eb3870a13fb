//! FIFO policy: fixed-size circular buffer.

use super::{PopOutcome, PushOutcome};
use crate::job::Job;

pub struct FifoScheduler {
    slots: Vec<Option<Job>>,
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl FifoScheduler {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            capacity,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write at `tail`, advance `tail` mod capacity, increment count.
    pub fn push(&mut self, job: Job) -> PushOutcome {
        if self.count == self.capacity {
            return PushOutcome::Full(job);
        }
        self.slots[self.tail] = Some(job);
        self.tail = (self.tail + 1) % self.capacity;
        self.count += 1;
        PushOutcome::Accepted
    }

    /// Read at `head`, advance `head` mod capacity, decrement count.
    pub fn pop(&mut self) -> PopOutcome {
        if self.count == 0 {
            return PopOutcome::Empty;
        }
        let job = self.slots[self.head]
            .take()
            .expect("fifo slot at head must be occupied when count > 0");
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        PopOutcome::Job(job)
    }
}
