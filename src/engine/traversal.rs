// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Explicit work-stack executor
//!
//! Tree walks never recurse on the host stack. A handler receives one work
//! item at a time and may push a new [`WorkQueue`]; pushed queues are drained
//! before the queue that pushed them resumes, which gives pre-order
//! semantics. Memory is bounded by depth times breadth of the walk.

/// Ordered run of work items with a read cursor
#[derive(Debug, Clone)]
pub struct WorkQueue<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T: Clone> WorkQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Whether every item has been dequeued
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.items.len()
    }

    /// Items not yet dequeued
    pub fn remaining(&self) -> &[T] {
        &self.items[self.cursor.min(self.items.len())..]
    }

    /// Number of items ever pushed
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was pushed
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn dequeue(&mut self) -> Option<T> {
        let item = self.items.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(item)
    }

    fn reset(&mut self) {
        self.items.clear();
        self.cursor = 0;
    }
}

impl<T> FromIterator<T> for WorkQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            cursor: 0,
        }
    }
}

/// Handles one work item
pub trait WorkHandler<T> {
    /// Process `item`, pushing follow-up work onto `stack`
    fn handle(&mut self, item: T, stack: &mut WorkStack<T>);
}

/// Counters collected by one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Work items executed
    pub items: usize,
    /// Deepest stack of queues observed
    pub max_depth: usize,
}

/// Stack of work queues, one per traversal depth
#[derive(Debug)]
pub struct WorkStack<T> {
    queues: Vec<WorkQueue<T>>,
    spare: Vec<WorkQueue<T>>,
    stats: TraversalStats,
}

impl<T> Default for WorkStack<T> {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            spare: Vec::new(),
            stats: TraversalStats::default(),
        }
    }
}

impl<T: Clone> WorkStack<T> {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty queue, reusing a drained one when available
    pub fn create_queue(&mut self) -> WorkQueue<T> {
        self.spare.pop().unwrap_or_default()
    }

    /// Push a queue; empty queues are recycled immediately
    pub fn push(&mut self, queue: WorkQueue<T>) {
        if queue.is_empty() {
            self.recycle(queue);
            return;
        }
        self.queues.push(queue);
        self.stats.max_depth = self.stats.max_depth.max(self.queues.len());
    }

    /// Current number of queues
    pub fn depth(&self) -> usize {
        self.queues.len()
    }

    fn recycle(&mut self, mut queue: WorkQueue<T>) {
        queue.reset();
        self.spare.push(queue);
    }

    fn next(&mut self) -> Option<T> {
        loop {
            let top = self.queues.last_mut()?;
            if let Some(item) = top.dequeue() {
                return Some(item);
            }
            if let Some(drained) = self.queues.pop() {
                self.recycle(drained);
            }
        }
    }

    /// Drain the stack, feeding every item to `handler`
    pub fn run<H: WorkHandler<T>>(&mut self, handler: &mut H) -> TraversalStats {
        while let Some(item) = self.next() {
            self.stats.items += 1;
            handler.handle(item, self);
        }
        std::mem::take(&mut self.stats)
    }
}

/// Run `initial` and everything it spawns to completion
pub fn run<T: Clone, H: WorkHandler<T>>(initial: T, handler: &mut H) -> TraversalStats {
    let mut stack = WorkStack::new();
    let mut queue = stack.create_queue();
    queue.push(initial);
    stack.push(queue);
    stack.run(handler)
}
