//! Bounded, non-blocking event channel.
//!
//! Many producers (the main loop, sub-agent loops, tools) publish into one
//! queue drained by a single consumer. Producers never wait. When the queue is
//! full:
//!
//! - a tool-call fragment is appended to the queued fragment of the same call
//!   when that fragment is the role's latest queued event;
//! - otherwise the oldest droppable progress event is evicted.
//!
//! Other structural and terminal events are always kept, even past capacity.
//! Once the receiver is dropped, sends are discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::loop_events::LoopEvent;

/// Default queue capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Queued events plus how many of them may be evicted.
struct EventQueue {
    events: VecDeque<LoopEvent>,
    droppable: usize,
}

impl EventQueue {
    fn len(&self) -> usize {
        self.events.len()
    }

    fn push_back(&mut self, event: LoopEvent) {
        if event.is_droppable() {
            self.droppable += 1;
        }
        self.events.push_back(event);
    }

    fn pop_front(&mut self) -> Option<LoopEvent> {
        let event = self.events.pop_front()?;
        if event.is_droppable() {
            self.droppable -= 1;
        }
        Some(event)
    }

    fn clear(&mut self) {
        self.events.clear();
        self.droppable = 0;
    }

    fn evict_oldest_droppable(&mut self) -> bool {
        if self.droppable == 0 {
            return false;
        }
        match self.events.iter().position(LoopEvent::is_droppable) {
            Some(pos) => {
                self.events.remove(pos);
                self.droppable -= 1;
                true
            }
            None => false,
        }
    }

    /// Append a tool-call fragment to the queued fragment of the same call.
    ///
    /// Only merges into the latest queued event of the same role, so nothing
    /// the role sent in between is reordered.
    fn coalesce(&mut self, event: &LoopEvent) -> bool {
        let (roles, inner) = event.unwrap_roles();
        let LoopEvent::ToolCallDelta {
            index,
            name,
            arguments,
        } = inner
        else {
            return false;
        };

        for queued in self.events.iter_mut().rev() {
            let (queued_roles, queued_inner) = queued.unwrap_roles();
            if queued_roles != roles {
                continue;
            }
            let same_call = matches!(
                queued_inner,
                LoopEvent::ToolCallDelta { index: i, .. } if i == index
            );
            if !same_call {
                return false;
            }
            if let LoopEvent::ToolCallDelta {
                name: queued_name,
                arguments: queued_args,
                ..
            } = queued.innermost_mut()
            {
                queued_args.push_str(arguments);
                if queued_name.is_none() {
                    queued_name.clone_from(name);
                }
            }
            return true;
        }
        false
    }
}

struct Shared {
    queue: Mutex<EventQueue>,
    capacity: usize,
    notify: Notify,
    senders: AtomicUsize,
    receiver_open: AtomicBool,
    dropped: AtomicU64,
}

impl Shared {
    fn push(&self, event: LoopEvent) {
        if !self.receiver_open.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                if queue.coalesce(&event) {
                    drop(queue);
                    self.notify.notify_one();
                    return;
                }
                if queue.evict_oldest_droppable() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                } else if event.is_droppable() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }
}

/// Create a channel holding about `capacity` events.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(EventQueue {
            events: VecDeque::with_capacity(capacity.min(4096)),
            droppable: 0,
        }),
        capacity: capacity.max(1),
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        receiver_open: AtomicBool::new(true),
        dropped: AtomicU64::new(0),
    });
    (
        EventSender {
            shared: shared.clone(),
            roles: Vec::new(),
        },
        EventReceiver { shared },
    )
}

/// Producer half. Cheap to clone.
pub struct EventSender {
    shared: Arc<Shared>,
    /// Sub-agent roles this sender wraps events in, outermost first.
    roles: Vec<String>,
}

impl EventSender {
    /// Publish an event. Never blocks.
    pub fn send(&self, event: LoopEvent) {
        let event = self
            .roles
            .iter()
            .rev()
            .fold(event, |inner, role| LoopEvent::SubagentChunk {
                role: role.clone(),
                event: Box::new(inner),
            });
        self.shared.push(event);
    }

    /// Sender with no receiver; every event is discarded.
    pub fn detached() -> EventSender {
        event_channel(1).0
    }

    /// Sender whose events arrive as `SubagentChunk { role, .. }`.
    pub fn for_subagent(&self, role: impl Into<String>) -> EventSender {
        let mut roles = self.roles.clone();
        roles.push(role.into());
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        EventSender {
            shared: self.shared.clone(),
            roles,
        }
    }

    /// Events evicted or refused because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Clone for EventSender {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: self.shared.clone(),
            roles: self.roles.clone(),
        }
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.notify.notify_one();
        }
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Single consumer half.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    /// Next event, or `None` once every sender is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<LoopEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.shared.senders.load(Ordering::Acquire) == 0 {
                return self.try_recv();
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<LoopEvent> {
        self.shared.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.shared.receiver_open.store(false, Ordering::Release);
        self.shared.queue.lock().clear();
    }
}
