//! Collision Events and Deferred Commands
//!
//! Pair state changes are reported while the narrow phase runs, in pair
//! order. Every event is delivered synchronously to the registered
//! [`CollisionListener`]s and also collected for [`crate::Space::events`].
//!
//! Listeners cannot touch the space mid-step. Instead they queue
//! [`Command`]s, which the space applies atomically at the end of the step.

use std::fmt;

use crate::body::BodyHandle;
use crate::collider::Contact;
use crate::joint::JointHandle;

// ============================================================================
// Events
// ============================================================================

/// Why a touching pair stopped touching
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// Contacts separated
    Separated,
    /// The pair left broad-phase overlap or was filtered out
    PairLost,
    /// One of the bodies was removed
    BodyRemoved,
}

/// Pair state transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollisionEventKind {
    /// Entered the touching state; carries the deepest contact
    Began { contact: Contact },
    /// Left the touching state
    Ended { reason: EndReason },
}

/// A collision event between two bodies (`body_a` has the lower slot)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionEvent {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub kind: CollisionEventKind,
    /// Either body is a sensor
    pub sensor: bool,
}

impl CollisionEvent {
    #[inline]
    pub fn is_began(&self) -> bool {
        matches!(self.kind, CollisionEventKind::Began { .. })
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        matches!(self.kind, CollisionEventKind::Ended { .. })
    }

    /// Whether `body` is one of the pair
    #[inline]
    pub fn involves(&self, body: BodyHandle) -> bool {
        self.body_a == body || self.body_b == body
    }
}

impl fmt::Display for CollisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CollisionEventKind::Began { .. } => write!(f, "began {} {}", self.body_a, self.body_b),
            CollisionEventKind::Ended { reason } => {
                write!(f, "ended {} {} ({reason:?})", self.body_a, self.body_b)
            }
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Structural change requested from inside a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    RemoveBody(BodyHandle),
    RemoveJoint(JointHandle),
}

/// Commands queued during a step, applied in queue order at its end
#[derive(Clone, Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn remove_body(&mut self, handle: BodyHandle) {
        self.push(Command::RemoveBody(handle));
    }

    pub fn remove_joint(&mut self, handle: JointHandle) {
        self.push(Command::RemoveJoint(handle));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take every queued command, oldest first
    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

// ============================================================================
// Listener and Dispatcher
// ============================================================================

/// Receives pair transitions as they happen
pub trait CollisionListener {
    fn collision_began(&mut self, _event: &CollisionEvent, _commands: &mut CommandQueue) {}

    fn collision_ended(&mut self, _event: &CollisionEvent, _commands: &mut CommandQueue) {}
}

/// Fans events out to listeners and keeps the per-step event list
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<Box<dyn CollisionListener + Send>>,
    events: Vec<CollisionEvent>,
    commands: CommandQueue,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .field("events", &self.events)
            .field("commands", &self.commands)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; listeners are called in registration order
    pub fn add_listener(&mut self, listener: Box<dyn CollisionListener + Send>) {
        self.listeners.push(listener);
    }

    #[inline]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Forget the previous step's events
    pub fn begin_step(&mut self) {
        self.events.clear();
    }

    /// Deliver `event` to every listener and record it
    pub fn emit(&mut self, event: CollisionEvent) {
        log::trace!("{event}");
        for listener in &mut self.listeners {
            match event.kind {
                CollisionEventKind::Began { .. } => listener.collision_began(&event, &mut self.commands),
                CollisionEventKind::Ended { .. } => listener.collision_ended(&event, &mut self.commands),
            }
        }
        self.events.push(event);
    }

    /// Events emitted since the last [`Self::begin_step`]
    #[inline]
    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        self.commands.drain()
    }
}
