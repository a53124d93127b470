// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Swarm Events
//
// In-memory event streaming on tokio broadcast channels. Replaces the
// opportunities/claims/results/heartbeat/spawning channels of a shared
// key-value store with typed domain events.
//
// Events are advisory: a lagging subscriber loses events, the coordinator
// never blocks on delivery.

use crate::domain::clone::CloneId;
use crate::domain::events::{CapitalEvent, ClaimEvent, CloneLifecycleEvent, KnowledgeEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Claim(ClaimEvent),
    Capital(CapitalEvent),
    Lifecycle(CloneLifecycleEvent),
    Knowledge(KnowledgeEvent),
}

impl DomainEvent {
    /// Clone the event concerns, if it concerns exactly one.
    pub fn clone_id(&self) -> Option<CloneId> {
        match self {
            Self::Claim(e) => Some(e.clone_id()),
            Self::Capital(e) => e.clone_id(),
            Self::Lifecycle(e) => Some(e.clone_id()),
            Self::Knowledge(KnowledgeEvent::FragmentPropagated { origin_clone_id, .. }) => {
                Some(*origin_clone_id)
            }
        }
    }

    /// Stable snake_case name of the concrete event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Claim(ClaimEvent::ClaimGranted { .. }) => "claim_granted",
            Self::Claim(ClaimEvent::ClaimDenied { .. }) => "claim_denied",
            Self::Claim(ClaimEvent::ClaimReleased { .. }) => "claim_released",
            Self::Capital(CapitalEvent::CapitalReserved { .. }) => "capital_reserved",
            Self::Capital(CapitalEvent::ReservationDenied { .. }) => "reservation_denied",
            Self::Capital(CapitalEvent::ReservationSettled { .. }) => "reservation_settled",
            Self::Capital(CapitalEvent::ReservationAborted { .. }) => "reservation_aborted",
            Self::Capital(CapitalEvent::PhaseTransition { .. }) => "phase_transition",
            Self::Capital(CapitalEvent::PoolHalted { .. }) => "pool_halted",
            Self::Lifecycle(CloneLifecycleEvent::CloneSpawned { .. }) => "clone_spawned",
            Self::Lifecycle(CloneLifecycleEvent::CloneActivated { .. }) => "clone_activated",
            Self::Lifecycle(CloneLifecycleEvent::CloneDegraded { .. }) => "clone_degraded",
            Self::Lifecycle(CloneLifecycleEvent::CloneSuspected { .. }) => "clone_suspected",
            Self::Lifecycle(CloneLifecycleEvent::CloneResurrected { .. }) => "clone_resurrected",
            Self::Lifecycle(CloneLifecycleEvent::CloneRetired { .. }) => "clone_retired",
            Self::Knowledge(KnowledgeEvent::FragmentPropagated { .. }) => "fragment_propagated",
        }
    }
}

/// Event bus for publishing and subscribing to swarm events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1024)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    pub fn publish_claim_event(&self, event: ClaimEvent) {
        self.publish(DomainEvent::Claim(event));
    }

    pub fn publish_capital_event(&self, event: CapitalEvent) {
        self.publish(DomainEvent::Capital(event));
    }

    pub fn publish_lifecycle_event(&self, event: CloneLifecycleEvent) {
        self.publish(DomainEvent::Lifecycle(event));
    }

    pub fn publish_knowledge_event(&self, event: KnowledgeEvent) {
        self.publish(DomainEvent::Knowledge(event));
    }

    fn publish(&self, event: DomainEvent) {
        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to swarm event");
        }
    }

    /// Subscribe to all swarm events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events concerning one clone
    pub fn subscribe_clone(&self, clone_id: CloneId) -> CloneEventReceiver {
        CloneEventReceiver {
            receiver: self.sender.subscribe(),
            clone_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all swarm events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to a single clone
pub struct CloneEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    clone_id: CloneId,
}

impl CloneEventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.clone_id() == Some(self.clone_id) {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
