// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static declaration of the work-queue graph.
//!
//! A [`Topology`] is a typed table of [`TopologyEntry`] values, validated
//! at startup before any channel is opened. Each entry declares one logical
//! work queue: its primary exchange/queue/routing-key binding, an ordered
//! list of delay tiers (each backed by a transient TTL queue that
//! dead-letters into the retry target), a maximum attempt count, and an
//! optional static dead-letter destination for exhausted messages.

use std::time::Duration;

use ringbook_core::RingbookError;

pub const LEAD_EXCHANGE: &str = "lead_exchange";
pub const LEAD_STATIC_DEAD_EXCHANGE: &str = "lead_static_dead_exchange";
pub const LEAD_ASSIGNMENT_QUEUE: &str = "lead_assignment";
pub const LEAD_ASSIGNMENT_RETRY_QUEUE: &str = "lead_assignment_retry";
pub const LEAD_REATTEMPT_QUEUE: &str = "lead_reattempt";
pub const LEAD_PARKED_QUEUE: &str = "lead_assignment_parked";
pub const LEAD_REATTEMPT_PARKED_QUEUE: &str = "lead_reattempt_parked";
pub const LEAD_PARKED_FINAL_QUEUE: &str = "lead_parked_final";

/// How long an unconsumed transient delay queue survives before the broker
/// may drop it.
pub const DELAY_QUEUE_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One fixed wait period before a failed message becomes eligible for
/// redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayTier {
    pub delay: Duration,
}

/// Destination for messages that exhaust their retries. Always a consumable
/// queue so operators can replay by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDeadQueue {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

/// Declaration of one logical work queue.
#[derive(Debug, Clone)]
pub struct TopologyEntry {
    /// Logical name; the handler registry is keyed by it.
    pub name: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    /// Where expired delay-queue messages are routed back to.
    pub retry_exchange: String,
    pub retry_routing_key: String,
    /// Escalating delays; tier 0 serves the first failure, the last tier is
    /// reused once attempts exceed the list.
    pub delay_tiers: Vec<DelayTier>,
    /// Failures tolerated before routing to the static dead queue.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub static_dead: Option<StaticDeadQueue>,
}

impl TopologyEntry {
    /// Deterministic name of the transient delay queue for a tier.
    ///
    /// Derived from the primary queue name so the delay queues stay private
    /// to this topology.
    pub fn delay_queue_name(&self, tier: usize) -> String {
        format!("{}.delay.{}", self.queue, tier)
    }
}

/// A validated table of topology entries.
#[derive(Debug, Clone)]
pub struct Topology {
    entries: Vec<TopologyEntry>,
}

impl Topology {
    /// Build and validate a topology. Every cross-reference must resolve
    /// before any channel is opened.
    pub fn new(entries: Vec<TopologyEntry>) -> Result<Self, RingbookError> {
        let topology = Self { entries };
        topology.validate()?;
        Ok(topology)
    }

    pub fn entries(&self) -> &[TopologyEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&TopologyEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn validate(&self) -> Result<(), RingbookError> {
        let mut names = std::collections::HashSet::new();
        let mut queues = std::collections::HashSet::new();
        for entry in &self.entries {
            if !names.insert(entry.name.as_str()) {
                return Err(config_err(format!("duplicate topology entry `{}`", entry.name)));
            }
            if !queues.insert(entry.queue.as_str()) {
                return Err(config_err(format!("duplicate queue `{}`", entry.queue)));
            }
            for (idx, tier) in entry.delay_tiers.iter().enumerate() {
                if tier.delay.is_zero() {
                    return Err(config_err(format!(
                        "entry `{}` delay tier {idx} has zero delay",
                        entry.name
                    )));
                }
            }
            if let Some(dead) = &entry.static_dead {
                if dead.queue == entry.queue {
                    return Err(config_err(format!(
                        "entry `{}` dead-letters into its own queue",
                        entry.name
                    )));
                }
            }
        }

        // Delay queue names are generated; they must not collide with a
        // declared queue.
        for entry in &self.entries {
            for idx in 0..entry.delay_tiers.len() {
                let delay_queue = entry.delay_queue_name(idx);
                if queues.contains(delay_queue.as_str()) {
                    return Err(config_err(format!(
                        "delay queue `{delay_queue}` collides with a declared queue"
                    )));
                }
            }
        }

        // Every retry target must resolve to a declared primary binding,
        // otherwise expired delay messages would vanish.
        for entry in &self.entries {
            if entry.delay_tiers.is_empty() {
                continue;
            }
            let resolves = self.entries.iter().any(|other| {
                other.exchange == entry.retry_exchange
                    && other.routing_key == entry.retry_routing_key
            });
            if !resolves {
                return Err(config_err(format!(
                    "entry `{}` retry target {}/{} does not match any declared binding",
                    entry.name, entry.retry_exchange, entry.retry_routing_key
                )));
            }
        }

        Ok(())
    }

    /// The standard lead-assignment topology.
    ///
    /// `lead_assignment` feeds `lead_assignment_retry` after one failure;
    /// the retry queue loops on itself with a one-minute tier. Replacement
    /// calls ride `lead_reattempt` with fast escalating tiers. Exhausted
    /// messages park in consumable static dead queues.
    pub fn lead_assignment() -> Result<Self, RingbookError> {
        let parked = StaticDeadQueue {
            exchange: LEAD_STATIC_DEAD_EXCHANGE.to_string(),
            queue: LEAD_PARKED_QUEUE.to_string(),
            routing_key: LEAD_PARKED_QUEUE.to_string(),
        };

        Self::new(vec![
            TopologyEntry {
                name: "lead_assign".to_string(),
                exchange: LEAD_EXCHANGE.to_string(),
                queue: LEAD_ASSIGNMENT_QUEUE.to_string(),
                routing_key: LEAD_ASSIGNMENT_QUEUE.to_string(),
                retry_exchange: LEAD_EXCHANGE.to_string(),
                retry_routing_key: LEAD_ASSIGNMENT_RETRY_QUEUE.to_string(),
                delay_tiers: vec![DelayTier { delay: Duration::from_secs(60) }],
                max_attempts: Some(1),
                static_dead: Some(parked.clone()),
            },
            TopologyEntry {
                name: "lead_assign_retry".to_string(),
                exchange: LEAD_EXCHANGE.to_string(),
                queue: LEAD_ASSIGNMENT_RETRY_QUEUE.to_string(),
                routing_key: LEAD_ASSIGNMENT_RETRY_QUEUE.to_string(),
                retry_exchange: LEAD_EXCHANGE.to_string(),
                retry_routing_key: LEAD_ASSIGNMENT_RETRY_QUEUE.to_string(),
                delay_tiers: vec![DelayTier { delay: Duration::from_secs(60) }],
                max_attempts: Some(30),
                static_dead: Some(parked.clone()),
            },
            TopologyEntry {
                name: "lead_reattempt".to_string(),
                exchange: LEAD_EXCHANGE.to_string(),
                queue: LEAD_REATTEMPT_QUEUE.to_string(),
                routing_key: LEAD_REATTEMPT_QUEUE.to_string(),
                retry_exchange: LEAD_EXCHANGE.to_string(),
                retry_routing_key: LEAD_REATTEMPT_QUEUE.to_string(),
                delay_tiers: vec![
                    DelayTier { delay: Duration::from_secs(10) },
                    DelayTier { delay: Duration::from_secs(15) },
                    DelayTier { delay: Duration::from_secs(25) },
                ],
                max_attempts: Some(3),
                static_dead: Some(StaticDeadQueue {
                    exchange: LEAD_STATIC_DEAD_EXCHANGE.to_string(),
                    queue: LEAD_REATTEMPT_PARKED_QUEUE.to_string(),
                    routing_key: LEAD_REATTEMPT_PARKED_QUEUE.to_string(),
                }),
            },
            // The parked queue is itself consumable for manual replay. A
            // failure during replay falls through to a terminal queue.
            TopologyEntry {
                name: "lead_parked".to_string(),
                exchange: LEAD_STATIC_DEAD_EXCHANGE.to_string(),
                queue: LEAD_PARKED_QUEUE.to_string(),
                routing_key: LEAD_PARKED_QUEUE.to_string(),
                retry_exchange: String::new(),
                retry_routing_key: String::new(),
                delay_tiers: Vec::new(),
                max_attempts: None,
                static_dead: Some(StaticDeadQueue {
                    exchange: LEAD_STATIC_DEAD_EXCHANGE.to_string(),
                    queue: LEAD_PARKED_FINAL_QUEUE.to_string(),
                    routing_key: LEAD_PARKED_FINAL_QUEUE.to_string(),
                }),
            },
        ])
    }
}

fn config_err(message: String) -> RingbookError {
    RingbookError::Config(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_topology_validates() {
        let topology = Topology::lead_assignment().unwrap();
        assert_eq!(topology.entries().len(), 4);
        assert!(topology.entry("lead_assign").is_some());
        assert!(topology.entry("lead_parked").is_some());
        assert!(topology.entry("nonexistent").is_none());
    }

    #[test]
    fn delay_queue_names_are_deterministic() {
        let topology = Topology::lead_assignment().unwrap();
        let entry = topology.entry("lead_reattempt").unwrap();
        assert_eq!(entry.delay_queue_name(0), "lead_reattempt.delay.0");
        assert_eq!(entry.delay_queue_name(2), "lead_reattempt.delay.2");
    }

    fn minimal_entry(name: &str, queue: &str) -> TopologyEntry {
        TopologyEntry {
            name: name.to_string(),
            exchange: "x".to_string(),
            queue: queue.to_string(),
            routing_key: queue.to_string(),
            retry_exchange: "x".to_string(),
            retry_routing_key: queue.to_string(),
            delay_tiers: vec![DelayTier { delay: Duration::from_secs(1) }],
            max_attempts: Some(1),
            static_dead: None,
        }
    }

    #[test]
    fn duplicate_queue_rejected() {
        let err = Topology::new(vec![
            minimal_entry("a", "q1"),
            minimal_entry("b", "q1"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate queue"));
    }

    #[test]
    fn unresolved_retry_target_rejected() {
        let mut entry = minimal_entry("a", "q1");
        entry.retry_routing_key = "nowhere".to_string();
        let err = Topology::new(vec![entry]).unwrap_err();
        assert!(err.to_string().contains("retry target"));
    }

    #[test]
    fn zero_delay_tier_rejected() {
        let mut entry = minimal_entry("a", "q1");
        entry.delay_tiers = vec![DelayTier { delay: Duration::ZERO }];
        let err = Topology::new(vec![entry]).unwrap_err();
        assert!(err.to_string().contains("zero delay"));
    }

    #[test]
    fn self_dead_letter_rejected() {
        let mut entry = minimal_entry("a", "q1");
        entry.static_dead = Some(StaticDeadQueue {
            exchange: "x".to_string(),
            queue: "q1".to_string(),
            routing_key: "q1".to_string(),
        });
        let err = Topology::new(vec![entry]).unwrap_err();
        assert!(err.to_string().contains("its own queue"));
    }
}
