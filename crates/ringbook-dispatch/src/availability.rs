// SPDX-FileCopyrightText: 2026 Ringbook Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent availability resolver.
//!
//! Returns the single best-ranked agent currently eligible to take a call,
//! honoring mutual exclusion (one live call per agent), sticky-agent
//! affinity, feedback-backlog exclusion, and static selection priority.
//! `None` means "reschedule later", never an error.

use chrono::{Duration, Utc};
use ringbook_core::types::Agent;
use ringbook_core::RingbookError;
use ringbook_storage::queries::agents;
use ringbook_storage::Database;
use tracing::debug;

/// Resolves the best available agent for a call of a given duration.
#[derive(Clone)]
pub struct AgentSelector {
    db: Database,
    /// Slack added to the duration when checking next-booking conflicts.
    buffer_mins: i64,
}

impl AgentSelector {
    pub fn new(db: Database, buffer_mins: i64) -> Self {
        Self { db, buffer_mins }
    }

    /// Select the best-ranked eligible agent.
    ///
    /// 1. Agents holding a booking that awaits user feedback join the
    ///    exclusion set.
    /// 2. `sticky_agent_id` restricts the pool to that single agent.
    /// 3. Live-status rows are filtered to active, not-on-call agents with
    ///    no next booking within `duration + buffer` minutes that are
    ///    online or calendar-free.
    /// 4. The online tier is considered first; calendar-free-only agents
    ///    are the fallback.
    /// 5. Within a tier, the highest `selection_priority` wins.
    pub async fn select(
        &self,
        duration_mins: i64,
        excluded_agent_ids: &[i64],
        sticky_agent_id: Option<i64>,
    ) -> Result<Option<Agent>, RingbookError> {
        let tentative_end = Utc::now() + Duration::minutes(duration_mins + self.buffer_mins);

        let mut excluded = excluded_agent_ids.to_vec();
        excluded.extend(agents::agents_with_feedback_backlog(&self.db).await?);

        let statuses =
            agents::eligible_live_statuses(&self.db, tentative_end, &excluded, sticky_agent_id)
                .await?;

        let online: Vec<i64> = statuses
            .iter()
            .filter(|s| s.is_online)
            .map(|s| s.agent_id)
            .collect();
        let calendar_free_only: Vec<i64> = statuses
            .iter()
            .filter(|s| !s.is_online && s.is_calendar_free)
            .map(|s| s.agent_id)
            .collect();

        for tier in [online, calendar_free_only] {
            if tier.is_empty() {
                continue;
            }
            if let Some(agent) = self.highest_priority(&tier).await? {
                debug!(agent_id = agent.agent_id, "agent selected");
                return Ok(Some(agent));
            }
        }

        debug!(duration_mins, "no eligible agent");
        Ok(None)
    }

    /// The active agent with the highest selection priority; ties break on
    /// the lower agent id for determinism.
    async fn highest_priority(&self, ids: &[i64]) -> Result<Option<Agent>, RingbookError> {
        let mut candidates: Vec<Agent> = agents::agents_by_ids(&self.db, ids)
            .await?
            .into_iter()
            .filter(|a| a.is_active)
            .collect();
        candidates.sort_by(|a, b| {
            b.selection_priority
                .cmp(&a.selection_priority)
                .then(a.agent_id.cmp(&b.agent_id))
        });
        Ok(candidates.into_iter().next())
    }
}
