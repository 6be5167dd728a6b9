//! Amazon EventBridge Scheduler timer backend.
//!
//! Each area maps to a schedule group and each event to a one-shot
//! `at(...)` schedule, rendered in UTC, whose target receives the event JSON
//! (with its `timer_name`) when it fires. Schedules are created with
//! `ActionAfterCompletion::Delete`, so the provider also cleans up after
//! itself if the fire handler's delete is lost.

use async_trait::async_trait;
use aws_sdk_scheduler::types::{
    ActionAfterCompletion, FlexibleTimeWindow, FlexibleTimeWindowMode, Target,
};
use aws_sdk_scheduler::Client;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info};

use shedwatch_core::config::{AwsConfig, SchedulerConfig};
use shedwatch_core::window::schedule_expression;
use shedwatch_core::{Event, ShedError, ShedResult, TimerHandle};

use crate::registry::TimerRegistry;

/// Timer registry backed by EventBridge Scheduler.
pub struct EventBridgeTimerRegistry {
    client: Client,
    target_arn: String,
    target_role_arn: String,
}

/// Zone the provider evaluates `at(...)` expressions in.
const EXPRESSION_TIMEZONE: &str = "UTC";

/// `at(...)` expression for `fire_at`, in [`EXPRESSION_TIMEZONE`] wall-clock time.
fn expression_for(fire_at: DateTime<FixedOffset>) -> String {
    schedule_expression(&fire_at.with_timezone(&Utc).fixed_offset())
}

impl EventBridgeTimerRegistry {
    /// Create a registry from project config.
    ///
    /// Fails with [`ShedError::Config`] when the schedule target is not configured.
    pub async fn new(aws: &AwsConfig, scheduler: &SchedulerConfig) -> ShedResult<Self> {
        let (target_arn, target_role_arn) =
            match (&scheduler.target_arn, &scheduler.target_role_arn) {
                (Some(arn), Some(role)) => (arn.clone(), role.clone()),
                _ => {
                    return Err(ShedError::Config(
                        "SCHEDULE_TARGET_ARN and SCHEDULE_TARGET_ROLE_ARN must be set".into(),
                    ))
                }
            };

        let sdk_config = aws.load_sdk_config().await;
        let client = Client::new(&sdk_config);

        info!(
            region = %aws.region,
            target = %target_arn,
            "EventBridge timer registry initialized"
        );

        Ok(Self {
            client,
            target_arn,
            target_role_arn,
        })
    }

    fn build_target(&self, payload: &Event) -> ShedResult<Target> {
        let input = serde_json::to_string(payload)
            .map_err(|e| ShedError::Decode(format!("failed to serialize timer payload: {e}")))?;
        Target::builder()
            .arn(&self.target_arn)
            .role_arn(&self.target_role_arn)
            .input(input)
            .build()
            .map_err(|e| ShedError::Config(format!("invalid schedule target: {e}")))
    }
}

#[async_trait]
impl TimerRegistry for EventBridgeTimerRegistry {
    async fn create(
        &self,
        group: &str,
        name: &str,
        fire_at: DateTime<FixedOffset>,
        payload: &Event,
    ) -> ShedResult<TimerHandle> {
        let registration_err = |reason: String| ShedError::Registration {
            group: group.to_string(),
            name: name.to_string(),
            reason,
        };

        let window = FlexibleTimeWindow::builder()
            .mode(FlexibleTimeWindowMode::Off)
            .build()
            .map_err(|e| registration_err(format!("invalid time window: {e}")))?;
        let target = self.build_target(payload)?;
        let expression = expression_for(fire_at);

        let resp = self
            .client
            .create_schedule()
            .name(name)
            .group_name(group)
            .schedule_expression(&expression)
            .schedule_expression_timezone(EXPRESSION_TIMEZONE)
            .flexible_time_window(window)
            .target(target)
            .action_after_completion(ActionAfterCompletion::Delete)
            .send()
            .await
            .map_err(|e| registration_err(format!("{e:?}")))?;

        debug!(group, name, expression = %expression, "Schedule created");

        Ok(TimerHandle {
            group: group.to_string(),
            name: name.to_string(),
            arn: Some(resp.schedule_arn().to_string()),
        })
    }

    async fn delete(&self, group: &str, name: &str) -> ShedResult<()> {
        match self
            .client
            .delete_schedule()
            .name(name)
            .group_name(group)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                debug!(group, name, "Schedule already gone");
                Ok(())
            }
            Err(e) => Err(ShedError::Deletion {
                group: group.to_string(),
                name: name.to_string(),
                reason: format!("{e:?}"),
            }),
        }
    }

    async fn list_pending(&self, group: &str) -> ShedResult<Vec<TimerHandle>> {
        let mut handles = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let resp = match self
                .client
                .list_schedules()
                .group_name(group)
                .set_next_token(next_token.take())
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e)
                    if e
                        .as_service_error()
                        .is_some_and(|se| se.is_resource_not_found_exception()) =>
                {
                    debug!(group, "Schedule group does not exist, treating as empty");
                    return Ok(Vec::new());
                }
                Err(e) => {
                    return Err(ShedError::GroupList {
                        group: group.to_string(),
                        reason: format!("{e:?}"),
                    })
                }
            };

            handles.extend(resp.schedules().iter().filter_map(|summary| {
                summary.name().map(|name| TimerHandle {
                    group: group.to_string(),
                    name: name.to_string(),
                    arn: summary.arn().map(str::to_string),
                })
            }));

            match resp.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(handles)
    }

    async fn ensure_group(&self, group: &str) -> ShedResult<()> {
        match self
            .client
            .create_schedule_group()
            .name(group)
            .send()
            .await
        {
            Ok(_) => {
                info!(group, "Schedule group created");
                Ok(())
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_conflict_exception()) => Ok(()),
            Err(e) => Err(ShedError::Registration {
                group: group.to_string(),
                name: String::new(),
                reason: format!("creating schedule group failed: {e:?}"),
            }),
        }
    }

    fn backend_name(&self) -> &str {
        "eventbridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_is_rendered_in_utc() {
        let fire_at = DateTime::parse_from_rfc3339("2026-10-18T15:00:00+02:00").unwrap();
        assert_eq!(expression_for(fire_at), "at(2026-10-18T13:00:00)");
    }

    #[test]
    fn expression_crosses_midnight_when_converted() {
        let fire_at = DateTime::parse_from_rfc3339("2026-10-19T01:30:00+02:00").unwrap();
        assert_eq!(expression_for(fire_at), "at(2026-10-18T23:30:00)");
        let utc = DateTime::parse_from_rfc3339("2026-10-18T23:30:00Z").unwrap();
        assert_eq!(expression_for(utc), "at(2026-10-18T23:30:00)");
    }
}
