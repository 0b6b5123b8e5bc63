//! Wave-by-wave plan execution
//!
//! Actions of one wave run concurrently. Before an action runs, every
//! attribute reference in its body is resolved from the attributes reported
//! by earlier waves. If any action of a wave fails, the remaining waves are
//! not attempted.

use crate::action::{Action, ApplyResult, Plan};
use crate::error::Result;
use crate::provider::CloudProvider;
use crate::reference::{self, Attributes};
use futures_util::future::join_all;
use std::collections::HashMap;

/// Execute a plan against a provider
pub async fn execute<P>(provider: &P, plan: &Plan) -> Result<ApplyResult>
where
    P: CloudProvider + ?Sized,
{
    let mut result = ApplyResult::new();
    let start = std::time::Instant::now();
    let mut known: HashMap<String, Attributes> = HashMap::new();
    let waves = plan.waves();

    for (index, wave) in waves.iter().enumerate() {
        tracing::debug!(wave = index, actions = wave.len(), "Applying wave");

        let outcomes = join_all(wave.iter().map(|action| run_action(provider, action, &known)))
            .await;

        let mut wave_failed = false;
        for (action, outcome) in wave.iter().zip(outcomes) {
            match outcome {
                Ok(attributes) => {
                    known.insert(action.key(), attributes.clone());
                    result.add_success(action, success_message(action), attributes);
                }
                Err(e) => {
                    tracing::warn!(resource = %action.key(), error = %e, "Action failed");
                    result.add_failure(action, e.to_string());
                    wave_failed = true;
                }
            }
        }

        if wave_failed {
            for later in waves.iter().skip(index + 1).flatten() {
                result.add_skipped(later);
            }
            break;
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    Ok(result)
}

async fn run_action<P>(
    provider: &P,
    action: &Action,
    known: &HashMap<String, Attributes>,
) -> Result<Attributes>
where
    P: CloudProvider + ?Sized,
{
    let mut resolved = action.clone();
    resolved.config = reference::resolve(&action.config, known)?;
    tracing::info!(
        resource = %action.key(),
        action = %action.action_type,
        "Applying"
    );
    provider.apply_action(&resolved).await
}

fn success_message(action: &Action) -> String {
    match action.action_type {
        crate::ActionType::NoOp => format!("{} is up to date", action.key()),
        // create -> created, replace -> replaced, ...
        other => format!("{} {}d", action.key(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;
    use crate::error::CloudError;
    use crate::provider::{AuthStatus, ResourceSet};
    use crate::reference::attr;
    use crate::state::ProviderState;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records applied bodies; fails on resources named "broken"
    #[derive(Default)]
    struct RecordingProvider {
        applied: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait]
    impl CloudProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn display_name(&self) -> &str {
            "Recording"
        }

        async fn check_auth(&self) -> Result<AuthStatus> {
            Ok(AuthStatus::ok("test"))
        }

        async fn get_state(&self, _desired: &ResourceSet) -> Result<ProviderState> {
            Ok(ProviderState::new())
        }

        async fn plan(&self, _desired: &ResourceSet) -> Result<Plan> {
            Ok(Plan::empty())
        }

        async fn plan_destroy(&self, _desired: &ResourceSet) -> Result<Plan> {
            Ok(Plan::empty())
        }

        async fn apply_action(&self, action: &Action) -> Result<Attributes> {
            if action.resource_id == "broken" {
                return Err(CloudError::ApiError("quota exceeded".to_string()));
            }
            self.applied
                .lock()
                .unwrap()
                .push((action.key(), action.config.clone()));
            let mut attrs = Attributes::new();
            attrs.insert("selfLink".to_string(), json!(format!("link/{}", action.resource_id)));
            Ok(attrs)
        }
    }

    #[tokio::test]
    async fn test_references_resolved_from_earlier_waves() {
        let provider = RecordingProvider::default();
        let plan = Plan::new(vec![
            Action::new(ActionType::Create, "backend-bucket", "site", "").in_wave(0),
            Action::new(ActionType::Create, "url-map", "web", "")
                .with_config(json!({ "defaultService": attr("backend-bucket:site", "selfLink") }))
                .in_wave(1),
        ]);

        let result = provider.apply(&plan).await.unwrap();
        assert!(result.is_success());

        let applied = provider.applied.lock().unwrap();
        assert_eq!(applied[1].0, "url-map:web");
        assert_eq!(applied[1].1, json!({ "defaultService": "link/site" }));
    }

    #[tokio::test]
    async fn test_failure_skips_later_waves() {
        let provider = RecordingProvider::default();
        let plan = Plan::new(vec![
            Action::new(ActionType::Create, "redis-instance", "broken", "").in_wave(0),
            Action::new(ActionType::Create, "secret", "host", "").in_wave(0),
            Action::new(ActionType::Create, "secret-version", "host", "").in_wave(1),
        ]);

        let result = provider.apply(&plan).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.skipped, vec!["create-secret-version-host"]);
    }

    #[tokio::test]
    async fn test_unresolvable_reference_fails_action() {
        let provider = RecordingProvider::default();
        let plan = Plan::new(vec![
            Action::new(ActionType::Create, "secret-version", "host", "")
                .with_config(json!({ "payload": attr("redis-instance:cache", "host") })),
        ]);

        let result = provider.apply(&plan).await.unwrap();
        assert_eq!(result.failed.len(), 1);
        assert!(provider.applied.lock().unwrap().is_empty());
    }
}
