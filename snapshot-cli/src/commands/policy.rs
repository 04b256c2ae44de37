use crate::config::Config;
use crate::utils::Result;
use clap::ValueEnum;
use snapshot_server::policy::{effective_policy, EffectivePolicy, Policy, PolicyTarget};
use snapshot_server::repository::{Repository, SqliteRepository};
use std::path::Path;

/// Value of the `expose-metrics` knob on one policy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExposeMetrics {
    #[value(name = "true")]
    Enabled,
    #[value(name = "false")]
    Disabled,
    /// Clear the value so the level above applies
    Inherit,
}

impl ExposeMetrics {
    fn as_option(self) -> Option<bool> {
        match self {
            ExposeMetrics::Enabled => Some(true),
            ExposeMetrics::Disabled => Some(false),
            ExposeMetrics::Inherit => None,
        }
    }
}

/// `None` selects the global policy.
pub fn target_for(config: &Config, path: Option<&Path>) -> Result<PolicyTarget> {
    Ok(match path {
        Some(path) => PolicyTarget::Source(config.source_for(path)?),
        None => PolicyTarget::Global,
    })
}

pub fn set_expose_metrics(
    repo: &SqliteRepository,
    target: &PolicyTarget,
    value: ExposeMetrics,
) -> Result<Policy> {
    let mut policy = repo.get_policy(target)?.unwrap_or_default();
    policy.expose_metrics = value.as_option();
    repo.set_policy(target, &policy)?;
    tracing::info!("Set expose-metrics to {:?} on {}", value, describe(target));
    Ok(policy)
}

/// The policy stored at `target` and what applies there after inheritance.
pub fn show(repo: &SqliteRepository, target: &PolicyTarget) -> Result<(Policy, EffectivePolicy)> {
    let global = repo.get_policy(&PolicyTarget::Global)?;
    Ok(match target {
        PolicyTarget::Global => {
            let policy = global.unwrap_or_default();
            (policy, effective_policy(Some(&policy), None))
        }
        PolicyTarget::Source(_) => {
            let policy = repo.get_policy(target)?.unwrap_or_default();
            (policy, effective_policy(global.as_ref(), Some(&policy)))
        }
    })
}

pub fn describe(target: &PolicyTarget) -> String {
    match target {
        PolicyTarget::Global => "(global)".to_string(),
        PolicyTarget::Source(source) => source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;

    #[test]
    fn test_source_override_and_inherit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::open(&dir.path().join("repo.db")).unwrap();
        let config = Config {
            identity: IdentityConfig {
                host: Some("h".into()),
                user: Some("u".into()),
            },
            ..Config::default()
        };
        let source = target_for(&config, Some(dir.path())).unwrap();

        set_expose_metrics(&repo, &PolicyTarget::Global, ExposeMetrics::Disabled).unwrap();
        assert!(!show(&repo, &source).unwrap().1.expose_metrics);

        set_expose_metrics(&repo, &source, ExposeMetrics::Enabled).unwrap();
        assert!(show(&repo, &source).unwrap().1.expose_metrics);
        assert!(!show(&repo, &PolicyTarget::Global).unwrap().1.expose_metrics);

        let cleared = set_expose_metrics(&repo, &source, ExposeMetrics::Inherit).unwrap();
        assert!(cleared.is_empty());
        assert_eq!(repo.get_policy(&source).unwrap(), None);
        assert!(!show(&repo, &source).unwrap().1.expose_metrics);
    }
}
