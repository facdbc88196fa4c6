//! Friendly app names derived from series labels

use std::collections::{BTreeMap, HashMap};

use lokicli_types::{AppIdentity, LokiError, Result};

/// Apps that logged within a time range, keyed by friendly name
#[derive(Clone, Debug, Default)]
pub struct AppCatalog {
    apps: BTreeMap<String, AppIdentity>,
}

impl AppCatalog {
    /// Build the catalog from `series` label sets.
    ///
    /// Label sets missing any of `app`, `namespace` or `instance` are skipped.
    pub fn from_series(series: &[HashMap<String, String>]) -> Self {
        let apps = series
            .iter()
            .filter_map(|labels| {
                let identity = AppIdentity::new(
                    labels.get("app")?,
                    labels.get("namespace")?,
                    labels.get("instance")?,
                );
                Some((friendly_name(&identity), identity))
            })
            .collect();

        Self { apps }
    }

    pub fn resolve(&self, name: &str, project: &str) -> Result<&AppIdentity> {
        self.apps.get(name).ok_or_else(|| {
            tracing::error!(
                "No logs found for {} in {} project for the specified time range.",
                name,
                project
            );
            LokiError::AppNotFound {
                app: name.to_string(),
                project: project.to_string(),
            }
        })
    }

    /// Friendly names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// `<app>-<instance>-<env>`, with `production`/`staging` shortened
pub fn friendly_name(identity: &AppIdentity) -> String {
    let env = match identity.namespace.as_str() {
        "production" => "prod",
        "staging" => "stage",
        other => other,
    };
    format!("{}-{}-{}", identity.app, identity.instance, env)
}
