//! The startup report: every plugin's final state after one startup pass.

use std::fmt;

use crate::manager::PluginState;
use crate::manifest::PluginId;

/// One plugin's line in the startup report.
#[derive(Debug, Clone)]
pub struct PluginReportEntry {
    pub id: PluginId,
    pub state: PluginState,
    /// Rendered error for `Failed`/`Skipped` plugins.
    pub error: Option<String>,
}

/// Aggregated outcome of startup: plugin states plus any configuration and
/// discovery problems that surfaced along the way.
///
/// Published as the payload of `framework.started` or
/// `framework.startup_failed` so reporter collaborators can forward it.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub plugins: Vec<PluginReportEntry>,
    pub config_errors: Vec<String>,
}

impl StartupReport {
    /// True when any plugin failed or was skipped, or any config or
    /// discovery error was recorded.
    pub fn has_failures(&self) -> bool {
        !self.config_errors.is_empty()
            || self
                .plugins
                .iter()
                .any(|p| matches!(p.state, PluginState::Failed | PluginState::Skipped))
    }

    /// JSON rendering used as the bus event payload.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "plugins": self
                .plugins
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id.to_string(),
                        "state": p.state.to_string(),
                        "error": p.error,
                    })
                })
                .collect::<Vec<_>>(),
            "config_errors": self.config_errors,
        })
    }
}

impl fmt::Display for StartupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "startup report:")?;
        for entry in &self.plugins {
            let id = entry.id.to_string();
            let state = entry.state.to_string();
            match &entry.error {
                Some(error) => writeln!(f, "  {id:<24} {state:<10} {error}")?,
                None => writeln!(f, "  {id:<24} {state}")?,
            }
        }
        for error in &self.config_errors {
            writeln!(f, "  config error: {error}")?;
        }
        Ok(())
    }
}
