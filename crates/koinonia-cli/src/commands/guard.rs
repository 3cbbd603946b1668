//! Guard command - evaluate the route guard for a location.

use anyhow::Result;
use koinonia_auth::{GuardDecision, RouteGuard};

use super::{App, CommonArgs};
use crate::ui;

/// Guard command arguments.
#[derive(Debug, Clone)]
pub struct GuardArgs {
    /// Requested location.
    pub location: String,
    /// Require admin rights.
    pub admin: bool,
}

/// Run the guard command.
pub async fn run_guard(common: CommonArgs, args: GuardArgs) -> Result<()> {
    let app = App::open(common)?;
    let snapshot = app.ready().await;

    let mut guard = RouteGuard::from_config(&app.config.routes);
    if args.admin {
        guard = guard.require_admin();
    }

    match guard.evaluate(&snapshot, &args.location) {
        GuardDecision::Allow => ui::success(&format!("Allowed: {}", args.location)),
        GuardDecision::Redirect { to } => ui::info(&format!("Redirect to {to}")),
        GuardDecision::Forbidden => ui::error("Access denied: admin rights required"),
        GuardDecision::Pending => ui::warning("Auth state still loading"),
    }

    app.close().await
}
