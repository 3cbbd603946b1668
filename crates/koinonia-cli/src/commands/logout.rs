//! Logout command.

use anyhow::Result;
use koinonia_auth::AuthStatus;

use super::{App, CommonArgs};
use crate::ui;

/// Run the logout command.
pub async fn run_logout(common: CommonArgs) -> Result<()> {
    let app = App::open(common)?;
    let before = app.auth.wait_until_ready().await;

    // Always runs so stale persisted keys are purged too
    app.auth.sign_out().await;

    if before.status() == AuthStatus::Authenticated {
        ui::success("Signed out");
    } else {
        ui::info("Not signed in");
    }

    app.close().await
}
