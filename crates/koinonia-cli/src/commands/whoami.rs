//! Whoami command - show the signed-in user, profile, and capabilities.

use anyhow::Result;

use super::{App, CommonArgs};
use crate::ui;

/// Run the whoami command.
pub async fn run_whoami(common: CommonArgs) -> Result<()> {
    let app = App::open(common)?;
    let snapshot = app.ready().await;

    match snapshot.user() {
        None => {
            ui::info("Not signed in");
            ui::info("Run 'koinonia login' to sign in");
        }
        Some(user) => {
            let capabilities = snapshot.capabilities();
            ui::header("Signed in");
            ui::kv("User ID", user.id.as_ref());
            ui::kv_opt("Email", user.email.as_deref());

            if let Some(profile) = &snapshot.profile {
                ui::kv("Name", profile.label(Some(user)));
                ui::kv_opt("Church", profile.church_id.as_deref());
            }
            ui::kv("Role", &capabilities.role().to_string());
            ui::kv("Admin", if capabilities.is_admin() { "yes" } else { "no" });

            if let Some(expires_at) = snapshot.session.as_ref().and_then(|s| s.expires_at) {
                ui::kv("Session expires", &expires_at.to_rfc3339());
            }
        }
    }

    app.close().await
}
