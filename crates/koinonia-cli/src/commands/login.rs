//! Login command.

use std::time::Duration;

use anyhow::Result;
use koinonia_auth::{AuthStatus, LoginRedirect};
use tokio::time::error::Elapsed;

use super::{App, CommonArgs};
use crate::ui;

/// How long to wait for the signed-in session to come through.
const SESSION_WAIT: Duration = Duration::from_secs(5);

/// Login command arguments.
#[derive(Debug, Clone, Default)]
pub struct LoginArgs {
    /// Account email.
    pub email: Option<String>,
    /// Password; prompted when absent.
    pub password: Option<String>,
    /// Request a magic link instead of a password sign-in.
    pub magic_link: bool,
    /// Login page query carrying the original destination.
    pub redirect: Option<String>,
    /// Landing URL for the magic link.
    pub redirect_to: Option<String>,
}

/// Run the login command.
pub async fn run_login(common: CommonArgs, args: LoginArgs) -> Result<()> {
    let app = App::open(common)?;
    let result = login(&app, args).await;
    app.close().await?;
    result
}

async fn login(app: &App, args: LoginArgs) -> Result<()> {
    let email = match args.email {
        Some(email) => email,
        None => ui::input("Email")?,
    };

    if args.magic_link {
        return match app
            .auth
            .sign_in_with_magic_link(&email, args.redirect_to.as_deref())
            .await
        {
            Ok(()) => {
                ui::success(&format!("Sign-in link sent to {}", email.trim()));
                ui::info("Open the link in your email to finish signing in");
                Ok(())
            }
            Err(e) => {
                ui::error(&e.user_message());
                anyhow::bail!("Magic link request failed");
            }
        };
    }

    let password = match args.password {
        Some(password) => password,
        None => ui::password("Password")?,
    };

    if let Err(e) = app.auth.sign_in_with_password(&email, &password).await {
        ui::error(&e.user_message());
        anyhow::bail!("Sign-in failed");
    }

    // The session lands through the change stream
    let mut receiver = app.auth.watch();
    session_arrived(
        tokio::time::timeout(
            SESSION_WAIT,
            receiver.wait_for(|s| s.status() == AuthStatus::Authenticated),
        )
        .await,
    );

    let snapshot = app.ready().await;
    let Some(user) = snapshot.user() else {
        anyhow::bail!("Sign-in was accepted but no session arrived");
    };

    let label = snapshot
        .profile
        .as_ref()
        .map_or_else(|| user.id.to_string(), |p| p.label(Some(user)).to_string());
    ui::success(&format!("Signed in as {label}"));

    let routes = &app.config.routes;
    let destination = LoginRedirect::from_query(
        args.redirect.as_deref().unwrap_or_default(),
        &routes.redirect_param,
    )
    .destination(&routes.default_landing);
    ui::kv("Continue to", &destination);

    Ok(())
}

/// Log why the session did not come through, if it did not.
fn session_arrived<T, E>(outcome: Result<Result<T, E>, Elapsed>) -> bool {
    match outcome {
        Ok(Ok(_)) => true,
        Ok(Err(_)) => {
            tracing::debug!("Auth state channel closed before the session arrived");
            false
        }
        Err(_) => {
            tracing::debug!(
                wait_secs = SESSION_WAIT.as_secs(),
                "Session event did not arrive in time"
            );
            false
        }
    }
}
