//! Route guard and login redirect handling.

use url::form_urlencoded;

use koinonia_core::config::RoutesConfig;
use koinonia_core::validation::sanitize_redirect_target;

use crate::state::{AuthSnapshot, AuthStatus};

/// Outcome of evaluating a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Auth state not known yet; render nothing and do not redirect.
    Pending,
    /// Render the protected content.
    Allow,
    /// Navigate elsewhere.
    Redirect {
        /// Target location.
        to: String,
    },
    /// Authenticated but lacking the required capability.
    Forbidden,
}

/// Gates a location behind authentication and, optionally, admin rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    login_path: String,
    redirect_param: String,
    access_denied_path: Option<String>,
    require_admin: bool,
}

impl RouteGuard {
    /// Guard that sends anonymous users to `login_path`, carrying the
    /// original location in `redirect_param`.
    #[must_use]
    pub fn new(login_path: impl Into<String>, redirect_param: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
            redirect_param: redirect_param.into(),
            access_denied_path: None,
            require_admin: false,
        }
    }

    /// Guard configured from route settings.
    #[must_use]
    pub fn from_config(config: &RoutesConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            redirect_param: config.redirect_param.clone(),
            access_denied_path: config.access_denied_path.clone(),
            require_admin: false,
        }
    }

    /// Also require the admin capability.
    #[must_use]
    pub const fn require_admin(mut self) -> Self {
        self.require_admin = true;
        self
    }

    /// Redirect under-privileged users here instead of answering `Forbidden`.
    #[must_use]
    pub fn access_denied_path(mut self, path: impl Into<String>) -> Self {
        self.access_denied_path = Some(path.into());
        self
    }

    /// Whether the admin capability is required.
    #[must_use]
    pub const fn requires_admin(&self) -> bool {
        self.require_admin
    }

    /// Decide what to do with a navigation to `location` (path, query and
    /// fragment as the user requested it).
    #[must_use]
    pub fn evaluate(&self, snapshot: &AuthSnapshot, location: &str) -> GuardDecision {
        match snapshot.status() {
            AuthStatus::Loading => GuardDecision::Pending,
            AuthStatus::Anonymous => {
                let to = self.login_url(location);
                tracing::debug!(%location, %to, "Guard redirecting to login");
                GuardDecision::Redirect { to }
            }
            AuthStatus::Authenticated if self.require_admin && !snapshot.capabilities().is_admin() => {
                tracing::debug!(%location, "Guard denied non-admin user");
                self.access_denied_path
                    .as_ref()
                    .map_or(GuardDecision::Forbidden, |to| GuardDecision::Redirect {
                        to: to.clone(),
                    })
            }
            AuthStatus::Authenticated => GuardDecision::Allow,
        }
    }

    /// Login URL carrying `location` as the redirect target.
    #[must_use]
    pub fn login_url(&self, location: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(&self.redirect_param, location)
            .finish();
        let separator = if self.login_path.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.login_path)
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::from_config(&RoutesConfig::default())
    }
}

/// Redirect target carried into the login flow, consumed once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginRedirect {
    target: Option<String>,
}

impl LoginRedirect {
    /// Read the target from a query string (with or without the leading `?`).
    ///
    /// Targets that are not same-origin absolute paths are dropped.
    #[must_use]
    pub fn from_query(query: &str, param: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let raw = form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.into_owned());

        let target = raw.as_deref().and_then(|raw| {
            let sanitized = sanitize_redirect_target(raw);
            if sanitized.is_none() {
                tracing::warn!(redirect = %raw, "Ignoring unsafe redirect target");
            }
            sanitized
        });

        Self { target }
    }

    /// Read the target from a full login location such as
    /// `/login?redirect=%2Fstudies`.
    #[must_use]
    pub fn from_location(location: &str, param: &str) -> Self {
        let query = location
            .split_once('?')
            .map_or("", |(_, rest)| rest.split('#').next().unwrap_or_default());
        Self::from_query(query, param)
    }

    /// The sanitized target, if one was present.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Where to go after a successful sign-in.
    #[must_use]
    pub fn destination(self, default: &str) -> String {
        self.target.unwrap_or_else(|| default.to_string())
    }
}
