//! Ending a session the server has conclusively rejected.

use std::sync::{Arc, Mutex};

use crate::auth::SessionStore;

/// Routing facility of the host application.
pub trait Navigator: Send + Sync {
    fn current_location(&self) -> String;
    fn redirect(&self, path: &str);
    /// Remember where the user was so login can send them back.
    fn remember_intended_path(&self, path: &str);
}

/// Navigator without a UI: tracks location, redirects and the intended path
/// in memory. Useful for CLIs, background workers and tests.
#[derive(Debug, Default)]
pub struct HeadlessNavigator {
    state: Mutex<NavigatorState>,
}

#[derive(Debug, Default)]
struct NavigatorState {
    location: String,
    intended: Option<String>,
    redirects: Vec<String>,
}

impl HeadlessNavigator {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(NavigatorState {
                location: location.into(),
                ..Default::default()
            }),
        }
    }

    /// Move without recording a redirect, as a user clicking a link would.
    pub fn navigate(&self, path: impl Into<String>) {
        self.lock().location = path.into();
    }

    pub fn redirects(&self) -> Vec<String> {
        self.lock().redirects.clone()
    }

    pub fn intended_path(&self) -> Option<String> {
        self.lock().intended.clone()
    }

    /// Consume the remembered path after a successful login.
    pub fn take_intended_path(&self) -> Option<String> {
        self.lock().intended.take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavigatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Navigator for HeadlessNavigator {
    fn current_location(&self) -> String {
        self.lock().location.clone()
    }

    fn redirect(&self, path: &str) {
        let mut state = self.lock();
        state.location = path.to_string();
        state.redirects.push(path.to_string());
    }

    fn remember_intended_path(&self, path: &str) {
        self.lock().intended = Some(path.to_string());
    }
}

/// What [`SessionTerminator::terminate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Credentials cleared and the user sent to login from `from`.
    Redirected { from: String },
    /// Credentials cleared; already on a login or public route.
    StayedOnPublicRoute,
    /// Nothing to do; the session was already terminated.
    AlreadyTerminated,
}

/// Clears credentials and sends the user to the login route.
pub struct SessionTerminator {
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    login_path: String,
    public_paths: Vec<String>,
    terminated: Mutex<bool>,
}

impl std::fmt::Debug for SessionTerminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTerminator")
            .field("login_path", &self.login_path)
            .field("public_paths", &self.public_paths)
            .finish_non_exhaustive()
    }
}

impl SessionTerminator {
    pub fn new(
        session: SessionStore,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
        public_paths: Vec<String>,
    ) -> Self {
        Self {
            session,
            navigator,
            login_path: login_path.into(),
            public_paths,
            terminated: Mutex::new(false),
        }
    }

    /// Clear the session and redirect to login unless already on a public route.
    ///
    /// Repeated calls are no-ops until [`rearm`](Self::rearm), even when
    /// clearing the store failed.
    pub fn terminate(&self) -> Termination {
        let mut terminated = self.terminated.lock().unwrap_or_else(|e| e.into_inner());
        if *terminated {
            tracing::debug!("Session already terminated");
            return Termination::AlreadyTerminated;
        }
        *terminated = true;

        if !self.session.clear_session() {
            tracing::warn!("Session terminated but stored credentials could not be fully cleared");
        }

        let location = self.navigator.current_location();
        if self.is_public(&location) {
            tracing::info!(location = %location, "Session terminated");
            return Termination::StayedOnPublicRoute;
        }

        self.navigator.remember_intended_path(&location);
        self.navigator.redirect(&self.login_path);
        tracing::info!(from = %location, to = %self.login_path, "Session terminated, redirecting to login");
        Termination::Redirected { from: location }
    }

    /// Allow the next [`terminate`](Self::terminate) to act again.
    pub fn rearm(&self) {
        *self.terminated.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    /// Login route or one of the configured public routes.
    pub fn is_public(&self, location: &str) -> bool {
        let route = crate::transport::route_of(location);
        std::iter::once(&self.login_path)
            .chain(self.public_paths.iter())
            .any(|public| route_matches(route, public))
    }
}

fn route_matches(route: &str, public: &str) -> bool {
    let public = public.trim_end_matches('/');
    if public.is_empty() {
        return route == "/";
    }
    route == public
        || route
            .strip_prefix(public)
            .is_some_and(|rest| rest.starts_with('/'))
}
