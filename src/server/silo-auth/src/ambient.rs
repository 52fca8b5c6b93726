//! Scoped installation of an authentication context into ambient request state.
//!
//! Some code still reads the current user and token from the request object
//! instead of receiving an [`AuthenticationContext`]. [`AuthenticationContext::applied_to`]
//! installs a context on such a target for the lifetime of the returned
//! [`AppliedContext`] guard and puts the target back into its exact previous
//! shape when the guard is dropped, whether the scope ends normally, unwinds,
//! or is cancelled.
//!
//! The fallback target is the task-local current request set with
//! [`with_current_request`]. A target shared between concurrent requests must
//! be held exclusively by the caller for the whole scope.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{AuthenticatedToken, AuthenticationContext, Principal};

/// Request state shared with the task serving it.
pub type SharedRequest = Arc<Mutex<RequestEnv>>;

tokio::task_local! {
    static CURRENT_REQUEST: SharedRequest;
}

/// Runs `f` with `request` as the current request of this task.
pub async fn with_current_request<F: Future>(request: SharedRequest, f: F) -> F::Output {
    CURRENT_REQUEST.scope(request, f).await
}

/// Synchronous variant of [`with_current_request`].
pub fn sync_with_current_request<R>(request: SharedRequest, f: impl FnOnce() -> R) -> R {
    CURRENT_REQUEST.sync_scope(request, f)
}

/// The current request of this task, if one was set.
pub fn current_request() -> Option<SharedRequest> {
    CURRENT_REQUEST.try_with(Arc::clone).ok()
}

/// Principal installed on the current request, if any.
pub fn current_principal() -> Option<Principal> {
    let request = current_request()?;
    let env = lock(&request);
    env.user().cloned()
}

/// Attribute names understood by ambient targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientAttr {
    /// The current identity.
    User,
    /// The current token.
    Auth,
}

/// Attribute value, tagged by attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AmbientValue {
    /// Value of [`AmbientAttr::User`].
    User(Principal),
    /// Value of [`AmbientAttr::Auth`]; the attribute may exist and be empty.
    Auth(Option<AuthenticatedToken>),
}

impl AmbientValue {
    /// Attribute this value belongs to.
    pub fn attr(&self) -> AmbientAttr {
        match self {
            AmbientValue::User(_) => AmbientAttr::User,
            AmbientValue::Auth(_) => AmbientAttr::Auth,
        }
    }
}

/// Object carrying ambient identity attributes.
///
/// `get` returns `None` when the attribute does not exist at all, which is
/// distinct from an existing attribute holding an empty value.
pub trait AmbientTarget: Send {
    /// Reads an attribute.
    fn get(&self, attr: AmbientAttr) -> Option<AmbientValue>;

    /// Creates or overwrites an attribute.
    fn set(&mut self, value: AmbientValue);

    /// Deletes an attribute.
    fn remove(&mut self, attr: AmbientAttr);
}

/// Per-request ambient state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestEnv {
    user: Option<Principal>,
    auth: Option<Option<AuthenticatedToken>>,
}

impl RequestEnv {
    /// Creates a request with neither attribute.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current identity, if the attribute exists.
    pub fn user(&self) -> Option<&Principal> {
        self.user.as_ref()
    }

    /// Current token; `None` if the attribute does not exist.
    pub fn auth(&self) -> Option<Option<&AuthenticatedToken>> {
        self.auth.as_ref().map(Option::as_ref)
    }

    /// Whether the identity attribute exists.
    pub fn has_user(&self) -> bool {
        self.user.is_some()
    }

    /// Whether the token attribute exists.
    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }
}

impl AmbientTarget for RequestEnv {
    fn get(&self, attr: AmbientAttr) -> Option<AmbientValue> {
        match attr {
            AmbientAttr::User => self.user.clone().map(AmbientValue::User),
            AmbientAttr::Auth => self.auth.clone().map(AmbientValue::Auth),
        }
    }

    fn set(&mut self, value: AmbientValue) {
        match value {
            AmbientValue::User(user) => self.user = Some(user),
            AmbientValue::Auth(auth) => self.auth = Some(auth),
        }
    }

    fn remove(&mut self, attr: AmbientAttr) {
        match attr {
            AmbientAttr::User => self.user = None,
            AmbientAttr::Auth => self.auth = None,
        }
    }
}

/// State of one attribute before installation.
#[derive(Debug, Clone, PartialEq)]
pub enum Prior {
    /// The attribute did not exist; restoration deletes it.
    Absent,
    /// The attribute existed; restoration writes the value back.
    Present(AmbientValue),
}

/// Pre-installation state of both attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbientSnapshot {
    user: Prior,
    auth: Prior,
}

impl AmbientSnapshot {
    /// Records the current state of `target`.
    pub fn capture(target: &dyn AmbientTarget) -> Self {
        let prior = |attr| target.get(attr).map_or(Prior::Absent, Prior::Present);
        Self {
            user: prior(AmbientAttr::User),
            auth: prior(AmbientAttr::Auth),
        }
    }

    /// Returns `target` to the recorded state.
    pub fn restore(self, target: &mut dyn AmbientTarget) {
        for (attr, prior) in [(AmbientAttr::User, self.user), (AmbientAttr::Auth, self.auth)] {
            match prior {
                Prior::Present(value) => target.set(value),
                Prior::Absent => target.remove(attr),
            }
        }
    }
}

enum Slot<'a> {
    Borrowed(&'a mut dyn AmbientTarget),
    Current(SharedRequest),
}

/// Guard restoring ambient state on drop.
#[must_use = "the context is removed again when the guard is dropped"]
pub struct AppliedContext<'a> {
    installed: Option<(Slot<'a>, AmbientSnapshot)>,
}

impl AppliedContext<'_> {
    /// Whether a target was found and modified.
    pub fn is_installed(&self) -> bool {
        self.installed.is_some()
    }

    /// Runs `f` against the target, if one was installed.
    pub fn with_target<R>(&mut self, f: impl FnOnce(&mut dyn AmbientTarget) -> R) -> Option<R> {
        match &mut self.installed {
            Some((Slot::Borrowed(target), _)) => Some(f(&mut **target)),
            Some((Slot::Current(request), _)) => Some(f(&mut *lock(request))),
            None => None,
        }
    }
}

impl Drop for AppliedContext<'_> {
    fn drop(&mut self) {
        let Some((slot, snapshot)) = self.installed.take() else {
            return;
        };
        match slot {
            Slot::Borrowed(target) => snapshot.restore(target),
            Slot::Current(request) => snapshot.restore(&mut *lock(&request)),
        }
        tracing::trace!("Restored ambient authentication state");
    }
}

impl AuthenticationContext {
    /// Installs this context on `target` until the returned guard is dropped.
    ///
    /// Without an explicit target the task-local current request is used;
    /// without either, nothing is installed and the guard is inert.
    pub fn applied_to<'a>(&self, target: Option<&'a mut dyn AmbientTarget>) -> AppliedContext<'a> {
        let mut slot = match target {
            Some(target) => Slot::Borrowed(target),
            None => match current_request() {
                Some(request) => Slot::Current(request),
                None => return AppliedContext { installed: None },
            },
        };

        let snapshot = match &mut slot {
            Slot::Borrowed(target) => self.install(&mut **target),
            Slot::Current(request) => self.install(&mut *lock(request)),
        };

        AppliedContext {
            installed: Some((slot, snapshot)),
        }
    }

    fn install(&self, target: &mut dyn AmbientTarget) -> AmbientSnapshot {
        let snapshot = AmbientSnapshot::capture(&*target);
        target.set(AmbientValue::User(self.principal()));
        target.set(AmbientValue::Auth(self.auth.clone()));
        snapshot
    }
}

fn lock(request: &SharedRequest) -> MutexGuard<'_, RequestEnv> {
    request.lock().unwrap_or_else(PoisonError::into_inner)
}
