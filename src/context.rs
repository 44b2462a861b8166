// Explicit request context, threaded as a parameter instead of being read
// from ambient session state.
use uuid::Uuid;

/// Identity and ownership information for one request.
///
/// Supplied by the session/authentication layer; this engine only stamps it
/// onto newly created objects and relays it, it never computes ownership.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Active organization the created objects belong to.
    pub organization: Option<String>,
    /// Application the request was issued through.
    pub application: Option<Uuid>,
    /// Owner identifier, allowed to be absent.
    pub owner: Option<String>,
}

impl RequestContext {
    pub fn new(organization: impl Into<String>) -> Self {
        Self { organization: Some(organization.into()), application: None, owner: None }
    }

    pub fn with_application(mut self, application: Uuid) -> Self {
        self.application = Some(application);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}
