use site_core::SiteContext;

use crate::{config::OwnerProfile, sessions::SessionRegistry};

pub(crate) struct AppState {
    pub(crate) site: SiteContext,
    pub(crate) sessions: SessionRegistry,
    pub(crate) owner: OwnerProfile,
    pub(crate) cookie_secure: bool,
}

impl AppState {
    pub(crate) fn new(site: SiteContext, owner: OwnerProfile, cookie_secure: bool) -> Self {
        Self {
            site,
            sessions: SessionRegistry::default(),
            owner,
            cookie_secure,
        }
    }
}
