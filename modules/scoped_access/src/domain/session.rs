use tokio::sync::watch;
use tracing::info;

use crate::contract::model::UserProfile;

/// Process-wide holder of the signed-in principal.
///
/// Consumers observe profile changes through [`Session::watch`]; nothing reads
/// the profile from ambient global state.
#[derive(Debug)]
pub struct Session {
    tx: watch::Sender<Option<UserProfile>>,
}

impl Session {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn sign_in(&self, profile: UserProfile) {
        info!(uid = %profile.uid, role = %profile.role, "principal signed in");
        self.tx.send_replace(Some(profile));
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("principal signed out");
        }
    }

    pub fn current(&self) -> Option<UserProfile> {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<UserProfile>> {
        self.tx.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
