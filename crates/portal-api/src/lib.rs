pub mod auth;
pub mod error;
pub mod middleware;
pub mod reports;
pub mod students;
pub mod uploads;

use std::sync::Arc;

use portal_core::dispatch::ReportDispatcher;
use portal_core::identity::IdentityResolver;
use portal_core::images::UploadStorage;
use portal_core::oauth::IdentityProvider;
use portal_core::reports::ReportStore;
use portal_core::students::StudentRegistry;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub identity: IdentityResolver,
    pub students: StudentRegistry,
    pub reports: ReportStore,
    pub dispatcher: ReportDispatcher,
    pub storage: Arc<UploadStorage>,
    /// `None` when Google OAuth credentials were not configured.
    pub google: Option<Arc<dyn IdentityProvider>>,
    pub session_secret: String,
}
