use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::backend::Backend;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub identity: Arc<dyn IdentityProvider>,
}
