pub mod cookies;
pub mod handlers;
pub mod middleware;
pub mod pkce;
pub mod provider;
pub mod session;

pub use provider::{AuthError, AuthProvider, SupabaseAuth};
pub use session::SessionCache;
