//! Services layer
//!
//! Logic that spans repositories: password hashing, login and the typed
//! site settings view.

pub mod auth;
pub mod password;
pub mod settings;

pub use auth::{AuthError, AuthService};
pub use password::{HashFormat, HasherCapabilities, PasswordError, PasswordHasher};
pub use settings::{SettingsService, SiteSettings};
