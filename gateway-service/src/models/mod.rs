pub mod identity;
pub mod principal;
pub mod team;

pub use identity::{AppGroup, AppSecret, AuthDomain};
pub use principal::{Credentials, Principal, DEFAULT_ROLE};
pub use team::Team;
