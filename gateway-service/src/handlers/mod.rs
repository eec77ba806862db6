pub mod apps;
pub mod auth;
pub mod proxy;

pub use apps::{
    check_access, create_client, create_secret, delete_client, delete_secret, get_secret,
    list_clients, list_secrets,
};
pub use auth::{current_user, login};
pub use proxy::forward;
