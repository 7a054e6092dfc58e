mod auth;
mod ping;

pub use auth::{login, logout, logout_all, me, refresh, register, REFRESH_COOKIE};
pub use ping::ping;
