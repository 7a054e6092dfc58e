/// Domain records: users, refresh tokens, identifiers

mod id;
mod token;
mod user;

pub use id::{generate_id, ID_LENGTH};
pub use token::{RefreshToken, TokenState};
pub use user::{normalize_email, NewUser, Provider, Role, User};
