// Authentication module
// Manages token lifecycle and token persistence

mod manager;
mod refresh;
mod store;
mod types;

pub use manager::TokenManager;
pub use refresh::{token_url, TOKEN_PATH};
pub use store::{load_token, save_token, MemoryStore, SqliteStore, TokenStore, TOKEN_KEY};
pub use types::{Credentials, Token};
