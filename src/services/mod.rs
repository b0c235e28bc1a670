pub mod auth;
pub mod chat;
pub mod token;

pub use auth::{AuthService, ClientInfo};
pub use chat::ChatService;
pub use token::SessionTokens;
