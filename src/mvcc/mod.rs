pub mod token;
pub mod tracker;

pub use token::Token;
pub use tracker::{TokenManager, TokenTracker};
