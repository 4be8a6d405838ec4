pub mod chat;
pub mod conversation;
pub mod merchant;
pub mod order;
pub mod product;
pub mod session;
