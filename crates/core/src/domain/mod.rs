pub mod conversation;
pub mod message;
pub mod persona;
pub mod safety;
