pub mod brand;
pub mod chat;
pub mod events;
pub mod projects;
