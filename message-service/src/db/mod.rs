pub mod repository;

pub use repository::MessageStore;
