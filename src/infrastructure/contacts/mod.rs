//! Local contact photo adapters.

mod directory;

pub use directory::DirectoryContacts;
