pub mod db;
pub mod memory;

pub use db::{PgIdentityAdapter, PgTicketStore};
pub use memory::MemoryBackend;
