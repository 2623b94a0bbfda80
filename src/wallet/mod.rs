pub mod cache;
pub mod notebook;
pub mod sync;
pub mod types;

pub use cache::WalletCache;
pub use notebook::NoteBook;
pub use sync::{AccountSyncer, AddressSyncer};
pub use types::*;
