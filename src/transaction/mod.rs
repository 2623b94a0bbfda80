/// Transaction builder for both ledgers
pub mod builder;
pub mod bookkeeper;
pub mod gas;
pub mod nonce;
pub mod prover;
pub mod validation;

pub use bookkeeper::Bookkeeper;
pub use builder::{BuiltTransaction, Spend, TransactionBuilder, TransactionContext, TransactionError};
pub use gas::Gas;
pub use nonce::{ChainNonce, NonceSource};
pub use prover::{Prover, RemoteProver};

/// Number of decimal places of DUSK; amounts are counted in LUX.
pub const DUSK_DECIMALS: u32 = 9;
