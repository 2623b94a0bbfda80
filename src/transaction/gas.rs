use serde::{Deserialize, Serialize};

/// Gas limit and price of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gas {
	pub limit: u64,
	pub price: u64,
}

impl Gas {
	pub const DEFAULT_LIMIT: u64 = 2_500_000_000;
	pub const DEFAULT_PRICE: u64 = 1;

	pub fn new(limit: u64, price: u64) -> Self {
		Self { limit, price }
	}

	/// Most the transaction can spend on gas.
	pub fn total(&self) -> u64 {
		self.limit.saturating_mul(self.price)
	}
}

impl Default for Gas {
	fn default() -> Self {
		Self::new(Self::DEFAULT_LIMIT, Self::DEFAULT_PRICE)
	}
}
