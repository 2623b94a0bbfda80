//! Public account history: GraphQL lookups and per-entry value accounting.

use crate::network::Network;
use crate::wallet::{AccountTransfer, PublicAccount, SyncError};

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
	#[default]
	Asc,
	Desc,
}

impl Order {
	pub fn as_str(&self) -> &'static str {
		match self {
			Order::Asc => "asc",
			Order::Desc => "desc",
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
	pub from: Option<u64>,
	pub to: Option<u64>,
	pub limit: Option<usize>,
	pub order: Order,
	pub cancel: Option<CancellationToken>,
}

pub type HistoryStream = BoxStream<'static, Result<AccountTransfer, SyncError>>;

/// An event emitted while executing a transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerEvent {
	pub target: String,
	pub topic: String,
	#[serde(default)]
	pub data: Value,
}

/// Reference to one transaction touching the account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryRef {
	pub block_height: u64,
	pub origin: String,
	#[serde(default)]
	pub events: Vec<LedgerEvent>,
}

/// Net effect of a transaction's events on one account, fee excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
	pub from: Option<String>,
	pub to: Option<String>,
	pub value: i128,
	/// The account is the moonlight sender and so paid for gas.
	pub paid_gas: bool,
}

impl TransferSummary {
	fn debit(&mut self, account: Option<&str>, address: &str, value: u64) {
		if account == Some(address) {
			self.value -= i128::from(value);
		}
	}

	fn credit(&mut self, account: Option<&str>, address: &str, value: u64) {
		if account == Some(address) {
			self.value += i128::from(value);
		}
	}

	fn sender(&mut self, sender: Option<&str>) {
		if self.from.is_none() {
			self.from = sender.map(str::to_string);
		}
	}

	fn receiver(&mut self, receiver: Option<&str>) {
		if self.to.is_none() {
			self.to = receiver.map(str::to_string);
		}
	}
}

/// Account this value flows to, when it is a public account.
fn moonlight_receiver(receiver: &Value) -> Option<&str> {
	receiver
		.get("Moonlight")
		.and_then(Value::as_str)
		.or_else(|| receiver.as_str())
}

/// Amounts may be encoded as numbers or as decimal strings.
fn amount(value: Option<&Value>) -> u64 {
	match value {
		Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
		Some(Value::String(text)) => text.parse().unwrap_or(0),
		_ => 0,
	}
}

/// Derive sender, receiver and net value for `address` from transfer contract events.
pub fn summarize(address: &str, transfer_contract: &str, events: &[LedgerEvent]) -> TransferSummary {
	let mut summary = TransferSummary::default();

	for event in events.iter().filter(|event| event.target == transfer_contract) {
		let data = &event.data;
		let value = amount(data.get("value"));
		let sender = data.get("sender").and_then(Value::as_str);

		match event.topic.as_str() {
			"moonlight" => {
				let receiver = data.get("receiver").and_then(Value::as_str);
				summary.sender(sender);
				summary.receiver(receiver);
				summary.debit(sender, address, value);
				summary.credit(receiver, address, value);
				if sender == Some(address) {
					summary.paid_gas = true;
				}

				// Unspent deposit returned with the gas refund, counted for the receiver only
				if let Some(Value::Array(refund)) = data.get("refund_info") {
					if receiver == Some(address) {
						let refund_account = refund.first().and_then(Value::as_str);
						summary.credit(refund_account, address, amount(refund.get(1)));
					}
				}
			}
			"convert" => {
				let receiver = data.get("receiver").and_then(moonlight_receiver);
				summary.sender(sender);
				summary.receiver(receiver);
				summary.debit(sender, address, value);
				summary.credit(receiver, address, value);
			}
			"mint" | "withdraw" | "contract_to_account" => {
				let receiver = data.get("receiver").and_then(moonlight_receiver);
				summary.receiver(receiver);
				summary.credit(receiver, address, value);
			}
			"deposit" => {
				summary.sender(sender);
				summary.debit(sender, address, value);
			}
			topic => debug!("Ignoring transfer contract event {}", topic),
		}
	}

	summary
}

fn refs_query(address: &str, options: &HistoryOptions) -> String {
	let mut arguments = vec![
		format!("address: \"{address}\""),
		format!("ordering: \"{}\"", options.order.as_str()),
	];
	if let Some(from) = options.from {
		arguments.push(format!("fromBlock: {from}"));
	}
	if let Some(to) = options.to {
		arguments.push(format!("toBlock: {to}"));
	}
	format!(
		"query {{ fullMoonlightHistory({}) {{ json }} }}",
		arguments.join(", ")
	)
}

fn page_query(refs: &[HistoryRef]) -> String {
	let lookups = refs
		.iter()
		.enumerate()
		.map(|(i, entry)| {
			format!(
				"t{i}: tx(hash: \"{}\") {{ blockHeight blockTimestamp gasSpent err tx {{ gasPrice callData {{ fnName }} }} }}",
				entry.origin
			)
		})
		.join(" ");
	format!("query {{ {lookups} }}")
}

async fn fetch_refs(
	network: &Network,
	address: &str,
	options: &HistoryOptions,
) -> Result<Vec<HistoryRef>, SyncError> {
	let response = network.query(&refs_query(address, options)).await?;
	let refs = match response.pointer("/fullMoonlightHistory/json") {
		None | Some(Value::Null) => Vec::new(),
		Some(json) => Vec::<HistoryRef>::deserialize(json)
			.map_err(|e| SyncError::Query(format!("malformed history references: {e}")))?,
	};

	Ok(match options.limit {
		Some(limit) => refs.into_iter().take(limit).collect(),
		None => refs,
	})
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxLookup {
	block_height: u64,
	block_timestamp: i64,
	gas_spent: u64,
	err: Option<String>,
	tx: TxDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxDetails {
	gas_price: u64,
	call_data: Option<CallData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallData {
	fn_name: String,
}

struct HistoryPages {
	network: Network,
	address: String,
	pages: VecDeque<Vec<HistoryRef>>,
	cancel: Option<CancellationToken>,
}

impl HistoryPages {
	async fn next_page(mut self) -> Result<Option<(Vec<AccountTransfer>, Self)>, SyncError> {
		if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
			return Err(SyncError::Cancelled);
		}
		let Some(page) = self.pages.pop_front() else {
			return Ok(None);
		};

		let response = self.network.query(&page_query(&page)).await?;
		let transfer_contract = self.network.config().transfer_contract.clone();

		let entries = page
			.into_iter()
			.enumerate()
			.map(|(i, entry)| {
				let lookup = response
					.get(format!("t{i}"))
					.filter(|lookup| !lookup.is_null())
					.ok_or_else(|| {
						SyncError::Query(format!("transaction {} missing from page", entry.origin))
					})?;
				let lookup = TxLookup::deserialize(lookup).map_err(|e| {
					SyncError::Query(format!("malformed transaction {}: {e}", entry.origin))
				})?;
				Ok::<_, SyncError>(self.entry(&transfer_contract, entry, lookup))
			})
			.collect::<Result<Vec<_>, SyncError>>()?;

		Ok(Some((entries, self)))
	}

	fn entry(&self, transfer_contract: &str, entry: HistoryRef, lookup: TxLookup) -> AccountTransfer {
		let summary = summarize(&self.address, transfer_contract, &entry.events);
		let fee = lookup.gas_spent.saturating_mul(lookup.tx.gas_price);
		let value = if summary.paid_gas {
			summary.value - i128::from(fee)
		} else {
			summary.value
		};

		AccountTransfer {
			block_height: lookup.block_height,
			timestamp: DateTime::<Utc>::from_timestamp(lookup.block_timestamp, 0).unwrap_or_default(),
			hash: entry.origin,
			method: lookup
				.tx
				.call_data
				.map(|call| call.fn_name)
				.unwrap_or_else(|| "transfer".to_string()),
			from: summary.from,
			to: summary.to,
			value,
			fee,
			error: lookup.err,
		}
	}
}

/// Lazily page through the history of one account.
pub(crate) fn account_history(
	network: Network,
	account: &PublicAccount,
	options: HistoryOptions,
) -> HistoryStream {
	let address = account.address();

	let setup = async move {
		if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
			return Err(SyncError::Cancelled);
		}

		let refs = fetch_refs(&network, &address, &options).await?;
		let page_size = network.config().history_page_size.max(1);
		debug!("Found {} history entries for {}", refs.len(), address);

		let pages = refs.chunks(page_size).map(<[HistoryRef]>::to_vec).collect();
		let pages = HistoryPages {
			network,
			address,
			pages,
			cancel: options.cancel,
		};

		Ok(stream::try_unfold(pages, HistoryPages::next_page)
			.map_ok(|entries| stream::iter(entries.into_iter().map(Ok::<_, SyncError>)))
			.try_flatten())
	};

	stream::once(setup).try_flatten().boxed()
}
