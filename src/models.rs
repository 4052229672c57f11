use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Column order of the exported CSV.
pub const CSV_COLUMNS: [&str; 10] = [
    "Transaction Hash",
    "Date & Time",
    "From Address",
    "To Address",
    "Transaction Type",
    "Asset Contract Address",
    "Asset Symbol/Name",
    "Token ID",
    "Value/Amount",
    "Gas Fee (ETH)",
];

/// String-keyed fields of one explorer result entry.
pub type RecordFields = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    NativeTransfer,
    InternalTransfer,
    Erc20,
    Erc721,
    Erc1155,
    ContractInteraction,
    Failed,
}

impl Category {
    /// Categories fetched by a default run.
    pub const DEFAULT_RUN: [Category; 4] = [
        Category::NativeTransfer,
        Category::InternalTransfer,
        Category::Erc20,
        Category::Erc721,
    ];

    /// Categories fetched when every mapping is wired in. Contract interactions
    /// and failed transactions come out of the native `txlist` feed.
    pub const EXTENDED_RUN: [Category; 5] = [
        Category::NativeTransfer,
        Category::InternalTransfer,
        Category::Erc20,
        Category::Erc721,
        Category::Erc1155,
    ];

    /// Explorer `action` parameter serving this category.
    pub fn action(self) -> &'static str {
        match self {
            Category::NativeTransfer | Category::ContractInteraction | Category::Failed => "txlist",
            Category::InternalTransfer => "txlistinternal",
            Category::Erc20 => "tokentx",
            Category::Erc721 => "tokennfttx",
            Category::Erc1155 => "token1155tx",
        }
    }

    /// Human-readable label written to the "Transaction Type" column.
    pub fn label(self) -> &'static str {
        match self {
            Category::NativeTransfer => "External Transfer",
            Category::InternalTransfer => "Internal Transfer",
            Category::Erc20 => "ERC-20 Token Transfer",
            Category::Erc721 => "ERC-721 NFT Transfer",
            Category::Erc1155 => "ERC-1155 Token Transfer",
            Category::ContractInteraction => "Contract Interaction",
            Category::Failed => "Failed Transaction",
        }
    }

    /// Refine a `txlist` entry into failed / contract call / plain transfer.
    pub fn classify_native(fields: &RecordFields) -> Category {
        if fields.get("isError").map(String::as_str) == Some("1") {
            return Category::Failed;
        }
        match fields.get("input").map(|s| s.trim()) {
            Some(input) if !input.is_empty() && input != "0x" => Category::ContractInteraction,
            _ => Category::NativeTransfer,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::NativeTransfer => "native",
            Category::InternalTransfer => "internal",
            Category::Erc20 => "erc20",
            Category::Erc721 => "erc721",
            Category::Erc1155 => "erc1155",
            Category::ContractInteraction => "contract",
            Category::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One explorer entry tagged with the category it was fetched (or classified) as.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub category: Category,
    pub fields: RecordFields,
}

impl RawRecord {
    pub fn new(category: Category, fields: RecordFields) -> Self {
        Self { category, fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn hash(&self) -> &str {
        self.get("hash").unwrap_or("unknown")
    }

    pub fn block_number(&self) -> Option<u64> {
        self.get("blockNumber")?.trim().parse().ok()
    }
}

/// Canonical output row. `timestamp` is kept next to its rendered form so
/// rows can be ordered without reparsing the date string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub hash: String,
    pub timestamp: i64,
    pub date_time: String,
    pub from: String,
    pub to: String,
    pub kind: String,
    pub asset_contract: String,
    pub asset_symbol: String,
    pub token_id: String,
    pub amount: String,
    pub gas_fee: String,
}

impl NormalizedRow {
    pub fn csv_record(&self) -> [&str; 10] {
        [
            &self.hash,
            &self.date_time,
            &self.from,
            &self.to,
            &self.kind,
            &self.asset_contract,
            &self.asset_symbol,
            &self.token_id,
            &self.amount,
            &self.gas_fee,
        ]
    }

    /// Newest first, then by hash; remaining columns make the order total so
    /// output is reproducible.
    pub fn newest_first(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| self.hash.cmp(&other.hash))
            .then_with(|| Ord::cmp(self, other))
    }
}

/// Sort rows newest first. Every row stays: distinct explorer entries (two
/// internal calls or two equal `Transfer` logs in one transaction) can render
/// identically.
pub fn sort_newest_first(rows: &mut [NormalizedRow]) {
    rows.sort_by(NormalizedRow::newest_first);
}

/// Parse a target address. All-lowercase and all-uppercase hex is accepted
/// as-is; mixed case must carry a valid EIP-55 checksum.
pub fn parse_address(s: &str) -> Result<Address, TrackerError> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").unwrap_or(s);
    if hex.len() != 40 {
        return Err(TrackerError::InvalidAddress(s.to_string()));
    }
    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    let parsed = if has_lower && has_upper {
        Address::parse_checksummed(s, None).ok()
    } else {
        s.parse::<Address>().ok()
    };
    parsed.ok_or_else(|| TrackerError::InvalidAddress(s.to_string()))
}

pub fn checksum_address(s: &str) -> Result<String, TrackerError> {
    Ok(parse_address(s)?.to_checksum(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hash: &str, timestamp: i64, amount: &str) -> NormalizedRow {
        NormalizedRow {
            hash: hash.to_string(),
            timestamp,
            date_time: String::new(),
            from: "0xa".into(),
            to: "0xb".into(),
            kind: Category::NativeTransfer.label().into(),
            asset_contract: String::new(),
            asset_symbol: "ETH".into(),
            token_id: String::new(),
            amount: amount.into(),
            gas_fee: "0.0".into(),
        }
    }

    #[test]
    fn checksums_lowercase_address() {
        let got = checksum_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(got, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn rejects_bad_checksum_and_short_input() {
        assert!(parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAeD").is_err());
        assert!(parse_address("0x123").is_err());
        assert!(parse_address("not-an-address").is_err());
    }

    #[test]
    fn classifies_native_entries() {
        let mut fields = RecordFields::new();
        fields.insert("input".into(), "0x".into());
        assert_eq!(Category::classify_native(&fields), Category::NativeTransfer);
        fields.insert("input".into(), "0xa9059cbb".into());
        assert_eq!(Category::classify_native(&fields), Category::ContractInteraction);
        fields.insert("isError".into(), "1".into());
        assert_eq!(Category::classify_native(&fields), Category::Failed);
    }

    #[test]
    fn sorts_newest_first_with_hash_tiebreak() {
        let mut rows = vec![row("0xb", 10, "1.0"), row("0xa", 10, "1.0"), row("0xc", 20, "1.0")];
        sort_newest_first(&mut rows);
        let hashes: Vec<_> = rows.iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, ["0xc", "0xa", "0xb"]);
    }

    #[test]
    fn identical_rows_are_all_kept() {
        let mut rows = vec![
            row("0xa", 10, "1.0"),
            row("0xa", 10, "2.0"),
            row("0xa", 10, "1.0"),
        ];
        sort_newest_first(&mut rows);
        let amounts: Vec<_> = rows.iter().map(|r| r.amount.as_str()).collect();
        assert_eq!(amounts, ["1.0", "1.0", "2.0"]);
    }
}
