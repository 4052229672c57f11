use alloy_primitives::U256;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::NormalizationError;
use crate::models::{Category, NormalizedRow, RawRecord};

pub const ETHER_DECIMALS: u32 = 18;
pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;
const NATIVE_SYMBOL: &str = "ETH";
const CONTRACT_INTERACTION: &str = "Contract Interaction";

/// Asset-specific columns produced by the per-category mappings.
struct AssetColumns {
    contract: String,
    symbol: String,
    token_id: String,
    amount: String,
    gas_fee: String,
}

/// Map one raw record onto the canonical row.
pub fn normalize(record: &RawRecord) -> Result<NormalizedRow, NormalizationError> {
    let hash = required(record, "hash")?.to_string();
    let timestamp = parse_timestamp(record)?;
    let date_time = format_timestamp(timestamp)?;
    let from = present(record, "from")?.to_string();
    let to = present(record, "to")?.to_string();

    let asset = match record.category {
        Category::NativeTransfer | Category::Failed => native(record)?,
        Category::InternalTransfer => internal(record)?,
        Category::Erc20 => erc20(record)?,
        Category::Erc721 => erc721(record)?,
        Category::Erc1155 => erc1155(record)?,
        Category::ContractInteraction => contract_interaction(record)?,
    };

    Ok(NormalizedRow {
        hash,
        timestamp,
        date_time,
        from,
        to,
        kind: record.category.label().to_string(),
        asset_contract: asset.contract,
        asset_symbol: asset.symbol,
        token_id: asset.token_id,
        amount: asset.amount,
        gas_fee: asset.gas_fee,
    })
}

/// Normalize a slice of records, skipping (and logging) the ones that fail.
pub fn normalize_batch<'a, I>(records: I) -> Vec<NormalizedRow>
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    records
        .into_iter()
        .filter_map(|record| match normalize(record) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(hash = record.hash(), category = %record.category, error = %e, "skipping record");
                None
            }
        })
        .collect()
}

fn native(record: &RawRecord) -> Result<AssetColumns, NormalizationError> {
    Ok(AssetColumns {
        contract: String::new(),
        symbol: NATIVE_SYMBOL.to_string(),
        token_id: String::new(),
        amount: format_units(parse_u256(record, "value")?, ETHER_DECIMALS),
        gas_fee: gas_fee(record)?,
    })
}

fn internal(record: &RawRecord) -> Result<AssetColumns, NormalizationError> {
    // Gas is paid by the enclosing transaction; the record's own gas fields are ignored.
    Ok(AssetColumns {
        contract: String::new(),
        symbol: NATIVE_SYMBOL.to_string(),
        token_id: String::new(),
        amount: format_units(parse_u256(record, "value")?, ETHER_DECIMALS),
        gas_fee: format_units(U256::ZERO, ETHER_DECIMALS),
    })
}

fn erc20(record: &RawRecord) -> Result<AssetColumns, NormalizationError> {
    let decimals = match record.get("tokenDecimal").map(str::trim) {
        None | Some("") => DEFAULT_TOKEN_DECIMALS,
        // ERC-20 `decimals()` is a uint8
        Some(raw) => raw.parse::<u8>().map(u32::from).map_err(|_| NormalizationError::InvalidInteger {
            field: "tokenDecimal",
            value: raw.to_string(),
        })?,
    };
    Ok(AssetColumns {
        contract: optional(record, "contractAddress"),
        symbol: optional(record, "tokenSymbol"),
        token_id: String::new(),
        amount: format_units(parse_u256(record, "value")?, decimals),
        gas_fee: gas_fee(record)?,
    })
}

fn erc721(record: &RawRecord) -> Result<AssetColumns, NormalizationError> {
    Ok(AssetColumns {
        contract: optional(record, "contractAddress"),
        symbol: optional(record, "tokenName"),
        token_id: optional(record, "tokenID"),
        amount: "1".to_string(),
        gas_fee: gas_fee(record)?,
    })
}

fn erc1155(record: &RawRecord) -> Result<AssetColumns, NormalizationError> {
    Ok(AssetColumns {
        contract: optional(record, "contractAddress"),
        symbol: optional(record, "tokenName"),
        token_id: optional(record, "tokenID"),
        amount: required(record, "tokenValue")?.to_string(),
        gas_fee: gas_fee(record)?,
    })
}

fn contract_interaction(record: &RawRecord) -> Result<AssetColumns, NormalizationError> {
    Ok(AssetColumns {
        contract: present(record, "to")?.to_string(),
        symbol: CONTRACT_INTERACTION.to_string(),
        ..native(record)?
    })
}

/// Present and non-empty.
fn required<'a>(record: &'a RawRecord, field: &'static str) -> Result<&'a str, NormalizationError> {
    match record.get(field).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(NormalizationError::MissingField(field)),
    }
}

/// Present, possibly empty (contract creations carry an empty `to`).
fn present<'a>(record: &'a RawRecord, field: &'static str) -> Result<&'a str, NormalizationError> {
    record
        .get(field)
        .map(str::trim)
        .ok_or(NormalizationError::MissingField(field))
}

fn optional(record: &RawRecord, field: &str) -> String {
    record.get(field).unwrap_or_default().trim().to_string()
}

fn parse_u256(record: &RawRecord, field: &'static str) -> Result<U256, NormalizationError> {
    let raw = required(record, field)?;
    parse_base_units(field, raw)
}

fn parse_base_units(field: &'static str, raw: &str) -> Result<U256, NormalizationError> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NormalizationError::InvalidInteger { field, value: raw.to_string() });
    }
    U256::from_str_radix(raw, 10)
        .map_err(|_| NormalizationError::InvalidInteger { field, value: raw.to_string() })
}

/// Gas fields missing or empty count as zero.
fn gas_fee(record: &RawRecord) -> Result<String, NormalizationError> {
    let price = gas_field(record, "gasPrice")?;
    let used = gas_field(record, "gasUsed")?;
    let fee = price.checked_mul(used).ok_or(NormalizationError::Overflow)?;
    Ok(format_units(fee, ETHER_DECIMALS))
}

fn gas_field(record: &RawRecord, field: &'static str) -> Result<U256, NormalizationError> {
    match record.get(field).map(str::trim) {
        None | Some("") => Ok(U256::ZERO),
        Some(raw) => parse_base_units(field, raw),
    }
}

fn parse_timestamp(record: &RawRecord) -> Result<i64, NormalizationError> {
    let raw = required(record, "timeStamp")?;
    raw.parse().map_err(|_| NormalizationError::InvalidInteger {
        field: "timeStamp",
        value: raw.to_string(),
    })
}

/// Render unix seconds as `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_timestamp(timestamp: i64) -> Result<String, NormalizationError> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|dt| dt.format(format).ok())
        .ok_or(NormalizationError::TimestampOutOfRange(timestamp))
}

/// Exact decimal rendering of `raw / 10^decimals`: trailing zeros dropped,
/// at least one fractional digit kept.
pub fn format_units(raw: U256, decimals: u32) -> String {
    let digits = raw.to_string();
    let decimals = decimals as usize;
    let (int_part, frac_part) = if digits.len() > decimals {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        (int_part.to_string(), frac_part.to_string())
    } else {
        let padding = "0".repeat(decimals - digits.len());
        ("0".to_string(), format!("{padding}{digits}"))
    };
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        format!("{int_part}.0")
    } else {
        format!("{int_part}.{frac_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordFields;

    fn record(category: Category, pairs: &[(&str, &str)]) -> RawRecord {
        let fields: RecordFields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RawRecord::new(category, fields)
    }

    fn base<'a>(extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut pairs = vec![
            ("hash", "0x123"),
            ("blockNumber", "12345"),
            ("timeStamp", "1625097600"),
            ("from", "0xabc"),
            ("to", "0xdef"),
        ];
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn native_transfer_one_ether() {
        let rec = record(
            Category::NativeTransfer,
            &base(&[("value", "1000000000000000000"), ("gasPrice", "20000000000"), ("gasUsed", "21000")]),
        );
        let row = normalize(&rec).unwrap();
        assert_eq!(row.amount, "1.0");
        assert_eq!(row.gas_fee, "0.00042");
        assert_eq!(row.asset_symbol, "ETH");
        assert_eq!(row.asset_contract, "");
        assert_eq!(row.kind, "External Transfer");
        assert_eq!(row.date_time, "2021-07-01 00:00:00");
    }

    #[test]
    fn erc20_uses_token_decimals() {
        let rec = record(
            Category::Erc20,
            &base(&[
                ("value", "1000000"),
                ("tokenDecimal", "6"),
                ("tokenSymbol", "USDC"),
                ("contractAddress", "0xa0b8"),
                ("gasPrice", "20000000000"),
                ("gasUsed", "65000"),
            ]),
        );
        let row = normalize(&rec).unwrap();
        assert_eq!(row.amount, "1.0");
        assert_eq!(row.asset_symbol, "USDC");
        assert_eq!(row.asset_contract, "0xa0b8");
        assert_eq!(row.gas_fee, "0.0013");
    }

    #[test]
    fn erc20_defaults_to_eighteen_decimals() {
        let rec = record(Category::Erc20, &base(&[("value", "2500000000000000000")]));
        assert_eq!(normalize(&rec).unwrap().amount, "2.5");
    }

    #[test]
    fn high_decimal_tokens_stay_exact() {
        // 123456789012345678901234567890 / 10^27, well past f64 precision
        let rec = record(
            Category::Erc20,
            &base(&[("value", "123456789012345678901234567890"), ("tokenDecimal", "27")]),
        );
        assert_eq!(normalize(&rec).unwrap().amount, "123.45678901234567890123456789");
    }

    #[test]
    fn internal_transfer_never_charges_gas() {
        let rec = record(
            Category::InternalTransfer,
            &base(&[("value", "500000000000000000"), ("gasPrice", "999"), ("gasUsed", "garbage")]),
        );
        let row = normalize(&rec).unwrap();
        assert_eq!(row.amount, "0.5");
        assert_eq!(row.gas_fee, "0.0");
        assert_eq!(row.kind, "Internal Transfer");
    }

    #[test]
    fn nft_mappings() {
        let erc721 = record(
            Category::Erc721,
            &base(&[("contractAddress", "0xnft"), ("tokenName", "Punks"), ("tokenID", "42")]),
        );
        let row = normalize(&erc721).unwrap();
        assert_eq!((row.amount.as_str(), row.token_id.as_str()), ("1", "42"));
        assert_eq!(row.asset_symbol, "Punks");

        let erc1155 = record(
            Category::Erc1155,
            &base(&[("contractAddress", "0xmulti"), ("tokenName", "Items"), ("tokenID", "7"), ("tokenValue", "12")]),
        );
        let row = normalize(&erc1155).unwrap();
        assert_eq!(row.amount, "12");
        assert_eq!(row.kind, "ERC-1155 Token Transfer");
    }

    #[test]
    fn contract_interaction_uses_target_as_asset() {
        let rec = record(Category::ContractInteraction, &base(&[("value", "0")]));
        let row = normalize(&rec).unwrap();
        assert_eq!(row.asset_contract, "0xdef");
        assert_eq!(row.asset_symbol, "Contract Interaction");
        assert_eq!(row.amount, "0.0");
    }

    #[test]
    fn missing_required_fields_are_errors() {
        let no_hash = record(Category::NativeTransfer, &[("timeStamp", "1"), ("from", "a"), ("to", "b"), ("value", "1")]);
        assert_eq!(normalize(&no_hash), Err(NormalizationError::MissingField("hash")));

        let no_time = record(Category::NativeTransfer, &[("hash", "0x1"), ("from", "a"), ("to", "b"), ("value", "1")]);
        assert_eq!(normalize(&no_time), Err(NormalizationError::MissingField("timeStamp")));

        let bad_value = record(Category::NativeTransfer, &base(&[("value", "1.5")]));
        assert!(matches!(normalize(&bad_value), Err(NormalizationError::InvalidInteger { field: "value", .. })));
    }

    #[test]
    fn batch_skips_bad_records() {
        let good = record(Category::NativeTransfer, &base(&[("value", "1")]));
        let bad = record(Category::NativeTransfer, &[("hash", "0xbad")]);
        let rows = normalize_batch([&good, &bad, &good]);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn format_units_shapes() {
        assert_eq!(format_units(U256::ZERO, 18), "0.0");
        assert_eq!(format_units(U256::from(5u64), 0), "5.0");
        assert_eq!(format_units(U256::from(1u64), 18), "0.000000000000000001");
        assert_eq!(format_units(U256::from(1_230_000u64), 6), "1.23");
        assert_eq!(format_units(U256::MAX, 18).len(), 79);
    }
}
