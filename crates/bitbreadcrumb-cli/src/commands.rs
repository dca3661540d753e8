pub mod coins;
pub mod txoutset;

use bitbreadcrumb_coins::amount::COIN;
use bitcoin::Amount;

/// Formats `amount` in DUK with eight decimals.
fn format_amount(amount: Amount) -> String {
    let silvios = amount.to_sat();
    let coin = COIN as u64;
    format!("{}.{:08}", silvios / coin, silvios % coin)
}

// Custom serializer for amounts to display 8 decimal places
fn serialize_as_duk<S>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_amount(*amount))
}
