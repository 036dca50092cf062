//! Amount and size formatting.
use crate::error::ClientError;

/// Atomic units per coin.
pub const COIN: u64 = 100_000_000;
const DECIMALS: usize = 8;

/// Full precision, e.g. `1.50000000`.
pub fn format_coins(atomic: u64) -> String {
    format!("{}.{:08}", atomic / COIN, atomic % COIN)
}

/// Two decimals, or full precision for dust below 0.01.
pub fn format_coins_short(atomic: u64) -> String {
    if atomic == 0 {
        return "0.00".to_string();
    }
    if atomic < COIN / 100 {
        return format_coins(atomic);
    }
    let cents = (atomic + COIN / 200) / (COIN / 100);
    format!("{}.{:02}", cents / 100, cents % 100)
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Parses decimal coin text into atomic units. Rejects zero, negatives,
/// more than eight fractional digits and overflow.
pub fn parse_amount(text: &str) -> Result<u64, ClientError> {
    let invalid = || ClientError::Validation("Invalid amount".to_string());
    let text = text.trim();
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > DECIMALS {
        return Err(ClientError::Validation(
            "Amount has more than 8 decimal places".to_string(),
        ));
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac_units: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<8}").parse().map_err(|_| invalid())?
    };
    let atomic = whole
        .checked_mul(COIN)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)?;
    if atomic == 0 {
        return Err(ClientError::Validation("Amount must be greater than zero".to_string()));
    }
    Ok(atomic)
}
