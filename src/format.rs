/// format.rs – Display helpers for prices, volumes and signed changes.
use crate::models::AssetClass;

/// Price text for *asset_class*.
///
/// Forex quotes keep five decimals, sub-unit prices six, everything else is
/// a dollar amount with thousands separators.
pub fn format_price(price: f64, asset_class: AssetClass) -> String {
    if asset_class == AssetClass::Forex {
        return format!("{price:.5}");
    }
    if price.abs() < 1.0 {
        return format!("{price:.6}");
    }
    let sign = if price < 0.0 { "-" } else { "" };
    format!("{sign}${}", group_thousands(price.abs(), 2))
}

/// Compact volume: `1.5B`, `2.3M`, `4.1K`, else a whole number.
pub fn format_volume(volume: f64) -> String {
    let abs = volume.abs();
    if abs >= 1e9 {
        format!("{:.1}B", volume / 1e9)
    } else if abs >= 1e6 {
        format!("{:.1}M", volume / 1e6)
    } else if abs >= 1e3 {
        format!("{:.1}K", volume / 1e3)
    } else {
        format!("{volume:.0}")
    }
}

/// Dollar amount for money totals, whatever the quote convention of the
/// selected asset class, e.g. `$25,000.00` / `-$80.10`.
pub fn format_usd(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${}", group_thousands(value.abs(), 2))
}

/// Dollar amount with an explicit sign, e.g. `+$1,250.00` / `-$80.10`.
pub fn format_signed_usd(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "+" };
    format!("{sign}${}", group_thousands(value.abs(), 2))
}

pub fn format_pct(value: f64) -> String {
    format!("{value:+.2}%")
}

fn group_thousands(value: f64, decimals: usize) -> String {
    let text = format!("{value:.decimals$}");
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac_part {
        Some(f) => format!("{grouped}.{f}"),
        None => grouped,
    }
}
