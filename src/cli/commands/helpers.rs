//! Shared helper functions for CLI commands.

use console::style;

use crate::app::Services;
use crate::config::{Config, Settings};
use crate::models::{AvailabilityStatus, FieldError, Offer};

/// Open the database and build services, pointing at `init` when missing.
pub async fn open_services(settings: &Settings, config: &Config) -> anyhow::Result<Services> {
    if !settings.database_exists() {
        anyhow::bail!(
            "No database at {}. Run 'umrahfare init' first.",
            settings.database_path.display()
        );
    }
    Services::open(settings, config).await
}

/// `29500000.0` -> `"Rp 29,500,000"`.
pub fn format_idr(amount: f64) -> String {
    let digits = format!("{:.0}", amount.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0.0 {
        format!("-Rp {}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

pub fn stars(count: Option<u8>) -> String {
    match count {
        Some(n) if n > 0 => "★".repeat(n as usize),
        _ => "-".to_string(),
    }
}

fn availability(offer: &Offer) -> String {
    match offer.availability {
        AvailabilityStatus::Available => style("available").green().to_string(),
        AvailabilityStatus::LastRooms => match offer.rooms_left {
            Some(n) => style(format!("{} left", n)).yellow().to_string(),
            None => style("last rooms").yellow().to_string(),
        },
        AvailabilityStatus::SoldOut => style("sold out").red().to_string(),
        other => style(other.as_str()).dim().to_string(),
    }
}

/// Print offers one per line, cheapest first as given.
pub fn print_offers(offers: &[Offer]) {
    for (i, offer) in offers.iter().enumerate() {
        let price = offer
            .effective_price_idr()
            .map(format_idr)
            .unwrap_or_else(|| "no price".to_string());
        let sar = offer
            .price_sar
            .map(|s| format!(" (SAR {:.0})", s))
            .unwrap_or_default();
        println!(
            "{:>3}. {} {} {}",
            i + 1,
            style(&offer.name).bold(),
            style(stars(offer.stars)).yellow(),
            style(format!("[{}]", offer.source_name)).dim()
        );
        let mut details = vec![offer.city.clone()];
        if let Some(m) = offer.distance_m {
            details.push(format!("{}m to Haram", m));
        }
        if let Some(days) = offer.duration_days {
            details.push(format!("{} days", days));
        }
        println!(
            "     {}{}  {}  {}",
            style(price).green(),
            sar,
            availability(offer),
            style(details.join(", ")).dim()
        );
        if let Some(id) = &offer.id {
            println!("     {}", style(id).dim());
        }
    }
}

pub fn print_field_errors(errors: &[FieldError]) {
    for error in errors {
        println!("  {} {}: {}", style("✗").red(), error.field, error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_idr() {
        assert_eq!(format_idr(29_500_000.0), "Rp 29,500,000");
        assert_eq!(format_idr(950.0), "Rp 950");
        assert_eq!(format_idr(-1_250_000.0), "-Rp 1,250,000");
    }

    #[test]
    fn test_stars() {
        assert_eq!(stars(Some(3)), "★★★");
        assert_eq!(stars(None), "-");
    }
}
