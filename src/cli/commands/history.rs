//! Price history command.

use console::style;

use super::helpers::{format_idr, open_services};
use crate::config::{Config, Settings};
use crate::models::TrendDirection;

pub async fn cmd_history(
    settings: &Settings,
    config: &Config,
    offer_id: &str,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let history = services.store.price_history(offer_id, limit).await?;
    let trend = services.store.price_trend(offer_id).await?;

    if json {
        let out = serde_json::json!({ "offer_id": offer_id, "history": history, "trend": trend });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("{} No price history for {}", style("!").yellow(), offer_id);
        return Ok(());
    }

    for entry in &history {
        let change = match entry.change_percent {
            Some(p) if p > 0.0 => style(format!("+{:.1}%", p)).red().to_string(),
            Some(p) if p < 0.0 => style(format!("{:.1}%", p)).green().to_string(),
            Some(_) => "0.0%".to_string(),
            None => String::new(),
        };
        println!(
            "  {}  {}  {}  {}",
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            format_idr(entry.price_idr),
            change,
            style(&entry.source_name).dim()
        );
    }

    if let Some(trend) = trend {
        let arrow = match trend.direction {
            TrendDirection::Up => style("↑").red(),
            TrendDirection::Down => style("↓").green(),
            TrendDirection::Stable => style("→").dim(),
        };
        println!(
            "{} {} {:.1}% ({} from {})",
            arrow,
            trend.direction.as_str(),
            trend.change_percent,
            format_idr(trend.change_amount_idr),
            format_idr(trend.previous_price_idr)
        );
    }
    Ok(())
}
