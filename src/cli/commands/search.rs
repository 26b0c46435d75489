//! Search and compare commands.

use console::style;

use super::helpers::{format_idr, open_services, print_offers};
use super::SearchArgs;
use crate::config::{Config, Settings};
use crate::models::{OfferKind, SearchFilters, SortBy};

fn filters_from_args(args: &SearchArgs) -> anyhow::Result<SearchFilters> {
    let mut filters = SearchFilters::new()
        .price_range(args.min_price, args.max_price)
        .sources(args.sources.iter().cloned())
        .limit(args.limit)
        .force_refresh(args.refresh);
    filters.city = args.city.clone();
    filters.min_stars = args.min_stars;
    filters.check_in = args.check_in;
    filters.check_out = args.check_out;
    if let Some(kind) = args.kind.as_deref() {
        filters.kind = Some(
            OfferKind::from_str(kind)
                .ok_or_else(|| anyhow::anyhow!("Unknown offer kind: {}", kind))?,
        );
    }
    filters.sort_by = SortBy::from_str(&args.sort)
        .ok_or_else(|| anyhow::anyhow!("Unknown sort order: {}", args.sort))?;
    Ok(filters)
}

pub async fn cmd_search(settings: &Settings, config: &Config, args: SearchArgs) -> anyhow::Result<()> {
    let filters = filters_from_args(&args)?;
    let services = open_services(settings, config).await?;
    let response = services.aggregator.aggregate(&filters).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_offers(&response.offers);
    println!();
    println!(
        "{} {} of {} offers in {}ms{}",
        style("→").cyan(),
        response.total_returned,
        response.total_found,
        response.duration_ms,
        if response.cache_hit { " (cached)" } else { "" }
    );
    for (source, count) in &response.source_counts {
        println!("  {} {}: {}", style("✓").green(), source, count);
    }
    for failure in &response.errors {
        println!(
            "  {} {}: {}",
            style("✗").red(),
            failure.source,
            failure.message
        );
    }
    if let Some(cheapest) = response.cheapest() {
        if let Some(price) = cheapest.effective_price_idr() {
            println!(
                "{} Cheapest: {} at {}",
                style("★").yellow(),
                cheapest.name,
                format_idr(price)
            );
        }
    }
    Ok(())
}

pub async fn cmd_compare(
    settings: &Settings,
    config: &Config,
    name: &str,
    city: &str,
    json: bool,
) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let by_source = services.aggregator.compare_sources(name, city).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&by_source)?);
        return Ok(());
    }
    if by_source.is_empty() {
        println!("{} No offers matching '{}' in {}", style("!").yellow(), name, city);
        return Ok(());
    }
    for (source, offers) in &by_source {
        println!("{}", style(source).bold().cyan());
        print_offers(offers);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SearchArgs {
        SearchArgs {
            city: Some("Mecca".to_string()),
            kind: Some("hotel".to_string()),
            check_in: None,
            check_out: None,
            min_price: None,
            max_price: Some(3_000_000.0),
            min_stars: Some(4),
            sources: vec!["xotelo".to_string()],
            sort: "stars".to_string(),
            limit: 5,
            refresh: true,
            json: false,
        }
    }

    #[test]
    fn test_filters_from_args() {
        let filters = filters_from_args(&args()).unwrap();
        assert_eq!(filters.city.as_deref(), Some("Mecca"));
        assert_eq!(filters.kind, Some(OfferKind::Hotel));
        assert_eq!(filters.max_price, Some(3_000_000.0));
        assert_eq!(filters.sort_by, SortBy::Stars);
        assert_eq!(filters.limit, 5);
        assert!(filters.force_refresh);
    }

    #[test]
    fn test_unknown_sort_rejected() {
        let bad = SearchArgs {
            sort: "cheapest".to_string(),
            ..args()
        };
        assert!(filters_from_args(&bad).is_err());
    }
}
