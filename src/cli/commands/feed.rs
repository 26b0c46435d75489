//! Partner feed commands.

use std::path::Path;

use console::style;

use super::helpers::{format_idr, open_services, print_field_errors};
use crate::config::{Config, Settings};
use crate::models::{Actor, FeedRequest, FeedStatus, PartnerFeed};
use crate::partner::FeedError;

fn read_request(file: &Path) -> anyhow::Result<FeedRequest> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid feed request in {}: {}", file.display(), e))
}

/// Print field errors before turning a workflow error into a command error.
fn report(err: FeedError) -> anyhow::Error {
    if let FeedError::Validation(errors) = &err {
        println!("{} Feed rejected:", style("✗").red());
        print_field_errors(errors);
    }
    err.into()
}

fn print_feed(feed: &PartnerFeed) {
    let status = match feed.status {
        FeedStatus::Pending => style(feed.status.as_str()).yellow(),
        FeedStatus::Approved => style(feed.status.as_str()).green(),
        FeedStatus::Rejected => style(feed.status.as_str()).red(),
    };
    println!(
        "  {} {} {} [{}]",
        style(&feed.id).dim(),
        style(&feed.feed_name).bold(),
        format_idr(feed.price_idr),
        status
    );
    let mut details = Vec::new();
    if let Some(city) = &feed.departure_city {
        details.push(format!("from {}", city));
    }
    if let Some(days) = feed.duration_days {
        details.push(format!("{} days", days));
    }
    details.push(format!("{}/{} booked", feed.booked, feed.quota));
    if let Some(until) = feed.valid_until {
        details.push(format!("valid until {}", until));
    }
    println!("    {}", style(details.join(", ")).dim());
    if let Some(reason) = &feed.rejection_reason {
        println!("    {} {}", style("reason:").red(), reason);
    }
}

pub async fn cmd_feed_submit(
    settings: &Settings,
    config: &Config,
    partner_id: &str,
    file: &Path,
) -> anyhow::Result<()> {
    let request = read_request(file)?;
    let services = open_services(settings, config).await?;
    let submission = services
        .partner
        .submit_feed(partner_id, &request)
        .await
        .map_err(report)?;
    println!(
        "{} Submitted feed {} ({})",
        style("✓").green(),
        submission.feed_id,
        submission.status.as_str()
    );
    Ok(())
}

pub async fn cmd_feed_update(
    settings: &Settings,
    config: &Config,
    partner_id: &str,
    feed_id: &str,
    file: &Path,
) -> anyhow::Result<()> {
    let request = read_request(file)?;
    let services = open_services(settings, config).await?;
    let feed = services
        .partner
        .update_feed(partner_id, feed_id, &request)
        .await
        .map_err(report)?;
    println!("{} Updated feed", style("✓").green());
    print_feed(&feed);
    Ok(())
}

pub async fn cmd_feed_delete(
    settings: &Settings,
    config: &Config,
    partner_id: &str,
    feed_id: &str,
) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    services.partner.delete_feed(partner_id, feed_id).await?;
    println!("{} Deleted feed {}", style("✓").green(), feed_id);
    Ok(())
}

pub async fn cmd_feed_list(
    settings: &Settings,
    config: &Config,
    partner_id: &str,
    status: Option<&str>,
) -> anyhow::Result<()> {
    let status = status
        .map(|s| FeedStatus::from_str(s).ok_or_else(|| anyhow::anyhow!("Unknown status: {}", s)))
        .transpose()?;
    let services = open_services(settings, config).await?;
    let feeds = services.partner.list_partner_feeds(partner_id, status).await?;
    if feeds.is_empty() {
        println!("{} No feeds for {}", style("!").yellow(), partner_id);
    }
    for feed in &feeds {
        print_feed(feed);
    }
    Ok(())
}

pub async fn cmd_feed_pending(settings: &Settings, config: &Config, limit: usize) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let feeds = services.partner.pending_feeds(limit).await?;
    println!("{} {} feeds awaiting review", style("→").cyan(), feeds.len());
    for feed in &feeds {
        print_feed(feed);
    }
    Ok(())
}

pub async fn cmd_feed_approve(
    settings: &Settings,
    config: &Config,
    admin_id: &str,
    feed_id: &str,
) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let feed = services
        .partner
        .approve_feed(feed_id, &Actor::admin(admin_id))
        .await?;
    println!("{} Approved", style("✓").green());
    print_feed(&feed);
    Ok(())
}

pub async fn cmd_feed_reject(
    settings: &Settings,
    config: &Config,
    admin_id: &str,
    feed_id: &str,
    reason: &str,
) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let feed = services
        .partner
        .reject_feed(feed_id, &Actor::admin(admin_id), reason)
        .await?;
    println!("{} Rejected", style("✓").green());
    print_feed(&feed);
    Ok(())
}
