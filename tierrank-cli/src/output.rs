/// Output formatting: terminal tables and JSON.
use serde::Serialize;
use tierrank_core::{
    BoundsInfo, ConfidenceStatistics, IntegrityIssue, OverallStatistics, RankingEntry,
    RankingMetric, Rankings, SettingInfo, TierDistributionInfo,
};

use crate::bail;

pub fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| bail(format!("Failed to serialise output: {e}")));
    println!("{json}");
}

fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(4).max(4) // at least "Item"
}

fn since(entry: &RankingEntry) -> String {
    match entry.recency {
        Some(n) => n.to_string(),
        None => "never".to_string(),
    }
}

/// Print one ranking ordering as a formatted terminal table.
pub fn print_rankings_table(rankings: &Rankings, metric: RankingMetric, limit: Option<usize>) {
    let limit = limit.unwrap_or(usize::MAX);
    let rows: Vec<&RankingEntry> = rankings.by(metric).take(limit).collect();
    let width = name_width(rows.iter().map(|e| e.id.as_str()));

    println!(" # | {:<width$} | Tier | Votes |   W-L   | Win % | Stability |  Conf | Since", "Item");
    println!("---|-{}-|------|-------|---------|-------|-----------|-------|------", "-".repeat(width));

    for (i, e) in rows.iter().enumerate() {
        println!(
            "{:>2} | {:<width$} | {:>4} | {:>5} | {:>3}-{:<3} | {:>5.1} | {:>9.3} | {:>5.3} | {:>5}",
            i + 1,
            e.id,
            e.current_tier,
            e.vote_count,
            e.wins,
            e.losses,
            e.win_rate * 100.0,
            e.stability,
            e.confidence,
            since(e),
        );
    }

    println!(
        "\n{} of {} items by {} (at vote {})",
        rows.len(),
        rankings.len(),
        metric,
        rankings.vote_count(),
    );
}

#[derive(Serialize)]
struct JsonRankedItem<'a> {
    rank: usize,
    #[serde(flatten)]
    entry: &'a RankingEntry,
}

#[derive(Serialize)]
struct JsonRankings<'a> {
    metric: RankingMetric,
    vote_count: u64,
    items: Vec<JsonRankedItem<'a>>,
}

pub fn print_rankings_json(rankings: &Rankings, metric: RankingMetric, limit: Option<usize>) {
    let items = rankings
        .by(metric)
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, entry)| JsonRankedItem { rank: i + 1, entry })
        .collect();
    print_json(&JsonRankings {
        metric,
        vote_count: rankings.vote_count(),
        items,
    });
}

#[derive(Serialize)]
pub struct Status<'a> {
    pub image_folder: &'a str,
    pub statistics: OverallStatistics,
    pub bounds: BoundsInfo,
    pub distribution: TierDistributionInfo,
    pub integrity_issues: Vec<String>,
}

impl<'a> Status<'a> {
    pub fn new(
        image_folder: &'a str,
        statistics: OverallStatistics,
        bounds: BoundsInfo,
        distribution: TierDistributionInfo,
        issues: &[IntegrityIssue],
    ) -> Self {
        Status {
            image_folder,
            statistics,
            bounds,
            distribution,
            integrity_issues: issues.iter().map(ToString::to_string).collect(),
        }
    }
}

pub fn print_status(status: &Status<'_>) {
    let s = &status.statistics;
    if !status.image_folder.is_empty() {
        println!("Folder: {}", status.image_folder);
    }
    println!(
        "Items: {} ({} active, {} excluded) | Votes: {} | Avg votes/item: {:.2}",
        s.total_items, s.active_items, s.excluded_items, s.total_votes, s.avg_votes_per_item,
    );

    let b = &status.bounds;
    if b.enabled {
        println!(
            "Bounds: {} ({}, std × {}) | at min: {} | at max: {} | qualified to exceed: {} (conf ≥ {}, votes ≥ {})",
            b.bounds,
            if b.adaptive { "adaptive" } else { "fixed" },
            b.std_multiplier,
            b.items_at_min_bound,
            b.items_at_max_bound,
            b.qualified_to_exceed,
            b.min_confidence,
            b.min_votes,
        );
    } else {
        println!("Bounds: disabled");
    }

    let d = &status.distribution;
    if !d.tiers.is_empty() {
        println!("\nTier | Items | Expected | Ratio");
        println!("-----|-------|----------|------");
        for (tier, a) in d.tiers.iter().rev() {
            println!(
                "{:>4} | {:>5} | {:>8.2} | {:>5.2}{}",
                tier,
                a.actual,
                a.expected,
                a.ratio,
                if a.overpopulated { "  over-populated" } else { "" },
            );
        }
    }

    if !status.integrity_issues.is_empty() {
        println!("\nIntegrity issues:");
        for issue in &status.integrity_issues {
            println!("  - {issue}");
        }
    }
}

pub fn print_confidence(title: &str, rows: &[(String, f64)], stats: &ConfidenceStatistics) {
    let width = name_width(rows.iter().map(|(id, _)| id.as_str()));
    println!("{title}");
    println!(" # | {:<width$} | Confidence", "Item");
    println!("---|-{}-|-----------", "-".repeat(width));
    for (i, (id, c)) in rows.iter().enumerate() {
        println!("{:>2} | {:<width$} | {:>10.3}", i + 1, id, c);
    }
    println!(
        "\n{} items: mean {:.3}, min {:.3}, max {:.3}, std dev {:.3}",
        stats.count, stats.mean, stats.min, stats.max, stats.std_dev,
    );
}

pub fn print_settings(settings: &[SettingInfo]) {
    let width = settings.iter().map(|s| s.name.len()).max().unwrap_or(7);
    for s in settings {
        println!(
            "{:<width$}  {:>7}  (default {}, range {}..={})  {}",
            s.name, s.value, s.default, s.range.0, s.range.1, s.description,
        );
    }
}
