use crate::trends::TrendReport;
use crate::types::{ItemWithEnrichment, Window};
use std::fmt::Write;

/// Maximum number of items listed in one digest.
pub const MAX_LISTED_ITEMS: usize = 20;

/// Builds the digest message for a ranked selection. Returns `(title, body)`;
/// the title is plain text, the body is Telegram-flavoured HTML.
pub fn format_digest(
    items: &[ItemWithEnrichment],
    trends: Option<&TrendReport>,
    window: Window,
) -> (String, String) {
    let title = format!("Feed Digest ({} new items, {})", items.len(), window);
    let mut body = String::new();

    let listed = &items[..items.len().min(MAX_LISTED_ITEMS)];
    if !listed.is_empty() {
        body.push_str("<b>Top Articles</b>\n\n");
    }

    for (i, entry) in listed.iter().enumerate() {
        let enrichment = &entry.enrichment;
        let _ = writeln!(
            body,
            "<b>{}.</b> [{} | {}] {}",
            i + 1,
            enrichment.total_score(),
            escape_html(&enrichment.category),
            escape_html(&entry.item.title)
        );
        if !enrichment.translated_title.is_empty() {
            let _ = writeln!(body, "   中文: {}", escape_html(&enrichment.translated_title));
        }
        if !enrichment.rationale.is_empty() {
            let _ = writeln!(body, "   推荐: {}", escape_html(&enrichment.rationale));
        }
        let _ = writeln!(body, "   🔗 {}\n", escape_html(&entry.item.url));
    }

    if let Some(report) = trends.filter(|r| !r.is_empty()) {
        body.push_str("<b>技术趋势</b>\n\n");
        for (i, trend) in report.trends.iter().enumerate() {
            let _ = writeln!(body, "<b>{}. {}</b>", i + 1, escape_html(&trend.title));
            if !trend.description.is_empty() {
                let _ = writeln!(body, "   {}", escape_html(&trend.description));
            }

            // Reference listed items by their position; unmatched titles are shown verbatim.
            let positions: Vec<usize> = trend
                .resolve(items)
                .into_iter()
                .filter(|p| *p < listed.len())
                .collect();
            let unmatched: Vec<&str> = trend
                .articles
                .iter()
                .filter(|t| !items.iter().any(|i| &i.item.title == *t))
                .map(String::as_str)
                .collect();

            if !positions.is_empty() {
                let refs: Vec<String> = positions.iter().map(|p| format!("#{}", p + 1)).collect();
                let _ = writeln!(body, "   相关: {}", refs.join(", "));
            }
            if !unmatched.is_empty() {
                let _ = writeln!(body, "   相关: {}", escape_html(&unmatched.join("; ")));
            }
            body.push('\n');
        }
    }

    (title, body.trim_end().to_string())
}

/// Plain-text report for the terminal: every ranked item with its
/// enrichment, followed by the trend clusters.
pub fn format_report(
    items: &[ItemWithEnrichment],
    trends: Option<&TrendReport>,
    window: Window,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Top Articles ({}) ===\n", window);

    for (i, entry) in items.iter().take(MAX_LISTED_ITEMS).enumerate() {
        let enrichment = &entry.enrichment;
        let _ = writeln!(
            out,
            "{}. [Score: {} | {}] {}",
            i + 1,
            enrichment.total_score(),
            enrichment.category,
            entry.item.title
        );
        if !enrichment.translated_title.is_empty() {
            let _ = writeln!(out, "   中文: {}", enrichment.translated_title);
        }
        if !enrichment.rationale.is_empty() {
            let _ = writeln!(out, "   推荐: {}", enrichment.rationale);
        }
        if !enrichment.synopsis.is_empty() {
            let _ = writeln!(out, "   摘要: {}", enrichment.synopsis);
        }
        let _ = writeln!(out, "   链接: {}\n", entry.item.url);
    }

    if let Some(report) = trends.filter(|r| !r.is_empty()) {
        let _ = writeln!(out, "=== 技术趋势总结 ({}) ===\n", window);
        for (i, trend) in report.trends.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, trend.title);
            let _ = writeln!(out, "   {}", trend.description);
            if !trend.articles.is_empty() {
                let _ = writeln!(out, "   相关文章: {}", trend.articles.join("; "));
            }
            out.push('\n');
        }
    }

    out.trim_end().to_string()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
