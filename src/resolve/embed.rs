/*!
 * Embed-link selection from play page HTML.
 *
 * The play page carries a download dropdown listing one embed link per
 * quality/audio variant. Selection requires the configured quality and
 * rejects the excluded audio label; a panel with no acceptable variant
 * yields nothing.
 */

use log::debug;
use scraper::{Html, Selector};

/// Pick the embed URL from a play page.
///
/// Returns None when the page has no download panel, the panel is
/// empty, or no variant satisfies the quality/audio constraints.
/// Callers surface all three as a stage failure.
pub fn select_embed_url(html: &str, preferred_quality: &str, excluded_audio: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let panel_selector = Selector::parse("div#pickDownload").ok()?;
    let item_selector = Selector::parse("a.dropdown-item").ok()?;

    let panel = document.select(&panel_selector).next()?;

    for item in panel.select(&item_selector) {
        let Some(href) = item.value().attr("href").map(str::to_string) else {
            continue;
        };
        let label = item.text().collect::<String>().to_lowercase();

        if label.contains(preferred_quality) && !label.contains(excluded_audio) {
            debug!("Selected embed variant '{}'", label.trim());
            return Some(href);
        }
    }

    debug!("No embed variant matched the quality/audio constraints");
    None
}
