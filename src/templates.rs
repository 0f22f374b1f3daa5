//! Sample screens for the CLI demo and for tests.
//!
//! Each one looks like something a host would have on display: themed
//! colors, on-screen-only chrome and decorative overlays next to the
//! actual report content.

use crate::content::Theme;

/// Dark host theme used by the samples.
pub fn dark_theme() -> Theme {
    Theme {
        foreground: "#e5e7eb".to_string(),
        background: "#111827".to_string(),
        ..Theme::default()
    }
    .with_variable("--surface", "#1f2937")
    .with_variable("--accent", "#60a5fa")
    .with_variable("--muted", "#9ca3af")
}

/// Quarterly report with a draft watermark, a toolbar that is excluded from
/// exports, a table, a quote and a code block.
pub fn report_template() -> &'static str {
    r##"
<div id="report" class="p-6" style="background: var(--surface); color: var(--accent)">
    <div class="flex justify-between mb-4" data-export-exclude>
        <span>Share</span><span>Download</span>
    </div>
    <div class="absolute pointer-events-none" aria-hidden="true">DRAFT</div>

    <h1>Quarterly Report</h1>
    <p style="color: var(--muted)">Q4 2025, prepared for the board</p>

    <h2>Executive Summary</h2>
    <p>
        Revenue grew by <strong>23%</strong> year-over-year, reaching
        <strong>$4.2M</strong> for the quarter. The customer base expanded with
        <em>notable wins in the enterprise segment</em>.
    </p>

    <h2>Key Highlights</h2>
    <ul>
        <li>Customer acquisition cost reduced by 15%</li>
        <li>Net promoter score improved to 72</li>
        <li>Three new enterprise partnerships signed</li>
    </ul>

    <h3>Revenue Breakdown</h3>
    <table>
        <tr><th>Segment</th><th>Revenue</th><th>Growth</th></tr>
        <tr><td>Enterprise</td><td>$2.1M</td><td>+31%</td></tr>
        <tr><td>Mid-Market</td><td>$1.4M</td><td>+18%</td></tr>
        <tr><td>SMB</td><td>$0.7M</td><td>+12%</td></tr>
    </table>

    <blockquote>Growth came from retention, not discounting.</blockquote>

    <h3>Forecast Model</h3>
    <pre><code>revenue = base * (1 + growth)
churn   = 0.021</code></pre>

    <div class="watermark">CONFIDENTIAL</div>
</div>
"##
}

/// Invoice with a logo, an excluded action bar and a fixed preview badge.
pub fn invoice_template() -> &'static str {
    r##"
<div id="invoice" class="p-6">
    <div class="flex items-center mb-4">
        <img src="data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==" style="width: 48px; height: 48px" />
        <h1 class="ml-4">Invoice #2024-001</h1>
    </div>
    <div data-export-exclude><span>Pay now</span></div>
    <div class="fixed pointer-events-none">Preview</div>

    <div class="flex justify-between mb-6">
        <div><p><strong>From:</strong> Acme Corp</p><p>123 Business St</p></div>
        <div><p><strong>To:</strong> Client Inc</p><p>456 Client Ave</p></div>
    </div>

    <table>
        <tr><th>Item</th><th>Qty</th><th>Price</th><th>Total</th></tr>
        <tr><td>Web Development</td><td>40</td><td>$150.00</td><td>$6,000.00</td></tr>
        <tr><td>Design Services</td><td>20</td><td>$125.00</td><td>$2,500.00</td></tr>
        <tr><td>Hosting (Annual)</td><td>1</td><td>$500.00</td><td>$500.00</td></tr>
    </table>

    <p class="text-right text-xl"><strong>Total: $9,000.00</strong></p>
</div>
"##
}

/// A report long enough to need `sections` worth of scrolling.
pub fn long_report(sections: usize) -> String {
    let mut html = String::from(r#"<div id="long" class="p-6"><h1>Operations Log</h1>"#);
    for i in 1..=sections {
        html.push_str(&format!(
            "<h2>Section {i}</h2>\
             <p>Throughput, latency and error budgets for period {i} stayed within \
             their targets. Incidents were resolved inside the agreed windows and no \
             follow-up actions remain open for this period.</p>\
             <ol><li>Deployments: {}</li><li>Rollbacks: {}</li></ol>",
            i * 3,
            i % 2
        ));
    }
    html.push_str("</div>");
    html
}

/// Smallest useful screen.
pub fn minimal_template() -> &'static str {
    r#"<div><h1>Title</h1><p>Body text</p></div>"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentRef, LiveContent};
    use crate::normalize::{normalize, ExclusionPolicy, NodeKind};

    #[test]
    fn samples_normalize() {
        let samples = [
            ("report", report_template().to_string()),
            ("invoice", invoice_template().to_string()),
            ("long", long_report(3)),
            ("minimal", minimal_template().to_string()),
        ];
        for (name, html) in samples {
            let doc = LiveContent::from_html(&html, dark_theme());
            let tree = normalize(&ContentRef::new(&doc), &ExclusionPolicy::default());
            assert!(tree.is_ok(), "sample '{name}' should normalize");
        }
    }

    #[test]
    fn report_overlays_and_chrome_are_dropped() {
        let doc = LiveContent::from_html(report_template(), dark_theme());
        let tree = normalize(&ContentRef::anchored(&doc, "report"), &ExclusionPolicy::default()).unwrap();
        let text = tree.text_content();
        assert!(text.contains("Quarterly Report"));
        for gone in ["DRAFT", "CONFIDENTIAL", "Share", "Download"] {
            assert!(!text.contains(gone), "{gone} should not be exported");
        }
    }

    #[test]
    fn long_report_has_requested_sections() {
        let doc = LiveContent::from_html(&long_report(5), dark_theme());
        let tree = normalize(&ContentRef::new(&doc), &ExclusionPolicy::default()).unwrap();
        let mut headings = 0;
        tree.walk(&mut |n| {
            if matches!(n.kind, NodeKind::Heading { level: 2 }) {
                headings += 1;
            }
        });
        assert_eq!(headings, 5);
    }
}
