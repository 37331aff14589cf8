//! Turns a [`FlowerAnalysis`] into something a person can read.
//!
//! Every render is a complete replacement of the previous output; nothing
//! accumulates between calls.

use crate::aggregate::FlowerAnalysis;
use crate::storage::RemoteImageRef;

pub const NO_FLOWERS_MESSAGE: &str = "No specific flowers detected in the image.";

/// `"flowering plant"` → `"Flowering Plant"`
pub fn title_case(label: &str) -> String {
    label
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `0.82` → `"82.0%"`
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// CSS color for a swatch. Only plain color names survive.
fn swatch_color(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

/// Markup for the results panel.
pub fn render_html(analysis: &FlowerAnalysis, image: &RemoteImageRef) -> String {
    let mut html = String::from("<div class=\"analysis-details\">\n");
    html.push_str(&format!(
        "<img class=\"uploaded-image\" src=\"{}\" alt=\"Uploaded flower photo\">\n",
        escape_html(image.as_str())
    ));

    html.push_str("<h3>Detected Flowers</h3>\n");
    if analysis.has_flowers() {
        html.push_str("<ul>\n");
        for flower in &analysis.flowers {
            html.push_str(&format!(
                "<li><strong>{}</strong><br>Count: {}<br>Confidence: {}</li>\n",
                escape_html(&title_case(&flower.kind)),
                flower.count,
                format_confidence(flower.confidence)
            ));
        }
        html.push_str("</ul>\n");
    } else {
        html.push_str(&format!("<p>{NO_FLOWERS_MESSAGE}</p>\n"));
    }

    if !analysis.colors.is_empty() {
        html.push_str("<h3>Dominant Colors</h3>\n<ul>\n");
        for color in &analysis.colors {
            html.push_str(&format!(
                "<li><span class=\"color-swatch\" style=\"background-color: {}\"></span>{}</li>\n",
                swatch_color(color),
                escape_html(color)
            ));
        }
        html.push_str("</ul>\n");
    }

    if !analysis.description.is_empty() {
        html.push_str(&format!(
            "<h3>Description</h3>\n<p>{}</p>\n",
            escape_html(&analysis.description)
        ));
    }

    html.push_str("</div>\n");
    html
}

/// Plain-text report for terminals.
pub fn render_text(analysis: &FlowerAnalysis, image: &RemoteImageRef) -> String {
    let mut out = format!("Image: {image}\n\n");

    if analysis.has_flowers() {
        out.push_str("Detected flowers:\n");
        for flower in &analysis.flowers {
            out.push_str(&format!(
                "  {}\n    Count: {}\n    Confidence: {}\n",
                title_case(&flower.kind),
                flower.count,
                format_confidence(flower.confidence)
            ));
        }
    } else {
        out.push_str(NO_FLOWERS_MESSAGE);
        out.push('\n');
    }

    if !analysis.colors.is_empty() {
        out.push_str("\nDominant colors:\n");
        for color in &analysis.colors {
            out.push_str(&format!("  ■ {color}\n"));
        }
    }

    if !analysis.description.is_empty() {
        out.push_str(&format!("\nDescription: {}\n", analysis.description));
    }
    out
}

/// Raw payloads for the debug panel.
pub fn render_diagnostics(image: &RemoteImageRef, vision_response: &serde_json::Value) -> String {
    let pretty = serde_json::to_string_pretty(vision_response).unwrap_or_default();
    format!(
        concat!(
            r#"<div class="debug-box"><h4>Storage URL</h4><pre>{}</pre></div>"#,
            "\n",
            r#"<div class="debug-box"><h4>Vision Response</h4><pre>{}</pre></div>"#,
            "\n"
        ),
        escape_html(image.as_str()),
        escape_html(&pretty)
    )
}
