//! Placeholder policy document
//!
//! Renders a minimal three-page PDF for a policy holder and carries the fixed
//! signature placements of that template. Offsets in the xref table are
//! computed from the rendered bytes, so the output is a well-formed PDF.

use chrono::{DateTime, Datelike, Utc};
use signstation::SignatureCoordinate;

/// Pages in the policy template.
pub const POLICY_PAGE_COUNT: u32 = 3;

const SIGNATURE_WIDTH: &str = "112.91512915129151";
const SIGNATURE_HEIGHT: &str = "45.16605166051662";

/// Signature rectangles for the policy template, one per page.
pub fn policy_signature_coordinates() -> Vec<SignatureCoordinate> {
    [
        ("484.78228782287823", "30.15498154981526", 1),
        ("481.77121771217713", "32.41328413284111", 2),
        ("141.52029520295204", "120.48708487084855", 3),
    ]
    .into_iter()
    .map(|(x, y, page)| SignatureCoordinate::new(x, y, page, SIGNATURE_WIDTH, SIGNATURE_HEIGHT))
    .collect()
}

/// A rendered policy document ready for signing.
#[derive(Debug, Clone)]
pub struct PolicyDocument {
    pub name: String,
    pub policy_number: String,
    pub bytes: Vec<u8>,
}

impl PolicyDocument {
    /// Render the policy for `holder` as of `now`.
    pub fn render(holder: &str, now: DateTime<Utc>) -> Self {
        let policy_number = format!("POL-{}-{}", now.year(), now.timestamp_millis());
        let date = now.format("%d/%m/%Y").to_string();

        let pages = [
            page(
                1,
                &[
                    format!("Policy Holder: {holder}"),
                    format!("Policy Number: {policy_number}"),
                    "Coverage: Comprehensive".to_string(),
                    "Premium: Rs. 12,000/-".to_string(),
                ],
            ),
            page(
                2,
                &[
                    "Terms and Conditions".to_string(),
                    "1. Coverage Details".to_string(),
                    "2. Exclusions".to_string(),
                    "3. Claim Process".to_string(),
                ],
            ),
            page(
                3,
                &[
                    "Declaration and Signature".to_string(),
                    "I agree to the terms mentioned above.".to_string(),
                    "Signature: ________________".to_string(),
                    format!("Date: {date}"),
                ],
            ),
        ];

        Self {
            name: format!("Policy_{holder}"),
            policy_number,
            bytes: assemble(&pages),
        }
    }
}

fn page(number: u32, lines: &[String]) -> String {
    let mut stream = String::from("BT\n/F1 24 Tf\n100 700 Td\n");
    stream.push_str(&format!("({}) Tj\n/F1 14 Tf\n", escape(&format!("Car Insurance Policy - Page {number}"))));
    for line in lines {
        stream.push_str(&format!("0 -30 Td\n({}) Tj\n", escape(line)));
    }
    stream.push_str("ET");
    stream
}

/// Escape a string for a PDF literal.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

fn assemble(streams: &[String]) -> Vec<u8> {
    let page_count = streams.len();
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 3 + i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"),
    ];
    for i in 0..page_count {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R >>",
            3 + page_count + i
        ));
    }
    for stream in streams {
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
    }

    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    ));
    out.into_bytes()
}
