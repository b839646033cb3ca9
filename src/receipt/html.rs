//! # HTML Receipts
//!
//! The same collection receipt as [`super::render_text`], laid out as a
//! standalone HTML document for the platform print service. Paper width
//! comes from the printer profile so the preview matches the roll.

use std::fmt::Write;

use super::{ReceiptContext, format_inr};
use crate::printer::{PrinterConfig, ReceiptHeader};

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn row(html: &mut String, label: &str, value: &str) {
    let _ = writeln!(
        html,
        "<tr><td>{}</td><td class=\"value\">{}</td></tr>",
        escape(label),
        escape(value)
    );
}

/// Render `ctx` as a complete HTML document.
pub fn render(ctx: &ReceiptContext, header: &ReceiptHeader, printer: &PrinterConfig) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>Receipt {}</title>", escape(&ctx.receipt_no));
    let _ = writeln!(
        html,
        "<style>\n\
         @page {{ size: {w}mm auto; margin: 0; }}\n\
         body {{ width: {w}mm; margin: 0 auto; font-family: monospace; font-size: 12px; }}\n\
         .center {{ text-align: center; }}\n\
         hr {{ border: none; border-top: 1px dashed #000; }}\n\
         table {{ width: 100%; border-collapse: collapse; }}\n\
         td.value {{ text-align: right; }}\n\
         .amount td {{ font-weight: bold; font-size: 14px; }}\n\
         </style>",
        w = printer.paper_width_mm
    );
    html.push_str("</head>\n<body>\n");

    let _ = writeln!(
        html,
        "<h2 class=\"center\" style=\"margin: 4px 0;\">{}</h2>",
        escape(&header.company.to_uppercase())
    );
    for line in &header.address_lines {
        let _ = writeln!(html, "<div class=\"center\">{}</div>", escape(line));
    }
    html.push_str("<hr>\n");
    let _ = writeln!(
        html,
        "<div class=\"center\"><strong>{}</strong></div>",
        ctx.account.title()
    );
    html.push_str("<hr>\n<table>\n");

    row(&mut html, "Receipt No", &ctx.receipt_no);
    row(&mut html, "Date", &ctx.formatted_date());
    row(&mut html, "Customer", &ctx.customer_name);
    row(&mut html, "Phone", &ctx.phone);
    for (label, value) in ctx.account.fields() {
        row(&mut html, label, value);
    }
    html.push_str("</table>\n<hr>\n<table>\n");

    let _ = writeln!(
        html,
        "<tr class=\"amount\"><td>AMOUNT</td><td class=\"value\">&#8377; {}</td></tr>",
        format_inr(ctx.amount)
    );
    row(&mut html, "Mode", &ctx.payment_mode.to_string());
    html.push_str("</table>\n<hr>\n<table>\n");
    row(&mut html, "Agent", &ctx.agent.to_string());
    html.push_str("</table>\n");

    let _ = writeln!(
        html,
        "<p class=\"center\" style=\"margin-top: 12px;\">{}</p>",
        escape(&header.footer)
    );
    html.push_str("</body>\n</html>\n");

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::tests::chit_receipt;

    #[test]
    fn test_escape() {
        assert_eq!(escape("A & B <c> \"d\" 'e'"), "A &amp; B &lt;c&gt; &quot;d&quot; &#39;e&#39;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_document_structure() {
        let html = render(&chit_receipt(), &ReceiptHeader::default(), &PrinterConfig::THERMAL_58MM);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.trim_end().ends_with("</html>"));
        assert!(html.contains("width: 58mm"));
        assert!(html.contains("CHIT SUBSCRIPTION RECEIPT"));
        assert!(html.contains("&#8377; 1,500.00"));
        assert!(html.contains("<td class=\"value\">16-10-2026 10:30</td>"));
        assert!(html.contains("<td class=\"value\">Suresh (AG-07)</td>"));
    }

    #[test]
    fn test_paper_width_follows_profile() {
        let html = render(&chit_receipt(), &ReceiptHeader::default(), &PrinterConfig::THERMAL_80MM);
        assert!(html.contains("width: 80mm"));
    }

    #[test]
    fn test_fields_are_escaped() {
        let mut ctx = chit_receipt();
        ctx.customer_name = "<script>alert(1)</script>".into();
        let html = render(&ctx, &ReceiptHeader::default(), &PrinterConfig::THERMAL_58MM);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
