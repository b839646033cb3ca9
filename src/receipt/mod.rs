//! # Receipt Builders
//!
//! Collection receipts handed to customers after an agent records a
//! payment. The screen layer assembles a [`ReceiptContext`] (it arrives as
//! JSON) and the session renders it either as fixed-width text for the
//! Bluetooth printer or as HTML ([`html`]) for the platform print service.
//!
//! ## Text Layout (58mm, 40 columns)
//!
//! ```text
//!            SRI LAKSHMI CHITS
//!            Main Road, Guntur
//! ----------------------------------------
//!        CHIT SUBSCRIPTION RECEIPT
//! ----------------------------------------
//! Receipt No:                       R-1024
//! Date:                   16-10-2026 10:30
//! Customer:                     Ravi Kumar
//! Phone:                        9876543210
//! Group:                             G-112
//! Ticket:                                7
//! ----------------------------------------
//! AMOUNT:                     Rs. 1,500.00
//! Mode:                               CASH
//! ----------------------------------------
//! Agent:                    Suresh (AG-07)
//!
//!                Thank you!
//! ```

pub mod html;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::components::{
    Columns, ComponentExt, Divider, Header, Layout, Receipt, Spacer, Text,
};
use crate::printer::{PrinterConfig, ReceiptHeader};

/// Display format for receipt dates.
pub const DATE_FORMAT: &str = "%d-%m-%Y %H:%M";

// ============================================================================
// RECEIPT CONTEXT
// ============================================================================

/// What the payment was collected against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountRef {
    /// Monthly chit subscription
    Chit { group: String, ticket: String },
    /// Gold loan repayment
    GoldLoan { loan_no: String },
    /// Daily pigmy savings deposit
    Pigmy { account_no: String },
}

impl AccountRef {
    /// Receipt title for this kind of collection.
    pub fn title(&self) -> &'static str {
        match self {
            AccountRef::Chit { .. } => "CHIT SUBSCRIPTION RECEIPT",
            AccountRef::GoldLoan { .. } => "GOLD LOAN REPAYMENT RECEIPT",
            AccountRef::Pigmy { .. } => "PIGMY DEPOSIT RECEIPT",
        }
    }

    /// Label/value rows identifying the account.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            AccountRef::Chit { group, ticket } => {
                vec![("Group", group.as_str()), ("Ticket", ticket.as_str())]
            }
            AccountRef::GoldLoan { loan_no } => vec![("Loan No", loan_no.as_str())],
            AccountRef::Pigmy { account_no } => vec![("Account No", account_no.as_str())],
        }
    }
}

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Upi,
    Cheque,
    BankTransfer,
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PaymentMode::Cash => "CASH",
            PaymentMode::Upi => "UPI",
            PaymentMode::Cheque => "CHEQUE",
            PaymentMode::BankTransfer => "BANK TRANSFER",
        };
        f.write_str(label)
    }
}

/// The collecting agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    pub code: String,
}

impl std::fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.code.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} ({})", self.name, self.code)
        }
    }
}

/// Everything printed on one collection receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptContext {
    pub customer_name: String,
    pub phone: String,
    pub receipt_no: String,
    pub date: NaiveDateTime,
    pub account: AccountRef,
    /// Amount collected, in rupees
    pub amount: f64,
    pub payment_mode: PaymentMode,
    pub agent: AgentIdentity,
}

impl ReceiptContext {
    /// Parse the JSON handed over by the screen layer.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn formatted_date(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

/// Format rupees with Indian digit grouping: `150000.5` → `1,50,000.50`.
pub fn format_inr(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let grouped = if whole.len() <= 3 {
        whole.to_string()
    } else {
        let (head, last3) = whole.split_at(whole.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(2);
            groups.push(&head[start..end]);
            end = start;
        }
        groups.reverse();
        format!("{},{}", groups.join(","), last3)
    };

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}

// ============================================================================
// TEXT RECEIPTS
// ============================================================================

/// Build the text receipt for `ctx`.
pub fn payment_receipt(ctx: &ReceiptContext, header: &ReceiptHeader) -> Receipt {
    let mut receipt = Receipt::new().child(Header::new(&header.company));
    for line in &header.address_lines {
        receipt = receipt.child(Text::new(line).center());
    }

    receipt = receipt
        .child(Divider::dashed())
        .child(Text::new(ctx.account.title()).center())
        .child(Divider::dashed())
        .child(Columns::new("Receipt No:", &ctx.receipt_no))
        .child(Columns::new("Date:", ctx.formatted_date()))
        .child(Columns::new("Customer:", &ctx.customer_name))
        .child(Columns::new("Phone:", &ctx.phone));

    for (label, value) in ctx.account.fields() {
        receipt = receipt.child(Columns::new(format!("{}:", label), value));
    }

    receipt
        .child(Divider::dashed())
        .child(Columns::new("AMOUNT:", format!("Rs. {}", format_inr(ctx.amount))))
        .child(Columns::new("Mode:", ctx.payment_mode.to_string()))
        .child(Divider::dashed())
        .child(Columns::new("Agent:", ctx.agent.to_string()))
        .child(Spacer::lines(1))
        .child(Text::new(&header.footer).center())
        .feed(3)
}

/// Render the text receipt for `ctx` on `printer`.
pub fn render_text(ctx: &ReceiptContext, header: &ReceiptHeader, printer: &PrinterConfig) -> String {
    payment_receipt(ctx, header).render(&Layout::for_printer(printer))
}

/// Alignment test page for a newly issued printer.
///
/// A column ruler shows whether the configured line width matches the
/// hardware; wrapped rulers mean the profile is too wide.
pub fn test_page(header: &ReceiptHeader, printer: &PrinterConfig) -> String {
    let width = printer.line_width;
    let ruler: String = (1..=width)
        .map(|i| char::from(b'0' + (i % 10) as u8))
        .collect();

    Receipt::new()
        .child(Header::new(&header.company))
        .child(Divider::equals())
        .child(Text::new("PRINTER TEST PAGE").center())
        .child(Divider::equals())
        .child(Text::new(ruler))
        .child(Text::new("left"))
        .child(Text::new("center").center())
        .child(Text::new("right").right())
        .child(Columns::new("Profile:", printer.name))
        .child(Columns::new("Columns:", width.to_string()))
        .child(Divider::dashed())
        .feed(3)
        .render(&Layout::for_printer(printer))
}

// ============================================================================
// TESTS
// ============================================================================
