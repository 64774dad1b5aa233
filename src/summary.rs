use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::schemas::{HostPaymentMethod, Item, Person, Session};
use crate::settlement::{BillSummary, Ledger};

pub const CSV_HEADER: &str = "ชื่อ,รายการ,ราคาต่อคน,สุทธิ,เงินให้ยืม,เงินที่ต้องจ่าย";

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Baht display with up to two fraction digits, e.g. `฿1,234.5` or `-฿45`.
/// The amount itself is never rounded in place, only its rendering.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round();
    if !cents.is_finite() {
        return "฿0".to_string();
    }
    let whole = format!("{:.0}", (cents / 100.0).trunc());
    let fraction = (cents % 100.0) as u64;
    let sign = if amount < 0.0 && cents > 0.0 { "-" } else { "" };

    let mut out = format!("{sign}฿{}", group_thousands(&whole));
    if fraction > 0 {
        let fraction = format!("{fraction:02}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out
}

/// Baht with exactly two decimals, as used in copied text.
pub fn format_fixed(amount: f64) -> String {
    format!("฿{amount:.2}")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// One row per (person, item). Name and balance columns are only filled on a
/// person's first row, and every person's block ends with an empty line.
pub fn export_csv(people: &[Person], items: &[Item]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for person in Ledger::new(people, items).summarize() {
        let net = format_currency(person.net_balance);
        let lent = format_currency(person.lent);
        let owes = format_currency(person.owes);
        for (index, item) in person.items.iter().enumerate() {
            let first = index == 0;
            let pick = |value: &str| if first { csv_field(value) } else { String::new() };
            let row = [
                pick(&person.name),
                csv_quoted(&item.name),
                csv_field(&format_currency(item.split_price)),
                pick(&net),
                pick(&lent),
                pick(&owes),
            ];
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
        csv.push('\n');
    }
    csv
}

pub fn share_text(people: &[Person], items: &[Item]) -> String {
    let ledger = Ledger::new(people, items);
    let lines: Vec<String> = ledger
        .bill_summary()
        .0
        .iter()
        .map(|(_, bill)| format!("{}: {}", bill.name, format_fixed(bill.total)))
        .collect();
    format!(
        "One&Done Bill Summary\n\n{}\n\nTotal: {}",
        lines.join("\n"),
        format_fixed(ledger.total_bill())
    )
}

pub fn payment_request_text(host_name: &str, total: f64, method: &HostPaymentMethod) -> String {
    let mut lines = vec![
        format!("ชำระเงินให้ {host_name}"),
        format!("จำนวน: {}", format_fixed(total)),
    ];
    if !method.details.is_empty() {
        lines.push(format!("รายละเอียด: {}", method.details));
    }
    lines.join("\n")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot<'a> {
    pub people: &'a [Person],
    pub items: &'a [Item],
    pub bill_summary: BillSummary,
    pub total_bill: f64,
    pub host_id: Option<&'a str>,
    pub host_payment_method: &'a HostPaymentMethod,
    pub timestamp: String,
}

pub fn export_snapshot(session: &Session, now: DateTime<Utc>) -> ExportSnapshot<'_> {
    let ledger = Ledger::new(&session.people, &session.items);
    ExportSnapshot {
        people: &session.people,
        items: &session.items,
        bill_summary: ledger.bill_summary(),
        total_bill: ledger.total_bill(),
        host_id: session.host_id.as_deref(),
        host_payment_method: &session.host_payment_method,
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

pub fn export_file_name(extension: &str, now: DateTime<Utc>) -> String {
    format!("one-and-done-bill-{}.{extension}", now.timestamp_millis())
}
