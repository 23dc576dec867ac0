//! Terminal surfaces for the session manager: notifications go to stderr,
//! tables and records to stdout.

use ledgerdesk_core::ledger::{ExportRow, GlTransaction};
use ledgerdesk_core::{Notification, Notifier, SessionState, Severity, UserRecord};

/// Prints notifications to stderr as they arrive.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        let marker = match notification.severity {
            Severity::Info => "i",
            Severity::Warning => "!",
            Severity::Error => "✗",
        };
        eprintln!("{} {}", marker, notification.message);
    }
}

pub fn print_state(state: &SessionState) {
    println!("Phase:   {:?}", state.phase());
    match state.user {
        Some(ref user) => print_user(user),
        None => println!("User:    (none)"),
    }
}

pub fn print_user(user: &UserRecord) {
    println!("User:    {} (id {})", user.display_name(), user.id);
    println!("Company: {}", user.company_code);
    println!("Type:    {}", user.user_type);
    if !user.email.is_empty() {
        println!("Email:   {}", user.email);
    }
}

const COLUMNS: [(&str, usize); 7] = [
    ("V Code", 8),
    ("V No", 8),
    ("V Date", 10),
    ("Status", 8),
    ("V Desc", 28),
    ("Debit", 16),
    ("Credit", 16),
];

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let kept: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

pub fn print_transactions(rows: &[&GlTransaction]) {
    let header: Vec<String> = COLUMNS
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect();
    println!("{}", header.join(" "));

    for row in rows {
        let export = ExportRow::from(*row);
        let cells = [
            export.vcode.as_str(),
            export.vno.as_str(),
            export.vdate.as_str(),
            export.status,
            export.vdesc.as_str(),
            export.debit.as_str(),
            export.credit.as_str(),
        ];
        let line: Vec<String> = cells
            .iter()
            .zip(COLUMNS.iter())
            .enumerate()
            .map(|(i, (cell, (_, width)))| {
                let cell = clip(cell, *width);
                // Amounts are right-aligned
                if i >= 5 {
                    format!("{:>width$}", cell, width = width)
                } else {
                    format!("{:<width$}", cell, width = width)
                }
            })
            .collect();
        println!("{}", line.join(" "));
    }
    println!("{} voucher(s)", rows.len());
}
