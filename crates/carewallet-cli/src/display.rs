//! Terminal rendering for claims, wallets and events

use carewallet_sdk::{Claim, ClaimEvent, ClaimStatus, Money, Wallet};
use colored::*;

/// Numbered stage banner
pub fn stage(number: u32, title: &str) {
    println!();
    println!("{} {}", format!("[{}]", number).bright_black(), title.bright_white().bold());
}

/// Outcome of a step: green when it went through, red when refused
pub fn outcome(accepted: bool, message: &str) {
    if accepted {
        println!("  {} {}", "ok".bright_green(), message);
    } else {
        println!("  {} {}", "no".bright_red(), message.bright_red());
    }
}

pub fn note(message: &str) {
    println!("  {} {}", "..".bright_blue(), message);
}

pub fn field(key: &str, value: &str) {
    println!("      {:<14} {}", key.bright_black(), value.bright_cyan());
}

pub fn money(amount: Money, currency: &str) -> String {
    format!("{} {}", currency, amount)
}

fn status(status: ClaimStatus) -> ColoredString {
    let label = format!("{:?}", status);
    match status {
        ClaimStatus::Approved | ClaimStatus::PaymentCompleted => label.green(),
        ClaimStatus::PartiallyApproved | ClaimStatus::DocumentsRequired => label.yellow(),
        ClaimStatus::Rejected | ClaimStatus::Cancelled => label.red(),
        _ => label.normal(),
    }
}

pub fn claim(claim: &Claim, currency: &str) {
    field("claim", &claim.claim_id.to_string());
    match claim.entered_at(claim.status) {
        Some(since) => field("status", &format!("{} since {}", status(claim.status), since.format("%H:%M:%S"))),
        None => field("status", &status(claim.status).to_string()),
    }
    field("bill", &money(claim.bill_amount, currency));
    if let Some(approved) = claim.approved_amount {
        field("approved", &money(approved, currency));
    }
    if let Some(rejection) = &claim.rejection {
        field("rejected", &rejection.describe());
    }
}

pub fn wallet(wallet: &Wallet, currency: &str) {
    field("wallet", &wallet.wallet_id.to_string());
    field("period", &format!("{} .. {}", wallet.period.start, wallet.period.end));
    field("allocated", &money(wallet.balance.allocated, currency));
    field("consumed", &money(wallet.balance.consumed, currency));
    field("current", &money(wallet.balance.current, currency));
    field("status", &format!("{:?}", wallet.status));
}

pub fn event(event: &ClaimEvent) {
    println!(
        "  {} {}",
        event.timestamp().format("%H:%M:%S%.3f").to_string().bright_black(),
        event.summary()
    );
}
