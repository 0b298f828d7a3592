//! CareWallet Claims - The claim adjudication state machine
//!
//! ```text
//! DRAFT → SUBMITTED → UNASSIGNED → ASSIGNED → UNDER_REVIEW ⇄ DOCUMENTS_REQUIRED
//!                                                  │
//!                       ┌──────────────────────────┼──────────────┐
//!                       ▼                          ▼              ▼
//!                   APPROVED              PARTIALLY_APPROVED   REJECTED
//!                       └────────────┬─────────────┘
//!                                    ▼
//!              PAYMENT_PENDING → PAYMENT_PROCESSING → PAYMENT_COMPLETED
//! ```
//!
//! CANCELLED is reachable by the filing member before a decision.
//!
//! # Invariants
//!
//! 1. Status only changes through the transition table
//! 2. Each transition appends exactly one status-history entry
//! 3. Commits are compare-and-apply on the claim version
//! 4. Approval never touches the wallet; payment does

pub mod adjudication;
pub mod directory;
pub mod notify;
pub mod store;
pub mod transitions;
pub mod workflow;

pub use adjudication::{adjudicate, Decision};
pub use directory::{ActorDirectory, InMemoryActorDirectory};
pub use notify::{BroadcastNotifier, ClaimEvent, NoopNotifier, Notifier};
pub use store::ClaimStore;
pub use workflow::{ClaimWorkflow, Review, ReviewDecision};
