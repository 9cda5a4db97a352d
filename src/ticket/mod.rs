/*!
 * Ticket Module
 * Permission tickets raised by requesters and decided by resource owners
 */

mod ledger;
mod types;

pub use ledger::TicketLedger;
pub use types::{Ticket, TicketFilter, TicketStatus, TicketUpdate};
