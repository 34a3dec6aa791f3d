//! Inventory manager for event ticket types.
//!
//! Keeps `ticket_types[].available` consistent with outstanding reservations.
//! A reservation happens when a registration is submitted (before payment is
//! verified) and is released again when the registration is rejected or
//! cancelled.
//!
//! **Concurrency Strategy**: the manager never writes `available` itself. It
//! validates against the snapshot the caller loaded and returns a
//! [`Mutation`] that the store applies as a compare-and-set inside the same
//! commit as the registration change. Two requests racing for the last ticket
//! both pass the snapshot check, but only one commit can take `available`
//! from 1 to 0; the other fails with `InsufficientInventory`.
//!
//! ```text
//! invariant: 0 <= available <= quantity   (for every ticket type, always)
//! ```

use crate::error::{Result, WorkflowError};
use crate::store::Mutation;
use crate::types::{Event, Money, TicketType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ticket type as supplied by an organizer, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTypeDraft {
    /// Name, unique within the event
    pub name: String,
    /// Price per ticket
    pub price: Money,
    /// Tickets on sale
    pub quantity: u32,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Stateless validator and mutation builder for ticket inventory.
#[derive(Clone, Copy, Debug, Default)]
pub struct InventoryManager;

impl InventoryManager {
    /// Creates a new `InventoryManager`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates organizer-supplied ticket types and opens them for sale.
    ///
    /// Zero price and zero quantity are rejected instead of being replaced by
    /// defaults; `available` starts equal to `quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] for an empty list, blank or
    /// duplicate names, zero prices or zero quantities.
    pub fn open_ticket_types(&self, drafts: Vec<TicketTypeDraft>) -> Result<Vec<TicketType>> {
        if drafts.is_empty() {
            return Err(WorkflowError::validation(
                "an event needs at least one ticket type",
            ));
        }

        let mut seen = HashSet::new();
        drafts
            .into_iter()
            .map(|draft| {
                let name = draft.name.trim().to_string();
                if name.is_empty() {
                    return Err(WorkflowError::validation("ticket type name is required"));
                }
                if !seen.insert(name.to_lowercase()) {
                    return Err(WorkflowError::validation(format!(
                        "duplicate ticket type '{name}'"
                    )));
                }
                if draft.price.is_zero() {
                    return Err(WorkflowError::validation(format!(
                        "ticket type '{name}' must have a price greater than zero"
                    )));
                }
                if draft.quantity == 0 {
                    return Err(WorkflowError::validation(format!(
                        "ticket type '{name}' must have a quantity greater than zero"
                    )));
                }
                Ok(TicketType {
                    name,
                    price: draft.price,
                    quantity: draft.quantity,
                    available: draft.quantity,
                    description: draft.description.unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Resolves an event's capacity against its ticket types.
    ///
    /// An absent capacity defaults to the total number of tickets.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] if the ticket types add up to more
    /// than the requested capacity.
    pub fn resolve_capacity(&self, requested: Option<u32>, ticket_types: &[TicketType]) -> Result<u32> {
        let total = ticket_types
            .iter()
            .try_fold(0_u32, |sum, t| sum.checked_add(t.quantity))
            .ok_or_else(|| WorkflowError::validation("ticket quantities overflow"))?;

        match requested {
            None => Ok(total),
            Some(0) => Err(WorkflowError::validation("capacity must be greater than zero")),
            Some(capacity) if total > capacity => Err(WorkflowError::validation(format!(
                "ticket types offer {total} tickets but capacity is {capacity}"
            ))),
            Some(capacity) => Ok(capacity),
        }
    }

    /// Builds the reservation of `quantity` tickets of `ticket_type`.
    ///
    /// Fails fast against the loaded snapshot; the store re-checks atomically
    /// when the returned mutation is committed.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Validation`] for a zero quantity or unknown type
    /// - [`WorkflowError::OutOfStock`] if the snapshot has too few tickets
    pub fn reserve(&self, event: &Event, ticket_type: &str, quantity: u32) -> Result<Mutation> {
        if quantity == 0 {
            return Err(WorkflowError::validation("quantity must be at least 1"));
        }
        let line = Self::line(event, ticket_type)?;
        if line.available < quantity {
            return Err(WorkflowError::OutOfStock {
                ticket_type: line.name.clone(),
                requested: quantity,
                available: line.available,
            });
        }
        Ok(Mutation::ReserveTickets {
            event_id: event.id,
            ticket_type: line.name.clone(),
            quantity,
        })
    }

    /// Builds the release of `quantity` previously reserved tickets.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] if the ticket type is unknown.
    pub fn release(&self, event: &Event, ticket_type: &str, quantity: u32) -> Result<Mutation> {
        let line = Self::line(event, ticket_type)?;
        Ok(Mutation::ReleaseTickets {
            event_id: event.id,
            ticket_type: line.name.clone(),
            quantity,
        })
    }

    /// Checks `0 <= available <= quantity` for every ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] naming the first broken line.
    pub fn check_invariants(&self, event: &Event) -> Result<()> {
        match event.ticket_types.iter().find(|t| t.available > t.quantity) {
            Some(line) => Err(WorkflowError::validation(format!(
                "ticket type '{}' has {} available but only {} in total",
                line.name, line.available, line.quantity
            ))),
            None => Ok(()),
        }
    }

    fn line<'a>(event: &'a Event, ticket_type: &str) -> Result<&'a TicketType> {
        event.ticket_type(ticket_type).ok_or_else(|| {
            WorkflowError::validation(format!(
                "event has no ticket type named '{ticket_type}'"
            ))
        })
    }
}

/// Applies a reservation to a ticket type in place.
///
/// Store backends without native compare-and-set use this so every backend
/// enforces the same rule.
///
/// # Errors
///
/// Returns the number of tickets still available when fewer than `quantity`
/// remain; the ticket type is left unchanged.
pub fn apply_reserve(line: &mut TicketType, quantity: u32) -> std::result::Result<(), u32> {
    match line.available.checked_sub(quantity) {
        Some(remaining) => {
            line.available = remaining;
            Ok(())
        }
        None => Err(line.available),
    }
}

/// Applies a release to a ticket type in place, clamped to `quantity`.
pub fn apply_release(line: &mut TicketType, quantity: u32) {
    line.available = line.available.saturating_add(quantity).min(line.quantity);
}
