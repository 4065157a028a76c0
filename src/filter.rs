//! Client-side search over already-loaded lists.

use std::collections::BTreeMap;

use crate::{MaintenanceTicket, Occurrence, OccurrenceStatus, Priority, TicketStatus};

/// Item with free text that search terms are matched against.
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;

    /// Every whitespace-separated term must appear in some field,
    /// ignoring case. Blank text matches everything.
    fn matches_text(&self, text: &str) -> bool {
        let fields: Vec<String> = self
            .search_fields()
            .into_iter()
            .map(str::to_lowercase)
            .collect();
        text.split_whitespace().all(|term| {
            let term = term.to_lowercase();
            fields.iter().any(|field| field.contains(&term))
        })
    }
}

impl Searchable for MaintenanceTicket {
    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.title.as_str()),
            self.description.as_deref(),
            self.location.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl Searchable for Occurrence {
    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.title.as_str()),
            self.description.as_deref(),
            self.category.as_deref(),
            self.reported_by.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Items matching `text`, in their original order.
pub fn search<'a, T: Searchable>(items: &'a [T], text: &str) -> Vec<&'a T> {
    items.iter().filter(|item| item.matches_text(text)).collect()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TicketFilter {
    pub text: String,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &MaintenanceTicket) -> bool {
        !matches!(self.status, Some(status) if status != ticket.status)
            && !matches!(self.priority, Some(priority) if priority != ticket.priority)
            && ticket.matches_text(&self.text)
    }

    pub fn apply<'a>(&self, tickets: &'a [MaintenanceTicket]) -> Vec<&'a MaintenanceTicket> {
        tickets.iter().filter(|ticket| self.matches(ticket)).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OccurrenceFilter {
    pub text: String,
    pub status: Option<OccurrenceStatus>,
}

impl OccurrenceFilter {
    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        !matches!(self.status, Some(status) if status != occurrence.status)
            && occurrence.matches_text(&self.text)
    }

    pub fn apply<'a>(&self, occurrences: &'a [Occurrence]) -> Vec<&'a Occurrence> {
        occurrences
            .iter()
            .filter(|occurrence| self.matches(occurrence))
            .collect()
    }
}

/// Ticket totals per status for summary cards.
pub fn count_by_status(tickets: &[MaintenanceTicket]) -> BTreeMap<TicketStatus, usize> {
    let mut counts = BTreeMap::new();
    for ticket in tickets {
        *counts.entry(ticket.status).or_insert(0) += 1;
    }
    counts
}
