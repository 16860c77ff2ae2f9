use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{ClassType, Seat};

/// Cabin layout: six seats per row, lettered A–F.
pub const SEATS_PER_ROW: usize = 6;

/// Share of a flight's seat pool given to each class, in percent.
pub const CLASS_SHARES: [(ClassType, i32); 4] = [
    (ClassType::Economy, 70),
    (ClassType::PremiumEconomy, 20),
    (ClassType::Business, 8),
    (ClassType::First, 2),
];

/// Where a seat sits in its cabin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatPosition {
    pub row: usize,
    pub letter: char,
}

impl SeatPosition {
    /// Position of the `index`-th seat (zero based) of a cabin.
    pub fn at(index: usize) -> Self {
        let column = (index % SEATS_PER_ROW) as u8;
        Self {
            row: index / SEATS_PER_ROW + 1,
            letter: (b'A' + column) as char,
        }
    }

    pub fn is_window(&self) -> bool {
        matches!(self.letter, 'A' | 'F')
    }

    pub fn is_aisle(&self) -> bool {
        matches!(self.letter, 'C' | 'D')
    }

    /// Seat label such as `E12C`.
    pub fn seat_number(&self, class_type: ClassType) -> String {
        format!("{}{}{}", class_type.seat_prefix(), self.row, self.letter)
    }
}

/// Split a seat pool across classes using [`CLASS_SHARES`], truncating.
/// Classes that end up with no seats are left out.
pub fn class_allocation(pool: i32) -> Vec<(ClassType, i32)> {
    CLASS_SHARES
        .iter()
        .map(|(class_type, share)| (*class_type, pool.max(0) * share / 100))
        .filter(|(_, seats)| *seats > 0)
        .collect()
}

/// Count available seats per seat class.
pub fn available_by_class(seats: &[Seat]) -> HashMap<Uuid, i32> {
    let mut counts: HashMap<Uuid, i32> = HashMap::new();
    for seat in seats {
        let entry = counts.entry(seat.seat_class_id).or_insert(0);
        if seat.is_available {
            *entry += 1;
        }
    }
    counts
}
