//! Slot ownership bitmap for the fixed 16384-slot keyspace.
//!
//! A `SlotSet` records which hash slots a master claims to own. The keyspace
//! size is a protocol constant, so the bitmap is a fixed-size array rather
//! than a growable set. Writes are deliberately non-idempotent: setting an
//! already-set slot (or clearing an already-clear one) is an error, so that
//! bookkeeping bugs surface instead of being silently absorbed.

use thiserror::Error;

/// Total number of hash slots in a Valkey cluster.
pub const TOTAL_SLOTS: u16 = 16384;

/// Errors from slot bitmap operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotSetError {
    #[error("slot {0} out of range")]
    OutOfRange(u16),

    #[error("slot {0} already set")]
    AlreadySet(u16),

    #[error("slot {0} already unset")]
    AlreadyUnset(u16),

    #[error("invalid slot range token: {0:?}")]
    InvalidRange(String),
}

/// Fixed-size ownership bitmap, one cell per slot.
#[derive(Clone, PartialEq, Eq)]
pub struct SlotSet {
    bits: Box<[bool; TOTAL_SLOTS as usize]>,
}

impl Default for SlotSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotSet {
    /// Create an empty slot set.
    pub fn new() -> Self {
        Self {
            bits: Box::new([false; TOTAL_SLOTS as usize]),
        }
    }

    /// Build a slot set from whitespace-separated range tokens (`"0-100 200"`).
    ///
    /// Parses into a fresh set, so a failure leaves no partially-built value
    /// in the caller's hands.
    pub fn from_range_tokens(tokens: &str) -> Result<Self, SlotSetError> {
        let mut set = Self::new();
        for token in tokens.split_whitespace() {
            set.parse_range(token)?;
        }
        Ok(set)
    }

    /// Mark a slot as owned.
    ///
    /// Fails if the slot is out of range or already set; callers are expected
    /// to track state rather than rely on idempotent writes.
    pub fn set(&mut self, slot: u16) -> Result<(), SlotSetError> {
        if slot >= TOTAL_SLOTS {
            return Err(SlotSetError::OutOfRange(slot));
        }
        if self.bits[slot as usize] {
            return Err(SlotSetError::AlreadySet(slot));
        }
        self.bits[slot as usize] = true;
        Ok(())
    }

    /// Clear a slot. Fails if out of range or already unset.
    pub fn unset(&mut self, slot: u16) -> Result<(), SlotSetError> {
        if slot >= TOTAL_SLOTS {
            return Err(SlotSetError::OutOfRange(slot));
        }
        if !self.bits[slot as usize] {
            return Err(SlotSetError::AlreadyUnset(slot));
        }
        self.bits[slot as usize] = false;
        Ok(())
    }

    /// Check whether a slot is set. Out-of-range slots read as unset.
    pub fn is_set(&self, slot: u16) -> bool {
        slot < TOTAL_SLOTS && self.bits[slot as usize]
    }

    /// Check whether no slots are set.
    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|b| *b)
    }

    /// Check whether every slot is set.
    pub fn is_full(&self) -> bool {
        self.bits.iter().all(|b| *b)
    }

    /// Number of set slots.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Iterate over set slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(|(i, _)| i as u16)
    }

    /// Apply one range token (`"N"` or `"N-M"`, inclusive) to this set.
    ///
    /// An empty token is malformed input, not a no-op. If a slot in the range
    /// fails to set (duplicate or out of range), the error is returned and
    /// slots set so far remain set. Callers needing atomicity should parse
    /// into a fresh set and merge.
    pub fn parse_range(&mut self, token: &str) -> Result<(), SlotSetError> {
        if token.is_empty() {
            return Err(SlotSetError::InvalidRange(token.to_string()));
        }

        let (begin, end) = match token.split_once('-') {
            Some((b, e)) => {
                let begin: u16 = b
                    .parse()
                    .map_err(|_| SlotSetError::InvalidRange(token.to_string()))?;
                let end: u16 = e
                    .parse()
                    .map_err(|_| SlotSetError::InvalidRange(token.to_string()))?;
                if begin > end {
                    return Err(SlotSetError::InvalidRange(token.to_string()));
                }
                (begin, end)
            }
            None => {
                let slot: u16 = token
                    .parse()
                    .map_err(|_| SlotSetError::InvalidRange(token.to_string()))?;
                (slot, slot)
            }
        };

        for slot in begin..=end {
            self.set(slot)?;
        }
        Ok(())
    }

    /// Serialize the set bits back into minimal range tokens, space-separated
    /// and ascending (`"0-100 200 300-310"`). The empty set serializes to the
    /// empty string. Left inverse of `parse_range`.
    pub fn to_range_string(&self) -> String {
        let mut tokens = Vec::new();
        for (begin, end) in self.ranges() {
            if begin == end {
                tokens.push(begin.to_string());
            } else {
                tokens.push(format!("{}-{}", begin, end));
            }
        }
        tokens.join(" ")
    }

    /// Contiguous runs of set slots as inclusive (begin, end) pairs.
    fn ranges(&self) -> Vec<(u16, u16)> {
        let mut result = Vec::new();
        let mut run_start: Option<u16> = None;

        for slot in 0..TOTAL_SLOTS {
            match (self.bits[slot as usize], run_start) {
                (true, None) => run_start = Some(slot),
                (false, Some(start)) => {
                    result.push((start, slot - 1));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            result.push((start, TOTAL_SLOTS - 1));
        }
        result
    }

    /// Compare against another set, deriving the slots `other` has that this
    /// set lacks (`missing`) and the slots this set has that `other` lacks
    /// (`extra`).
    pub fn diff(&self, other: &SlotSet) -> SlotDiff {
        let mut missing = SlotSet::new();
        let mut extra = SlotSet::new();

        for slot in 0..TOTAL_SLOTS as usize {
            if self.bits[slot] && !other.bits[slot] {
                extra.bits[slot] = true;
            } else if !self.bits[slot] && other.bits[slot] {
                missing.bits[slot] = true;
            }
        }

        SlotDiff { missing, extra }
    }
}

impl std::fmt::Debug for SlotSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SlotSet({})", self.to_range_string())
    }
}

/// Result of comparing two slot sets.
#[derive(Debug, Clone)]
pub struct SlotDiff {
    /// Slots the compared set has that this one lacks.
    pub missing: SlotSet,
    /// Slots this set has that the compared set lacks.
    pub extra: SlotSet,
}

impl SlotDiff {
    /// True iff the two sets were identical.
    pub fn is_equal(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

impl std::fmt::Display for SlotDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_equal() {
            return Ok(());
        }
        write!(
            f,
            "-[{}] +[{}]",
            self.missing.to_range_string(),
            self.extra.to_range_string()
        )
    }
}
