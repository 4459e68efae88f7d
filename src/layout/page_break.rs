//! # Page Break Decisions
//!
//! Blocks are never split. For each block the flow engine asks whether it
//! goes on the current page or starts the next one. The rules here are what
//! keep section headings at the top of pages and stop a heading from being
//! stranded at the bottom of a page while its content moves on.

/// What to do with the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakDecision {
    /// Place the block on the current page.
    Place,
    /// Open a new page and place the block at its top.
    MoveToNextPage,
}

/// Tunable thresholds, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakRules {
    /// A section heading further than this from the top starts a new page.
    pub section_break_offset: f64,
    /// A block that overflows moves on only if the cursor is past this offset.
    pub overflow_break_offset: f64,
    /// Once less than this remains after a block, the next block starts a new page.
    pub min_remaining: f64,
    /// Keep a heading on the same page as the block after it.
    pub keep_with_next: bool,
}

impl Default for BreakRules {
    fn default() -> Self {
        Self {
            section_break_offset: 20.0,
            overflow_break_offset: 10.0,
            min_remaining: 30.0,
            keep_with_next: true,
        }
    }
}

/// Where the cursor is on the current page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageState {
    /// Distance from the top of the content area to the cursor.
    pub offset: f64,
    /// Distance from the cursor to the bottom of the content area.
    pub remaining: f64,
}

/// The block being placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub height: f64,
    pub is_heading: bool,
    /// Level-2 headings open a new section.
    pub is_section_heading: bool,
    /// Estimated height of the following block, if any.
    pub next_height: Option<f64>,
    /// Gap inserted after this block.
    pub spacing: f64,
}

/// Decide whether `block` fits the current page.
pub fn decide_break(page: &PageState, block: &Candidate, rules: &BreakRules) -> BreakDecision {
    if page.remaining <= 0.0 {
        return BreakDecision::MoveToNextPage;
    }

    if block.is_section_heading && page.offset > rules.section_break_offset {
        return BreakDecision::MoveToNextPage;
    }

    // An overflowing block gets a fresh page unless it already starts near
    // the top, where moving would not give it more room.
    if block.height > page.remaining && page.offset > rules.overflow_break_offset {
        return BreakDecision::MoveToNextPage;
    }

    if rules.keep_with_next && block.is_heading && page.offset > rules.overflow_break_offset {
        if let Some(next) = block.next_height {
            // A follower taller than any page is clamped on a page of its
            // own, so the heading only needs the minimum room after it.
            let usable = page.offset + page.remaining;
            let follow = if next > usable {
                rules.min_remaining
            } else {
                next.max(rules.min_remaining)
            };
            if block.height + block.spacing + follow > page.remaining {
                return BreakDecision::MoveToNextPage;
            }
        }
    }

    BreakDecision::Place
}
