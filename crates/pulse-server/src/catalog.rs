//! Purchasable item catalog.
//!
//! Items cycle through three categories by `item_id % 3`. Each of the first
//! nine items has its own canned reply; the rest share a generic one.

/// Number of item categories.
pub const CATEGORY_COUNT: u32 = 3;

const CATEGORY_NAMES: [&str; CATEGORY_COUNT as usize] =
    ["click_multiplier", "auto_clicker", "abstract_meme"];

const PURCHASE_LINES: [&str; 9] = [
    "Your click multiplier feels... meaningless somehow.",
    "An auto-clicker. Because clicking manually is too much effort.",
    "You bought an abstract meme. The void is pleased.",
    "More clicks per click. What a profound achievement.",
    "Automation for your automation. How meta.",
    "A digital concept. You can't even hold it.",
    "Clicking harder. Is that really progress?",
    "The machine clicks for you. Are you still playing?",
    "Consuming pixels. Modern life.",
];

const FALLBACK_LINE: &str = "You bought something. Congratulations?";

/// Category index an item must be purchased under.
pub fn category_of(item_id: u32) -> u32 {
    item_id % CATEGORY_COUNT
}

/// Category name sent back as the response state.
pub fn category_name(item_id: u32) -> &'static str {
    CATEGORY_NAMES[category_of(item_id) as usize]
}

/// Fixed reply for a purchase.
pub fn purchase_message(item_id: u32) -> &'static str {
    usize::try_from(item_id)
        .ok()
        .and_then(|idx| PURCHASE_LINES.get(idx))
        .copied()
        .unwrap_or(FALLBACK_LINE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_cycle_every_three_items() {
        for item in 0..=14 {
            let expected = match item % 3 {
                0 => "click_multiplier",
                1 => "auto_clicker",
                _ => "abstract_meme",
            };
            assert_eq!(category_name(item), expected, "item {item}");
        }
    }

    #[test]
    fn known_items_have_their_own_line() {
        assert_eq!(
            purchase_message(0),
            "Your click multiplier feels... meaningless somehow."
        );
        assert_eq!(purchase_message(4), "Automation for your automation. How meta.");
        assert_eq!(purchase_message(8), "Consuming pixels. Modern life.");
    }

    #[test]
    fn later_items_share_the_fallback() {
        assert_eq!(purchase_message(9), FALLBACK_LINE);
        assert_eq!(purchase_message(14), FALLBACK_LINE);
    }
}
