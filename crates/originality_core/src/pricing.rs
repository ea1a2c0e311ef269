//! crates/originality_core/src/pricing.rs
//!
//! Pure pricing rules: word counting, credits per scan, and the price of a
//! credit pack.

use crate::catalog::{Pricing, ServiceKind};

const SHORT_DOCUMENT_WORDS: usize = 3000;
const LONG_DOCUMENT_WORDS: usize = 6000;

/// Counts whitespace-separated tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Credits needed to score a document of `word_count` words.
///
/// A zero word count never reaches this function; the workflow rejects empty
/// documents before pricing.
pub fn required_credits(word_count: usize) -> i64 {
    if word_count > LONG_DOCUMENT_WORDS {
        3
    } else if word_count > SHORT_DOCUMENT_WORDS {
        2
    } else {
        1
    }
}

/// Credits a service charges, given the extracted word count when known.
pub fn credits_for(service: ServiceKind, word_count: usize) -> i64 {
    match service.policy().pricing {
        Pricing::PerWordCount => required_credits(word_count),
        Pricing::Flat(credits) => credits,
    }
}

/// Largest number of credits a single checkout may buy.
pub const MAX_CREDIT_PURCHASE: i64 = 10_000;

pub const SMALL_PACK_CREDITS: i64 = 10;
pub const SMALL_PACK_PRICE: i64 = 180;
pub const LARGE_PACK_CREDITS: i64 = 100;
pub const LARGE_PACK_PRICE: i64 = 1700;

/// Price of a credit pack in major currency units, or `None` when the
/// amount is outside `1..=MAX_CREDIT_PURCHASE`.
pub fn credit_pack_price(credits: i64) -> Option<i64> {
    if !(1..=MAX_CREDIT_PURCHASE).contains(&credits) {
        return None;
    }
    match credits {
        SMALL_PACK_CREDITS => Some(SMALL_PACK_PRICE),
        LARGE_PACK_CREDITS => Some(LARGE_PACK_PRICE),
        c if c >= LARGE_PACK_CREDITS => c.checked_mul(17),
        c => c.checked_mul(18),
    }
}

/// Same as [`credit_pack_price`] in minor units (cents).
pub fn credit_pack_price_minor(credits: i64) -> Option<i64> {
    credit_pack_price(credits)?.checked_mul(100)
}
