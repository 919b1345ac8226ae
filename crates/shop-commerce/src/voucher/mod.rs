//! Vouchers: eligibility, discount computation and redemption.

mod model;
mod validator;

pub use model::{canonical_code, DiscountValue, ScopedLine, Voucher};
pub use validator::{VoucherQuote, VoucherSelector, VoucherValidator};
