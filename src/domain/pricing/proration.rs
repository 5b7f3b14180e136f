/// Credit award for installment `index` (1-based) of `installments`.
///
/// Every payment gets `floor(total / n)`; the last one also takes the
/// remainder so the awards sum to `total`. Out-of-range indexes get nothing.
pub fn installment_award(total: i64, installments: u32, index: u32) -> Option<i64> {
    if installments == 0 || index == 0 || index > installments {
        return None;
    }
    let n = i64::from(installments);
    let share = total.max(0) / n;
    if index == installments {
        Some(total.max(0) - (n - 1) * share)
    } else {
        Some(share)
    }
}
