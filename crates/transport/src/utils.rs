//! Small helpers shared by the framers and the ways.

/// Returns early with `Err($error)` when the predicate does not hold.
///
/// ```ignore
/// ensure!(count <= max_header_num, ParseError::too_many_headers(max_header_num));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Number of hex digits needed to write `n`.
pub(crate) fn hex_len(n: usize) -> usize {
    if n == 0 {
        return 1;
    }
    (usize::BITS - n.leading_zeros()).div_ceil(4) as usize
}
