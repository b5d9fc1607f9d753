/// Number of decimal places of ALGO (1 ALGO = 10^6 microalgos).
pub const ALGO_DECIMALS: u32 = 6;

pub fn format_token_amount(amount: u64, decimals: u32) -> String {
    format!(
        "{:.*}",
        decimals as usize,
        amount as f64 / 10f64.powi(decimals as i32)
    )
}

/// Format a microalgo balance as ALGO.
pub fn format_algos(microalgos: u64) -> String {
    format_token_amount(microalgos, ALGO_DECIMALS)
}
