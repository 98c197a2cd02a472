
/// Convert `value` from units of `1 / from` seconds to units of `1 / to` seconds, rounding down.
///
/// A `from` of zero leaves the value unchanged. Results beyond `u64::MAX` saturate.
pub fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == to || from == 0 {
        return value;
    }
    let scaled = u128::from(value) * u128::from(to) / u128::from(from);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod rescale_test {
    use super::*;

    #[test]
    fn milliseconds_to_90khz() {
        assert_eq!(rescale(1000, 1000, 90000), 90000);
        assert_eq!(rescale(1, 90000, 1000), 0);
        assert_eq!(rescale(u64::MAX, 1, 2), u64::MAX);
        assert_eq!(rescale(5, 0, 1000), 5);
    }
}
