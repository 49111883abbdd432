use std::time::Instant;

use once_cell::sync::Lazy;

static BOOT_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_current_system_time_us() -> u64 {
    BOOT_TIME.elapsed().as_micros() as u64
}

pub fn get_current_system_time_ms() -> u32 {
    (get_current_system_time_us() / 1000) as u32
}

/// Wrapping difference between two millisecond timestamps.
pub fn time_difference_ms(start_ms: u32, end_ms: u32) -> u32 {
    end_ms.wrapping_sub(start_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_wraps_around() {
        assert_eq!(time_difference_ms(u32::MAX - 4, 5), 10);
        assert_eq!(time_difference_ms(100, 250), 150);
    }
}
