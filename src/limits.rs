pub const MAX_EVENTS: usize = 100_000;
pub const MAX_TOTAL_SEATS: u32 = 1_000_000;
pub const MAX_SEATS_PER_BOOKING: u32 = 10_000;
pub const MAX_TITLE_LEN: usize = 256;
