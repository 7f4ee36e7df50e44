pub mod amortization;
pub mod sampling;
pub mod time_value;
