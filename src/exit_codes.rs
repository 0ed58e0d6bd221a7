//! Exit code constants for the interlock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state)
//! - 2: Configuration or input-file failure
//! - 3: Simulation failure (coordinator or actor thread died)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or a file that could not be written.
pub const USER_ERROR: i32 = 1;

/// Configuration or input parsing failure.
pub const INPUT_FAILURE: i32 = 2;

/// The simulation could not run to completion.
pub const SIMULATION_FAILURE: i32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, INPUT_FAILURE, SIMULATION_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
    }
}
