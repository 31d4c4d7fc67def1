/// Default pulse step size of a looped trigger (10 ms)
pub const DEFAULT_STEP_SIZE_MS: u64 = 10;
/// Default bound on catch-up pulses fired in one loop iteration
pub const DEFAULT_MAX_CATCH_UP_STEPS: u32 = 10;
/// Default time `stop` waits for a loop thread to exit (1 s)
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 1_000;
/// Default number of faults remembered per step
pub const DEFAULT_FAULT_HISTORY: usize = 32;
/// Default capacity of a group's event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
/// Default tracing filter used when neither the config nor `RUST_LOG` sets one
pub const DEFAULT_LOG_FILTER: &str = "info";
