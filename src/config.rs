/*!
Run-time configuration knobs supplied by the external CLI layer (§2.1-P).

This is not a file-format config loader — parsing a config file is an external
concern (§1) — it is the plain struct the entry point is parameterized over.
*/

use crate::types::size::{NON_OS_MEMORY_LIMIT, NON_OS_SIZE_LIMIT};

#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Expected 64-bit instance id stamped into the dump header's `comment`
    /// field, when not recoverable from a `DeviceSpecificInfo` trailer.
    pub expected_instance_id: Option<u64>,

    /// Overrides for the CompleteMap heuristic thresholds (§9 design notes).
    pub non_os_memory_limit: u64,
    pub non_os_size_limit: u64,

    /// Whether the SecondaryDataWriter (component K) should run at all.
    pub write_secondary_data: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            expected_instance_id: None,
            non_os_memory_limit: NON_OS_MEMORY_LIMIT,
            non_os_size_limit: NON_OS_SIZE_LIMIT,
            write_secondary_data: true,
        }
    }
}
