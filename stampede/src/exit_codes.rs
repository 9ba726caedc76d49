#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Fatal error: unreadable/invalid config, script setup failure, or a
    /// report render/write failure. Step-level failures are statistics, not
    /// fatal errors, and still exit 0.
    Fatal = 1,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
