//! Exit-status translation (C2): map a child process's termination to the
//! 32-bit value carried by the SSH `exit-status` channel request.

use std::process::ExitStatus;

/// `Ok(status)` where the wait succeeded; `Err(())` where the wait itself
/// failed (the child could not be reaped). Both cases collapse to a u32:
/// a clean exit returns its code, anything else returns 1, and a
/// successful zero-exit returns 0.
pub fn translate(wait_result: &std::io::Result<ExitStatus>) -> u32 {
    match wait_result {
        Ok(status) => match status.code() {
            Some(code) => code as u32,
            // Terminated by signal: no exit code available.
            None => 1,
        },
        Err(_) => 1,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn zero_exit_is_zero() {
        let status: std::io::Result<ExitStatus> = Ok(ExitStatus::from_raw(0));
        assert_eq!(translate(&status), 0);
    }

    #[test]
    fn nonzero_exit_passes_through() {
        let status: std::io::Result<ExitStatus> = Ok(ExitStatus::from_raw(1 << 8));
        assert_eq!(translate(&status), 1);
    }

    #[test]
    fn signal_termination_is_one() {
        // Raw status with only the low 7 bits set (no exit-code byte) encodes
        // termination by signal; `ExitStatus::code()` returns None for it.
        let status: std::io::Result<ExitStatus> = Ok(ExitStatus::from_raw(9));
        assert_eq!(translate(&status), 1);
    }

    #[test]
    fn wait_failure_is_one() {
        let status: std::io::Result<ExitStatus> =
            Err(std::io::Error::other("wait failed"));
        assert_eq!(translate(&status), 1);
    }
}
