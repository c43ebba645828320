use core::ptr;
use core::time::Duration;
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Timer file descriptor on the monotonic clock.
#[derive(Debug)]
pub struct TimerFd {
    fd: OwnedFd,
}

impl TimerFd {
    /// Construct a new non-blocking timer fd.
    pub fn new() -> io::Result<Self> {
        // SAFETY: We're just using c-apis as intended.
        unsafe {
            let fd = libc::timerfd_create(
                libc::CLOCK_MONOTONIC,
                libc::TFD_CLOEXEC | libc::TFD_NONBLOCK,
            );

            if fd == -1 {
                return Err(io::Error::last_os_error());
            }

            Ok(Self {
                fd: OwnedFd::from_raw_fd(fd),
            })
        }
    }

    /// Set a single timeout.
    pub fn set_timeout(&self, duration: Duration) -> io::Result<()> {
        // SAFETY: We're just using c-apis as intended.
        unsafe {
            let mut value: libc::itimerspec = mem::zeroed();
            value.it_value.tv_sec = duration.as_secs() as _;
            value.it_value.tv_nsec = duration.subsec_nanos() as _;

            let n = libc::timerfd_settime(self.fd.as_raw_fd(), 0, &value, ptr::null_mut());

            if n == -1 {
                return Err(io::Error::last_os_error());
            }

            Ok(())
        }
    }

    /// Set an interval timer.
    pub fn set_interval(&self, duration: Duration) -> io::Result<()> {
        // SAFETY: We're just using c-apis as intended.
        unsafe {
            let mut value: libc::itimerspec = mem::zeroed();
            value.it_value.tv_sec = duration.as_secs() as _;
            value.it_value.tv_nsec = duration.subsec_nanos() as _;

            value.it_interval.tv_sec = duration.as_secs() as _;
            value.it_interval.tv_nsec = duration.subsec_nanos() as _;

            let n = libc::timerfd_settime(self.fd.as_raw_fd(), 0, &value, ptr::null_mut());

            if n == -1 {
                return Err(io::Error::last_os_error());
            }

            Ok(())
        }
    }

    /// Disarm the timer.
    pub fn stop(&self) -> io::Result<()> {
        self.set_timeout(Duration::ZERO)
    }

    /// Read the number of expirations that have occured.
    ///
    /// Returns `None` if the operation would block.
    pub fn read(&self) -> io::Result<Option<u64>> {
        unsafe {
            let mut value = mem::MaybeUninit::<u64>::uninit();
            let n = libc::read(self.fd.as_raw_fd(), value.as_mut_ptr() as *mut _, 8);

            if n == -1 {
                match io::Error::last_os_error() {
                    e if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                    e => return Err(e),
                }
            }

            if n != 8 {
                return Err(io::Error::other("expected 8 bytes"));
            }

            Ok(Some(value.assume_init()))
        }
    }
}

impl AsRawFd for TimerFd {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
